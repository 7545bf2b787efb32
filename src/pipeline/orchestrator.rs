//! Fan-out of a task dataset across concurrent workers.
//!
//! The orchestrator computes each worker's shard with the deterministic
//! planner, binds each worker to an environment endpoint, and spawns one
//! task per worker. A run stamp pins `(seed, world_size, num_workers)` so a
//! resumed run cannot silently reshuffle work that existing artifacts were
//! produced under.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::dataset::TaskRecord;
use crate::env::EnvironmentFactory;
use crate::error::PipelineError;
use crate::pipeline::runner::{run_worker, CollectedEpisode, RunnerConfig, WorkerContext};
use crate::shard::plan_shard;
use crate::storage::RunStamp;

/// What the orchestrator does with finished episodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    /// Hand back a channel that yields episodes as they finish.
    Stream,
    /// Collect every episode into memory and return them all at once.
    Collect,
    /// Keep nothing in memory; artifacts on disk are the only output.
    Discard,
}

/// The aggregation-mode-dependent result of a launch.
#[derive(Debug)]
pub enum LaunchOutput {
    Stream(mpsc::UnboundedReceiver<CollectedEpisode>),
    Collected(Vec<CollectedEpisode>),
    Discarded,
}

/// Configuration for one collection run on one machine.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Shuffle seed shared by every machine of the run.
    pub seed: u64,
    /// This machine's rank.
    pub rank: usize,
    /// Number of machines in the run.
    pub world_size: usize,
    /// Concurrent workers on this machine.
    pub num_workers: usize,
    /// Environment backend endpoints shared by the workers.
    pub endpoints: Vec<String>,
    /// Artifact output root.
    pub output_dir: PathBuf,
    pub runner: RunnerConfig,
    pub aggregation: AggregationMode,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    ctx: WorkerContext,
    env_factory: Arc<dyn EnvironmentFactory>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        ctx: WorkerContext,
        env_factory: Arc<dyn EnvironmentFactory>,
    ) -> Self {
        Self {
            config,
            ctx,
            env_factory,
        }
    }

    /// Runs this machine's share of `dataset`.
    ///
    /// In `Stream` mode the call returns as soon as the workers are spawned;
    /// the other modes return after every worker has finished.
    pub async fn launch(&self, dataset: &[TaskRecord]) -> Result<LaunchOutput, PipelineError> {
        if self.config.endpoints.is_empty() {
            return Err(PipelineError::NoEndpoints);
        }

        self.ctx.store.ensure_dirs().await?;
        self.check_run_stamp().await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let sender = match self.config.aggregation {
            AggregationMode::Discard => None,
            _ => Some(tx),
        };

        let handles = self.spawn_workers(dataset, sender);

        match self.config.aggregation {
            AggregationMode::Stream => {
                // Workers hold the only senders; the receiver ends when the
                // last one finishes. Join failures are logged out-of-band.
                tokio::spawn(async move {
                    for handle in handles {
                        match handle.await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => error!(error = %e, "Worker failed"),
                            Err(e) => error!(error = %e, "Worker panicked"),
                        }
                    }
                });
                Ok(LaunchOutput::Stream(rx))
            }
            AggregationMode::Collect => {
                join_workers(handles).await?;
                let mut episodes = Vec::new();
                let mut rx = rx;
                while let Ok(episode) = rx.try_recv() {
                    episodes.push(episode);
                }
                info!(episodes = episodes.len(), "Run collected");
                Ok(LaunchOutput::Collected(episodes))
            }
            AggregationMode::Discard => {
                join_workers(handles).await?;
                info!("Run finished");
                Ok(LaunchOutput::Discarded)
            }
        }
    }

    fn spawn_workers(
        &self,
        dataset: &[TaskRecord],
        sender: Option<mpsc::UnboundedSender<CollectedEpisode>>,
    ) -> Vec<JoinHandle<Result<(), PipelineError>>> {
        let mut handles = Vec::with_capacity(self.config.num_workers);

        for worker_index in 0..self.config.num_workers {
            let indices = plan_shard(
                dataset.len(),
                self.config.seed,
                self.config.rank,
                self.config.world_size,
                worker_index,
                self.config.num_workers,
            );
            let tasks: Vec<TaskRecord> = indices.iter().map(|&i| dataset[i].clone()).collect();

            let global_worker = self.config.rank * self.config.num_workers + worker_index;
            let endpoint =
                self.config.endpoints[global_worker % self.config.endpoints.len()].clone();

            handles.push(tokio::spawn(run_worker(
                global_worker,
                endpoint,
                tasks,
                self.config.runner.clone(),
                self.ctx.clone(),
                self.env_factory.clone(),
                sender.clone(),
            )));
        }

        handles
    }

    /// Verifies the persisted run stamp still matches this configuration.
    ///
    /// Shard disjointness only holds for a fixed `(seed, world_size,
    /// num_workers)`; resuming under a different triple would both duplicate
    /// and orphan work, so it is rejected outright. A non-resumable run
    /// overwrites artifacts wholesale and may restamp freely.
    async fn check_run_stamp(&self) -> Result<(), PipelineError> {
        let stamp = RunStamp {
            seed: self.config.seed,
            world_size: self.config.world_size,
            num_workers: self.config.num_workers,
        };

        if let Some(prev) = RunStamp::load(&self.config.output_dir).await? {
            if prev != stamp && self.config.runner.skip_finished {
                return Err(PipelineError::ShardConfigMismatch {
                    prev_seed: prev.seed,
                    prev_world_size: prev.world_size,
                    prev_num_workers: prev.num_workers,
                    seed: stamp.seed,
                    world_size: stamp.world_size,
                    num_workers: stamp.num_workers,
                });
            }
        }

        stamp.save(&self.config.output_dir).await?;
        Ok(())
    }
}

async fn join_workers(
    handles: Vec<JoinHandle<Result<(), PipelineError>>>,
) -> Result<(), PipelineError> {
    let mut first_error = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(e) => {
                first_error.get_or_insert(PipelineError::WorkerPanic(e.to_string()));
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
