//! Per-worker execution: a disjoint task shard processed sequentially.
//!
//! Each worker owns one environment session bound to one backend endpoint
//! and walks its shard one task at a time. Resumability is a per-domain
//! filesystem check; a finished domain is skipped without touching the model
//! or the environment.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::agent::{AgentConfig, BrowserAgent};
use crate::dataset::TaskRecord;
use crate::env::EnvironmentFactory;
use crate::error::{PipelineError, StorageError};
use crate::judge::{JudgeConfig, TrajectoryJudge};
use crate::llm::Model;
use crate::pipeline::episode::run_episode;
use crate::storage::ArtifactStore;
use crate::trajectory::{AgentResponseKey, TrajectoryOutput};

/// Per-task behavior shared by all workers of a run.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum agent decisions per episode.
    pub max_actions: usize,
    /// Skip domains whose judgment artifact already exists.
    pub skip_finished: bool,
    /// Which action field the judge reads.
    pub agent_response_key: AgentResponseKey,
    /// Consecutive fully-failed episodes tolerated before the worker gives
    /// up; `None` means never give up.
    pub max_consecutive_failures: Option<usize>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_actions: 30,
            skip_finished: true,
            agent_response_key: AgentResponseKey::MatchedResponse,
            max_consecutive_failures: Some(5),
        }
    }
}

/// Shared collaborators handed to every worker.
#[derive(Clone)]
pub struct WorkerContext {
    pub store: ArtifactStore,
    pub model: Arc<dyn Model>,
    pub agent_config: AgentConfig,
    pub judge_config: JudgeConfig,
}

/// One finished episode, tagged with its domain, as surfaced to aggregation.
#[derive(Debug, Clone)]
pub struct CollectedEpisode {
    pub domain: String,
    pub output: TrajectoryOutput,
}

/// Runs one worker's shard to completion.
///
/// Failures local to one episode, persistence included, are absorbed; only
/// the consecutive-failure cap aborts the worker.
pub async fn run_worker(
    worker: usize,
    endpoint: String,
    tasks: Vec<TaskRecord>,
    config: RunnerConfig,
    ctx: WorkerContext,
    env_factory: Arc<dyn EnvironmentFactory>,
    sender: Option<mpsc::UnboundedSender<CollectedEpisode>>,
) -> Result<(), PipelineError> {
    info!(worker, endpoint = %endpoint, tasks = tasks.len(), "Worker starting");

    let mut env = env_factory.create(&endpoint);
    let mut agent = BrowserAgent::new(ctx.model.clone(), ctx.agent_config.clone());
    let judge = TrajectoryJudge::new(ctx.model.clone(), ctx.judge_config.clone());

    let mut consecutive_failures = 0usize;

    for task in tasks {
        if config.skip_finished && ctx.store.judgment_exists(&task.domain) {
            info!(worker, domain = %task.domain, "Already judged; skipping");
            continue;
        }

        let mut output = run_episode(
            env.as_mut(),
            &mut agent,
            &judge,
            &task.start_url(),
            &task.task,
            config.max_actions,
            config.agent_response_key,
        )
        .await;

        let mut episode_failed = output.observations.is_empty();
        if episode_failed {
            warn!(worker, domain = %task.domain, "Episode captured nothing");
        }

        // A persistence failure loses this task's artifacts but must not
        // take the rest of the shard down with it.
        match persist_episode(&ctx.store, &task.domain, &mut output).await {
            Ok(()) => {
                info!(
                    worker,
                    domain = %task.domain,
                    steps = output.actions.len(),
                    success = ?output.judgment.success,
                    "Episode persisted"
                );

                if let Some(sender) = &sender {
                    // Receiver gone means the caller stopped listening;
                    // artifacts are already on disk, so keep going.
                    let _ = sender.send(CollectedEpisode {
                        domain: task.domain.clone(),
                        output,
                    });
                }
            }
            Err(e) => {
                episode_failed = true;
                warn!(
                    worker,
                    domain = %task.domain,
                    error = %e,
                    "Failed to persist episode artifacts"
                );
            }
        }

        if episode_failed {
            consecutive_failures += 1;
        } else {
            consecutive_failures = 0;
        }

        if let Some(cap) = config.max_consecutive_failures {
            if consecutive_failures >= cap {
                return Err(PipelineError::TooManyConsecutiveFailures {
                    worker,
                    count: consecutive_failures,
                });
            }
        }
    }

    info!(worker, "Worker finished");
    Ok(())
}

async fn persist_episode(
    store: &ArtifactStore,
    domain: &str,
    output: &mut TrajectoryOutput,
) -> Result<(), StorageError> {
    store
        .externalize_screenshots(domain, &mut output.observations)
        .await?;
    store.save_observations(domain, &output.observations).await?;
    store.save_actions(domain, &output.actions).await?;
    store.save_judgment(domain, &output.judgment).await?;
    Ok(())
}
