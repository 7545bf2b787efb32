//! The collection pipeline: episode loop, per-worker runner, orchestrator.

pub mod episode;
pub mod orchestrator;
pub mod relabel;
pub mod runner;

pub use episode::run_episode;
pub use orchestrator::{AggregationMode, LaunchOutput, Orchestrator, OrchestratorConfig};
pub use relabel::relabel_judgments;
pub use runner::{run_worker, CollectedEpisode, RunnerConfig, WorkerContext};
