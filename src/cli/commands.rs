//! CLI command definitions for trajforge.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use crate::agent::AgentConfig;
use crate::dataset::load_dataset;
use crate::env::remote::RemoteEnvironmentFactory;
use crate::judge::{JudgeConfig, TrajectoryJudge};
use crate::llm::ChatClient;
use crate::pipeline::{
    relabel_judgments, AggregationMode, LaunchOutput, Orchestrator, OrchestratorConfig,
    RunnerConfig, WorkerContext,
};
use crate::shard::plan_shard;
use crate::storage::ArtifactStore;
use crate::trajectory::AgentResponseKey;

const DEFAULT_OUTPUT_DIR: &str = "./trajectories";

/// Internet-scale agent trajectory collection.
#[derive(Parser)]
#[command(name = "trajforge")]
#[command(about = "Collect, judge, and relabel web agent trajectories")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the collection pipeline over a task dataset.
    Collect(CollectArgs),

    /// Re-judge previously collected trajectories in place.
    Relabel(RelabelArgs),

    /// Print the task indices each worker of this machine would own.
    Plan(PlanArgs),
}

/// Arguments for `trajforge collect`.
#[derive(Parser, Debug)]
pub struct CollectArgs {
    /// Task dataset file (JSON array or JSONL of {"domain", "task"}).
    #[arg(short, long)]
    pub dataset: PathBuf,

    /// Output directory for trajectory artifacts.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Environment backend endpoints, comma-separated.
    #[arg(short, long, value_delimiter = ',')]
    pub endpoints: Vec<String>,

    /// Shuffle seed shared across all machines of the run.
    #[arg(long, default_value = "0")]
    pub seed: u64,

    /// This machine's rank.
    #[arg(long, default_value = "0")]
    pub rank: usize,

    /// Number of machines in the run.
    #[arg(long, default_value = "1")]
    pub world_size: usize,

    /// Concurrent workers on this machine.
    #[arg(long, default_value = "8")]
    pub num_workers: usize,

    /// Maximum agent decisions per episode.
    #[arg(long, default_value = "30")]
    pub max_actions: usize,

    /// Recompute domains that already have a judgment artifact.
    #[arg(long)]
    pub no_skip_finished: bool,

    /// Agent model identifier (defaults to the client's default model).
    #[arg(short, long, default_value = "")]
    pub model: String,

    /// Judge model identifier (defaults to the agent model).
    #[arg(long)]
    pub judge_model: Option<String>,
}

/// Arguments for `trajforge relabel`.
#[derive(Parser, Debug)]
pub struct RelabelArgs {
    /// Task dataset file the artifacts were collected from.
    #[arg(short, long)]
    pub dataset: PathBuf,

    /// Directory holding the trajectory artifacts.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Judge model identifier (defaults to the client's default model).
    #[arg(short, long, default_value = "")]
    pub model: String,

    /// Feed the judge only the matched payload of each action, not the full
    /// response text.
    #[arg(long)]
    pub matched_only: bool,
}

/// Arguments for `trajforge plan`.
#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Task dataset file (JSON array or JSONL of {"domain", "task"}).
    #[arg(short, long)]
    pub dataset: PathBuf,

    /// Shuffle seed shared across all machines of the run.
    #[arg(long, default_value = "0")]
    pub seed: u64,

    /// This machine's rank.
    #[arg(long, default_value = "0")]
    pub rank: usize,

    /// Number of machines in the run.
    #[arg(long, default_value = "1")]
    pub world_size: usize,

    /// Concurrent workers on this machine.
    #[arg(long, default_value = "8")]
    pub num_workers: usize,
}

/// Parse CLI arguments without running a command.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Collect(args) => run_collect_command(args).await?,
        Commands::Relabel(args) => run_relabel_command(args).await?,
        Commands::Plan(args) => run_plan_command(args).await?,
    }
    Ok(())
}

/// Rejects machine/worker counts the shard planner cannot satisfy before
/// any work is spawned.
fn validate_topology(rank: usize, world_size: usize, num_workers: usize) -> anyhow::Result<()> {
    anyhow::ensure!(world_size > 0, "--world-size must be at least 1");
    anyhow::ensure!(num_workers > 0, "--num-workers must be at least 1");
    anyhow::ensure!(
        rank < world_size,
        "--rank {} is out of range for --world-size {}",
        rank,
        world_size
    );
    Ok(())
}

async fn run_collect_command(args: CollectArgs) -> anyhow::Result<()> {
    validate_topology(args.rank, args.world_size, args.num_workers)?;
    let dataset = load_dataset(&args.dataset).await?;

    let client = Arc::new(ChatClient::from_env()?);

    let agent_config = AgentConfig {
        model: args.model.clone(),
        ..AgentConfig::default()
    };
    let judge_config = JudgeConfig {
        model: args.judge_model.unwrap_or_else(|| args.model.clone()),
        ..JudgeConfig::default()
    };

    let config = OrchestratorConfig {
        seed: args.seed,
        rank: args.rank,
        world_size: args.world_size,
        num_workers: args.num_workers,
        endpoints: args.endpoints,
        output_dir: args.output.clone(),
        runner: RunnerConfig {
            max_actions: args.max_actions,
            skip_finished: !args.no_skip_finished,
            ..RunnerConfig::default()
        },
        aggregation: AggregationMode::Discard,
    };

    let ctx = WorkerContext {
        store: ArtifactStore::new(&args.output),
        model: client,
        agent_config,
        judge_config,
    };

    let orchestrator = Orchestrator::new(config, ctx, Arc::new(RemoteEnvironmentFactory));

    info!(tasks = dataset.len(), "Starting collection");
    match orchestrator.launch(&dataset).await? {
        LaunchOutput::Discarded => {}
        _ => unreachable!("collect always runs in discard mode"),
    }

    let store = ArtifactStore::new(&args.output);
    let finished = store.finished_domains().await?;
    info!(finished = finished.len(), "Collection complete");
    Ok(())
}

async fn run_relabel_command(args: RelabelArgs) -> anyhow::Result<()> {
    let dataset = load_dataset(&args.dataset).await?;
    let store = ArtifactStore::new(&args.output);

    let client = Arc::new(ChatClient::from_env()?);
    let judge = TrajectoryJudge::new(
        client,
        JudgeConfig {
            model: args.model,
            ..JudgeConfig::default()
        },
    );

    let agent_response_key = if args.matched_only {
        AgentResponseKey::MatchedResponse
    } else {
        AgentResponseKey::Response
    };

    let relabeled = relabel_judgments(&store, &judge, &dataset, agent_response_key).await?;
    info!(relabeled = relabeled.len(), "Relabeling complete");
    Ok(())
}

async fn run_plan_command(args: PlanArgs) -> anyhow::Result<()> {
    validate_topology(args.rank, args.world_size, args.num_workers)?;
    let dataset = load_dataset(&args.dataset).await?;

    for worker_index in 0..args.num_workers {
        let indices = plan_shard(
            dataset.len(),
            args.seed,
            args.rank,
            args.world_size,
            worker_index,
            args.num_workers,
        );
        let global_worker = args.rank * args.num_workers + worker_index;
        let domains: Vec<&str> = indices
            .iter()
            .map(|&i| dataset[i].domain.as_str())
            .collect();
        println!(
            "worker {} ({} tasks): {}",
            global_worker,
            domains.len(),
            domains.join(", ")
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_topology_accepts_in_range_rank() {
        assert!(validate_topology(0, 1, 8).is_ok());
        assert!(validate_topology(2, 3, 1).is_ok());
    }

    #[test]
    fn test_validate_topology_rejects_rank_out_of_range() {
        let err = validate_topology(2, 1, 8).unwrap_err();
        assert!(err.to_string().contains("--rank 2"));
    }

    #[test]
    fn test_validate_topology_rejects_zero_counts() {
        assert!(validate_topology(0, 0, 8).is_err());
        assert!(validate_topology(0, 1, 0).is_err());
    }
}
