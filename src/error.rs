//! Error types for trajforge operations.
//!
//! Defines error types for the major subsystems:
//! - LLM API interactions
//! - Environment collaborator calls
//! - Artifact persistence
//! - Pipeline orchestration and worker execution
//!
//! Malformed model output is deliberately NOT an error: the parsers return
//! [`crate::parsers::ParseResult::Failed`] as data instead.

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: TRAJFORGE_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Generation request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Response contained no choices")]
    EmptyResponse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while talking to an environment backend.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("Environment request failed: {0}")]
    RequestFailed(String),

    #[error("Environment returned a malformed payload: {0}")]
    Protocol(String),

    #[error("Environment call timed out after {seconds} seconds")]
    Timeout { seconds: u64 },
}

/// Errors that can occur during artifact persistence.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to create storage directory: {0}")]
    DirectoryCreationFailed(String),

    #[error("Missing artifact for domain '{domain}': {artifact}")]
    MissingArtifact { domain: String, artifact: String },
}

/// Errors that can occur while loading a task dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse dataset: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid domain key '{0}': must be non-empty and filesystem-safe")]
    InvalidDomain(String),
}

/// Errors that can occur in the pipeline orchestrator and workers.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error(
        "Shard configuration changed between resumed runs: \
         previous (seed={prev_seed}, world_size={prev_world_size}, num_workers={prev_num_workers}), \
         current (seed={seed}, world_size={world_size}, num_workers={num_workers}); \
         start a fresh run or restore the previous configuration"
    )]
    ShardConfigMismatch {
        prev_seed: u64,
        prev_world_size: usize,
        prev_num_workers: usize,
        seed: u64,
        world_size: usize,
        num_workers: usize,
    },

    #[error("Worker {worker} gave up after {count} consecutive episode failures")]
    TooManyConsecutiveFailures { worker: usize, count: usize },

    #[error("No environment endpoints configured")]
    NoEndpoints,

    #[error("Worker task panicked: {0}")]
    WorkerPanic(String),
}
