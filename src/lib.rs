//! trajforge: internet-scale collection of web agent trajectories.
//!
//! An automated agent attempts natural-language tasks against live websites,
//! an LLM judge scores each attempt, and every episode is persisted as
//! training data. The library covers resilient parsing of untrusted model
//! output, the per-task episode loop, deterministic work sharding, and the
//! concurrent orchestrator that makes runs resumable.

// Core modules
pub mod agent;
pub mod cli;
pub mod dataset;
pub mod env;
pub mod error;
pub mod judge;
pub mod llm;
pub mod parsers;
pub mod pipeline;
pub mod proposer;
pub mod shard;
pub mod storage;
pub mod trajectory;

// Re-export commonly used error types
pub use error::{DatasetError, EnvError, LlmError, PipelineError, StorageError};
