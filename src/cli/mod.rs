//! Command-line interface for trajforge.
//!
//! Provides commands for trajectory collection, judgment relabeling, and
//! shard-plan inspection.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
