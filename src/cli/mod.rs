//! Command-line interface for mecheval.
//!
//! Provides commands for live evaluation runs, offline scoring of recorded
//! replies, report statistics and target reachability checks.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
