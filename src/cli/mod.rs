//! Command-line interface for agentbench.
//!
//! Provides scenario validation, workspace setup and verification commands.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
