//! agentbench: benchmark AI coding agents against real git repositories.
//!
//! A scenario pins a repository at a commit, tells the agent what to do, and
//! says how to judge the result. This library prepares scenario workspaces
//! and verifies an agent's changes:
//!
//! - [`fsutil`]: transactional, reversible copies into a live working tree
//! - [`verify`]: modification rules, test execution, partial scoring, reports
//! - [`setup`]: clone, checkout and setup copies
//! - [`scenario`], [`workspace`]: scenario definitions and on-disk layout
//! - [`runner`]: subprocess streaming, cancellation and run metadata
//! - [`output`]: console sinks

pub mod cli;
pub mod error;
pub mod fsutil;
pub mod output;
pub mod runner;
pub mod scenario;
pub mod setup;
pub mod verify;
pub mod workspace;

pub use error::{AuditError, CopyError, ProcessError, ScenarioError, SetupError, VerifyError};
