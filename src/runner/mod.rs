//! Subprocess supervision and run bookkeeping.
//!
//! - [`executor`]: spawn git and test-runner processes, streaming their
//!   output to a [`ConsoleSink`](crate::output::ConsoleSink) while capturing it
//! - [`cancel`]: cancellation shared between the CLI signal handler and
//!   running commands
//! - [`result`]: the run-start/run-progress records an agent harness leaves
//!   in the workspace

pub mod cancel;
pub mod executor;
pub mod result;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use executor::{describe_exit, format_command, run_captured, run_streaming, CommandOutput};
pub use result::{RunMetadata, RunProgress, RunStart, SystemInfo, TokenUsage};
