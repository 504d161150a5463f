//! Error types for agentbench operations.
//!
//! Defines error types for each subsystem:
//! - Transactional file copies into a workspace
//! - Scenario loading and validation
//! - Subprocess execution (git, test runner)
//! - Workspace change auditing
//! - Workspace setup and verification

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors from the transactional copy engine.
///
/// Every variant is returned only after the partial transaction has been
/// rolled back.
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("'{0}' exists and is not a directory")]
    NotADirectory(PathBuf),

    #[error("destination file '{0}' already exists")]
    AlreadyExists(PathBuf),

    #[error("destination '{0}' is a directory")]
    DestinationIsDirectory(PathBuf),

    #[error("path '{path}' escapes base directory '{base}'")]
    EscapesBase { base: PathBuf, path: String },

    #[error("IO error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CopyError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that can occur while loading or validating a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("invalid scenario name: {0}")]
    InvalidName(String),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("commit '{0}' does not look like a git sha")]
    InvalidCommit(String),

    #[error("copy steps must include from and to")]
    IncompleteCopyStep,

    #[error("copy source does not exist: {0}")]
    MissingCopySource(String),

    #[error("verify.must-modify entries cannot be empty")]
    EmptyMustModify,

    #[error("{field} entry '{entry}': {reason}")]
    InvalidTestTarget {
        field: &'static str,
        entry: String,
        reason: String,
    },

    #[error("git ls-remote {url} {commit} failed: {reason}")]
    RemoteCommit {
        url: String,
        commit: String,
        reason: String,
    },

    #[error("failed to read scenario '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors from spawning and supervising a subprocess.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read output of {program}: {source}")]
    Stream {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command}: {stderr}")]
    Failed { command: String, stderr: String },

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("command cancelled")]
    Cancelled,
}

/// Errors from querying the workspace git state.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("git query failed: {0}")]
    Git(#[from] ProcessError),
}

/// Errors that abort a verification run.
///
/// Rule violations and failing tests are not errors: they produce a report
/// with `success = false`.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("scenario error: {0}")]
    Scenario(#[from] ScenarioError),

    #[error("workspace for scenario not found at {0}")]
    WorkspaceMissing(PathBuf),

    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("failed to copy verification files: {0}")]
    Copy(#[from] CopyError),

    #[error("verification cancelled")]
    Cancelled,

    #[error("failed to write report '{path}': {source}")]
    WriteReport {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from preparing a scenario workspace.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("scenario error: {0}")]
    Scenario(#[from] ScenarioError),

    #[error("{step} failed: {source}")]
    Git {
        step: &'static str,
        #[source]
        source: ProcessError,
    },

    #[error("git {step} exited with {status}")]
    GitStatus { step: &'static str, status: String },

    #[error("copy step failed: {0}")]
    Copy(#[from] CopyError),

    #[error("IO error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
