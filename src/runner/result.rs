//! Run metadata written into the workspace by the agent harness.
//!
//! Verification only reads these files to label its report; a missing or
//! malformed file is treated as absent.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Written when an agent run starts.
pub const RUN_START_FILE: &str = ".run-start.json";
/// Rewritten as an agent run makes progress.
pub const RUN_PROGRESS_FILE: &str = ".run-progress.json";

/// Host information recorded at run start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub go_version: String,
}

/// Contents of `.run-start.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunStart {
    pub run_id: String,
    pub scenario: String,
    pub workspace: String,
    pub agent: String,
    pub agent_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model: String,
    pub started_at: Option<DateTime<Utc>>,
    pub system: SystemInfo,
}

/// Token counts reported by an agent harness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    pub input: u64,
    pub cached_input: u64,
    pub write_cached_input: u64,
    pub output: u64,
    pub total: u64,
}

/// Contents of `.run-progress.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunProgress {
    pub run_id: String,
    pub scenario: String,
    pub agent: String,
    pub agent_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model: String,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub session: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
    pub token_usage: TokenUsage,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transcripts: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

/// Run start and progress records found in a workspace.
#[derive(Debug, Clone, Default)]
pub struct RunMetadata {
    pub start: Option<RunStart>,
    pub progress: Option<RunProgress>,
}

impl RunMetadata {
    /// Reads both bookkeeping files from `workspace_dir`.
    pub fn load(workspace_dir: &Path) -> Self {
        let start: Option<RunStart> = read_json(&workspace_dir.join(RUN_START_FILE));
        let mut progress: Option<RunProgress> = read_json(&workspace_dir.join(RUN_PROGRESS_FILE));

        if let (Some(progress), Some(start)) = (progress.as_mut(), start.as_ref()) {
            if progress.run_id.is_empty() {
                progress.run_id = start.run_id.clone();
            }
        }
        Self { start, progress }
    }

    pub fn run_id(&self) -> String {
        self.pick(|s| &s.run_id, |p| &p.run_id)
    }

    pub fn agent(&self) -> String {
        self.pick(|s| &s.agent, |p| &p.agent)
    }

    pub fn agent_version(&self) -> String {
        self.pick(|s| &s.agent_version, |p| &p.agent_version)
    }

    pub fn model(&self) -> String {
        self.pick(|s| &s.model, |p| &p.model)
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.start.as_ref().and_then(|s| s.started_at)
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.progress.as_ref().map(|p| p.duration_seconds)
    }

    pub fn token_usage(&self) -> Option<TokenUsage> {
        self.progress.as_ref().map(|p| p.token_usage)
    }

    /// Non-empty value from run start, else from progress, else empty.
    fn pick(
        &self,
        from_start: impl Fn(&RunStart) -> &String,
        from_progress: impl Fn(&RunProgress) -> &String,
    ) -> String {
        self.start
            .as_ref()
            .map(&from_start)
            .filter(|v| !v.is_empty())
            .or_else(|| self.progress.as_ref().map(&from_progress).filter(|v| !v.is_empty()))
            .cloned()
            .unwrap_or_default()
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Run metadata not readable");
            return None;
        }
    };
    match serde_json::from_slice(&data) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring malformed run metadata");
            None
        }
    }
}
