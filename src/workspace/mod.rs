//! On-disk layout of scenarios, workspaces and results.
//!
//! ```text
//! <root>/testdata/<scenario>/scenario.yml   scenario definition and copy sources
//! <workspace>/<scenario>/                   git working tree the agent edits
//! <results>/<scenario>/*.verify.json        verification reports
//! ```

pub mod config;

pub use config::BenchConfig;

use std::path::{Path, PathBuf};

use crate::error::ScenarioError;
use crate::fsutil::clean_path;

/// File name of a scenario definition inside its testdata directory.
pub const SCENARIO_FILE: &str = "scenario.yml";

/// Normalizes a scenario name and rejects names that leave `testdata/`.
pub fn clean_scenario(name: &str) -> Result<String, ScenarioError> {
    if name.trim().is_empty() {
        return Err(ScenarioError::MissingField("scenario"));
    }
    if Path::new(name).is_absolute() {
        return Err(ScenarioError::InvalidName(format!(
            "{name}: scenario must be relative"
        )));
    }
    let cleaned = clean_path(name);
    if cleaned == "." || cleaned.starts_with("..") {
        return Err(ScenarioError::InvalidName(format!(
            "{name}: scenario path cannot point outside testdata"
        )));
    }
    Ok(cleaned)
}

pub fn scenario_dir(root: &Path, name: &str) -> PathBuf {
    root.join("testdata").join(name)
}

pub fn scenario_file(root: &Path, name: &str) -> PathBuf {
    scenario_dir(root, name).join(SCENARIO_FILE)
}

pub fn workspace_scenario_dir(workspace: &Path, name: &str) -> PathBuf {
    workspace.join(name)
}
