//! Run-wide configuration threaded into setup and verification.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fsutil::clean;

/// Where scenarios, workspaces and results live, plus runner knobs.
///
/// Built once by the CLI; library code never reads the process environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Repository root holding `testdata/`.
    pub root: PathBuf,
    /// Directory with one git working tree per scenario.
    pub workspace: PathBuf,
    /// Directory receiving verification reports.
    pub results_dir: PathBuf,
    /// Skip the `git ls-remote` commit check during validation.
    pub skip_remote: bool,
    /// Deadline applied to each test target invocation.
    pub test_timeout: Option<Duration>,
}

impl BenchConfig {
    /// Defaults rooted at `root`: `root/workspace` and `root/results`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            workspace: root.join("workspace"),
            results_dir: root.join("results"),
            root,
            skip_remote: false,
            test_timeout: None,
        }
    }

    /// Sets the workspace root. Relative paths are resolved against `root`.
    pub fn with_workspace(mut self, workspace: impl AsRef<Path>) -> Self {
        self.workspace = self.resolve(workspace.as_ref());
        self
    }

    /// Sets the results directory. Relative paths are resolved against `root`.
    pub fn with_results_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.results_dir = self.resolve(dir.as_ref());
        self
    }

    pub fn with_skip_remote(mut self, skip: bool) -> Self {
        self.skip_remote = skip;
        self
    }

    pub fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = Some(timeout);
        self
    }

    /// Scenario definition directory under `testdata/`.
    pub fn scenario_dir(&self, name: &str) -> PathBuf {
        super::scenario_dir(&self.root, name)
    }

    pub fn scenario_file(&self, name: &str) -> PathBuf {
        super::scenario_file(&self.root, name)
    }

    /// Working tree for one scenario.
    pub fn workspace_dir(&self, name: &str) -> PathBuf {
        super::workspace_scenario_dir(&self.workspace, name)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            clean(path)
        } else {
            self.root.join(clean(path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BenchConfig::new("/repo");
        assert_eq!(config.workspace, PathBuf::from("/repo/workspace"));
        assert_eq!(config.results_dir, PathBuf::from("/repo/results"));
        assert!(!config.skip_remote);
        assert!(config.test_timeout.is_none());
    }

    #[test]
    fn test_builder_resolves_relative_paths() {
        let config = BenchConfig::new("/repo")
            .with_workspace("/tmp/ws/")
            .with_results_dir("./out/results")
            .with_skip_remote(true)
            .with_test_timeout(Duration::from_secs(30));

        assert_eq!(config.workspace, PathBuf::from("/tmp/ws"));
        assert_eq!(config.results_dir, PathBuf::from("/repo/out/results"));
        assert!(config.skip_remote);
        assert_eq!(config.test_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.workspace_dir("tiny"), PathBuf::from("/tmp/ws/tiny"));
        assert_eq!(
            config.scenario_file("tiny"),
            PathBuf::from("/repo/testdata/tiny/scenario.yml")
        );
    }
}
