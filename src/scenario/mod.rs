//! Scenario definitions (`testdata/<name>/scenario.yml`).

pub mod targets;

pub use targets::{parse_targets, TestTarget};

use std::fs;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::ScenarioError;
use crate::runner::executor::run_captured;
use crate::workspace::BenchConfig;

/// One benchmark task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Scenario {
    pub name: String,
    pub repo: String,
    pub commit: String,
    pub classification: Classification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup: Option<SetupConfig>,
    pub agent: AgentConfig,
    pub verify: VerifyConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Classification {
    #[serde(rename = "type")]
    pub kind: String,
    pub has_spec: Option<bool>,
    pub single_package: Option<bool>,
    pub sees_failing_tests: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupConfig {
    pub copy: Vec<CopyStep>,
}

/// Copies `from` (relative to the scenario directory) to `to` (relative to
/// the workspace).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyStep {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AgentConfig {
    pub instructions: String,
    pub allow_multiple_turns: bool,
    pub allow_multiple_turns_on_failed_verify: bool,
}

/// Rules and tests applied after the agent finishes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct VerifyConfig {
    pub must_modify: StringList,
    pub no_modify: Vec<String>,
    /// Hidden files injected only while tests run.
    pub copy: Vec<CopyStep>,
    pub tests: StringList,
    pub partial_tests: StringList,
}

/// A YAML field that may be written as one string or a list of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StringList(pub Vec<String>);

impl StringList {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for StringList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
            None => Self::default(),
            Some(OneOrMany::One(value)) if value.is_empty() => Self::default(),
            Some(OneOrMany::One(value)) => Self(vec![value]),
            Some(OneOrMany::Many(values)) => Self(values),
        })
    }
}

impl From<Vec<&str>> for StringList {
    fn from(values: Vec<&str>) -> Self {
        Self(values.into_iter().map(String::from).collect())
    }
}

impl Scenario {
    /// Reads and parses a scenario file without validating it.
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let data = fs::read_to_string(path).map_err(|source| ScenarioError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&data).map_err(|source| ScenarioError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn test_targets(&self) -> Result<Vec<TestTarget>, ScenarioError> {
        parse_targets("verify.tests", self.verify.tests.as_slice())
    }

    pub fn partial_test_targets(&self) -> Result<Vec<TestTarget>, ScenarioError> {
        parse_targets("verify.partial-tests", self.verify.partial_tests.as_slice())
    }

    pub fn setup_copies(&self) -> &[CopyStep] {
        self.setup.as_ref().map(|s| s.copy.as_slice()).unwrap_or_default()
    }

    /// Checks everything that can be checked without the network.
    pub fn validate_local(&self, scenario_dir: &Path) -> Result<(), ScenarioError> {
        let required = [
            (&self.name, "scenario name"),
            (&self.repo, "scenario repo"),
            (&self.commit, "scenario commit"),
            (&self.classification.kind, "classification.type"),
            (&self.agent.instructions, "agent.instructions"),
        ];
        if let Some((_, field)) = required.iter().find(|(value, _)| value.trim().is_empty()) {
            return Err(ScenarioError::MissingField(*field));
        }

        self.test_targets()?;
        self.partial_test_targets()?;
        validate_copy_steps(self.setup_copies(), scenario_dir)?;
        validate_copy_steps(&self.verify.copy, scenario_dir)?;

        if !looks_like_sha(&self.commit) {
            return Err(ScenarioError::InvalidCommit(self.commit.clone()));
        }
        if self
            .verify
            .must_modify
            .as_slice()
            .iter()
            .any(|rule| rule.trim().is_empty())
        {
            return Err(ScenarioError::EmptyMustModify);
        }
        Ok(())
    }

    /// Full validation: [`Scenario::validate_local`], then (unless
    /// `config.skip_remote`) confirms the commit exists on the remote.
    pub async fn validate(&self, scenario_dir: &Path, config: &BenchConfig) -> Result<(), ScenarioError> {
        self.validate_local(scenario_dir)?;
        if config.skip_remote {
            debug!(scenario = %self.name, "Skipping remote commit check");
            return Ok(());
        }
        check_remote_commit(&config.root, &self.repo, &self.commit).await
    }
}

fn validate_copy_steps(steps: &[CopyStep], scenario_dir: &Path) -> Result<(), ScenarioError> {
    for step in steps {
        if step.from.is_empty() || step.to.is_empty() {
            return Err(ScenarioError::IncompleteCopyStep);
        }
        if !scenario_dir.join(&step.from).exists() {
            return Err(ScenarioError::MissingCopySource(step.from.clone()));
        }
    }
    Ok(())
}

fn looks_like_sha(commit: &str) -> bool {
    Regex::new(r"^[a-fA-F0-9]{7,}$")
        .map(|re| re.is_match(commit))
        .unwrap_or(false)
}

/// Returns a URL `git clone` accepts; bare `host/org/repo` gets `https://`.
pub fn normalize_repo_url(repo: &str) -> String {
    const PASS_THROUGH: [&str; 4] = ["http://", "https://", "git@", "file://"];
    if PASS_THROUGH.iter().any(|prefix| repo.starts_with(prefix)) || Path::new(repo).is_absolute() {
        return repo.to_string();
    }
    format!("https://{repo}")
}

async fn check_remote_commit(dir: &Path, repo: &str, commit: &str) -> Result<(), ScenarioError> {
    let url = normalize_repo_url(repo);
    let args = vec!["ls-remote".to_string(), url.clone(), commit.to_string()];
    run_captured(dir, "git", &args)
        .await
        .map(|_| ())
        .map_err(|e| ScenarioError::RemoteCommit {
            url,
            commit: commit.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const VALID: &str = r#"
name: tiny
repo: github.com/example/tiny
commit: 0123abcd
classification:
  type: bugfix
  has-spec: true
agent:
  instructions: Fix the bug.
verify:
  must-modify: pkg
  no-modify:
    - secret.txt
  copy:
    - from: hidden/extra_test.go
      to: pkg/
  tests: ./pkg
  partial-tests:
    - ./pkg -run TestPartial
"#;

    fn write_scenario(yaml: &str) -> (TempDir, Scenario) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("hidden")).unwrap();
        fs::write(dir.path().join("hidden/extra_test.go"), "package pkg").unwrap();
        let path = dir.path().join("scenario.yml");
        fs::write(&path, yaml).unwrap();
        let scenario = Scenario::load(&path).unwrap();
        (dir, scenario)
    }

    #[test]
    fn test_load_accepts_string_or_list() {
        let (_dir, sc) = write_scenario(VALID);
        assert_eq!(sc.name, "tiny");
        assert_eq!(sc.classification.kind, "bugfix");
        assert_eq!(sc.classification.has_spec, Some(true));
        assert_eq!(sc.verify.must_modify, StringList::from(vec!["pkg"]));
        assert_eq!(sc.verify.tests, StringList::from(vec!["./pkg"]));
        assert_eq!(sc.verify.partial_tests.as_slice().len(), 1);
        assert!(sc.setup_copies().is_empty());
    }

    #[test]
    fn test_validate_local_accepts_valid() {
        let (dir, sc) = write_scenario(VALID);
        sc.validate_local(dir.path()).unwrap();
        let targets = sc.partial_test_targets().unwrap();
        assert_eq!(targets[0].run.as_deref(), Some("TestPartial"));
    }

    #[test]
    fn test_validate_local_rejects_problems() {
        let cases = [
            (VALID.replace("name: tiny", "name: ''"), "scenario name is required"),
            (VALID.replace("commit: 0123abcd", "commit: main"), "does not look like a git sha"),
            (VALID.replace("from: hidden/extra_test.go", "from: missing.go"), "copy source does not exist"),
            (VALID.replace("must-modify: pkg", "must-modify: ['  ']"), "must-modify entries cannot be empty"),
            (VALID.replace("tests: ./pkg", "tests: pkg/"), "verify.tests entry"),
        ];
        for (yaml, want) in cases {
            let (dir, sc) = write_scenario(&yaml);
            let err = sc.validate_local(dir.path()).unwrap_err().to_string();
            assert!(err.contains(want), "got {err:?}, want {want:?}");
        }
    }

    #[tokio::test]
    async fn test_validate_skips_remote_when_configured() {
        let (dir, sc) = write_scenario(VALID);
        let config = BenchConfig::new(dir.path()).with_skip_remote(true);
        sc.validate(dir.path(), &config).await.unwrap();
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scenario.yml");
        fs::write(&path, "verify: [unclosed").unwrap();
        assert!(matches!(Scenario::load(&path), Err(ScenarioError::Parse { .. })));
    }

    #[test]
    fn test_normalize_repo_url() {
        assert_eq!(normalize_repo_url("github.com/a/b"), "https://github.com/a/b");
        assert_eq!(normalize_repo_url("https://github.com/a/b"), "https://github.com/a/b");
        assert_eq!(normalize_repo_url("git@github.com:a/b.git"), "git@github.com:a/b.git");
        assert_eq!(normalize_repo_url("file:///tmp/repo"), "file:///tmp/repo");
        assert_eq!(normalize_repo_url("/tmp/repo"), "/tmp/repo");
    }
}
