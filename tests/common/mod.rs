//! Shared fixtures: scenario trees, git workspaces and a fake test runner.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use agentbench::verify::TestRunner;
use agentbench::workspace::BenchConfig;
use tempfile::TempDir;

/// Runs git in `dir` with a throwaway identity, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=bench",
            "-c",
            "user.email=bench@example.com",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "init.defaultBranch=main",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git should run");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Initializes a repository with `files`, commits, and returns HEAD.
pub fn init_repo(dir: &Path, files: &[(&str, &str)]) -> String {
    fs::create_dir_all(dir).unwrap();
    git(dir, &["init", "-q"]);
    for (rel, content) in files {
        write_file(dir, rel, content);
    }
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", "initial"]);
    git(dir, &["rev-parse", "HEAD"])
}

/// One `go test`-style JSON event line.
pub fn event(action: &str, test: &str) -> String {
    format!("{{\"Action\":\"{action}\",\"Package\":\"example/pkg\",\"Test\":\"{test}\"}}\n")
}

/// A test runner that, for its last argument `<dir>`, prints
/// `<dir>/events.jsonl` and exits with the code in `<dir>/exit_code` (0 when
/// absent).
pub fn fake_runner(tools: &Path) -> TestRunner {
    let script = tools.join("fake-go-test.sh");
    write_file(
        tools,
        "fake-go-test.sh",
        r#"for arg in "$@"; do target="$arg"; done
if [ -f "$target/events.jsonl" ]; then cat "$target/events.jsonl"; fi
if [ -f "$target/exit_code" ]; then exit "$(cat "$target/exit_code")"; fi
exit 0
"#,
    );
    TestRunner::new("sh", vec![script.to_string_lossy().into_owned()])
}

/// A repository root with `testdata/<name>/`, a workspace checkout and a
/// results directory, all inside one temp dir.
pub struct Fixture {
    pub root: TempDir,
    pub tools: TempDir,
    pub name: String,
    pub config: BenchConfig,
}

impl Fixture {
    /// Creates `testdata/<name>/scenario.yml` from `verify_yaml` (the body of
    /// the `verify:` mapping, indented by two spaces) and a committed
    /// workspace holding `files`.
    pub fn new(name: &str, verify_yaml: &str, files: &[(&str, &str)]) -> Self {
        let root = TempDir::new().unwrap();
        let tools = TempDir::new().unwrap();
        let config = BenchConfig::new(root.path()).with_skip_remote(true);

        let scenario = format!(
            "name: {name}\n\
             repo: github.com/example/{name}\n\
             commit: 0123abcd\n\
             classification:\n  type: bugfix\n\
             agent:\n  instructions: Make the change.\n\
             verify:\n{verify_yaml}"
        );
        write_file(&config.scenario_dir(name), "scenario.yml", &scenario);
        init_repo(&config.workspace_dir(name), files);

        Self {
            root,
            tools,
            name: name.to_string(),
            config,
        }
    }

    pub fn workspace(&self) -> PathBuf {
        self.config.workspace_dir(&self.name)
    }

    pub fn scenario_dir(&self) -> PathBuf {
        self.config.scenario_dir(&self.name)
    }

    pub fn scenario(&self) -> agentbench::scenario::Scenario {
        agentbench::scenario::Scenario::load(&self.config.scenario_file(&self.name)).unwrap()
    }

    pub fn runner(&self) -> TestRunner {
        fake_runner(self.tools.path())
    }
}
