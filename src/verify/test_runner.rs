//! Runs configured test targets and turns each run into a [`TestResult`].

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use super::report::TestResult;
use super::score::EventCounts;
use crate::error::{ProcessError, VerifyError};
use crate::output::ConsoleSink;
use crate::runner::cancel::CancelToken;
use crate::runner::executor::{describe_exit, run_streaming};
use crate::scenario::targets::has_glob;

/// How to invoke the test runner. Defaults to `go test`.
#[derive(Debug, Clone)]
pub struct TestRunner {
    program: String,
    base_args: Vec<String>,
    json_flag: String,
    strip_prefix: String,
    timeout: Option<Duration>,
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::go()
    }
}

impl TestRunner {
    /// `go test [-json] <args>`
    pub fn go() -> Self {
        Self::new("go", vec!["test".to_string()])
    }

    pub fn new(program: impl Into<String>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
            json_flag: "-json".to_string(),
            strip_prefix: "go test".to_string(),
            timeout: None,
        }
    }

    /// Flag requesting line-delimited JSON events.
    pub fn with_json_flag(mut self, flag: impl Into<String>) -> Self {
        self.json_flag = flag.into();
        self
    }

    /// Leading text of an entry naming the runner itself, stripped before parsing.
    pub fn with_strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.strip_prefix = prefix.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Splits `entry` into runner arguments, normalizing the target.
    pub fn parse_args(&self, workdir: &Path, entry: &str) -> Result<Vec<String>, String> {
        let mut trimmed = entry.trim();
        if trimmed.is_empty() {
            return Err("empty test entry".to_string());
        }
        if !self.strip_prefix.is_empty() {
            if let Some(rest) = trimmed.strip_prefix(self.strip_prefix.as_str()) {
                trimmed = rest.trim();
            }
        }
        let mut args = shell_words::split(trimmed).map_err(|e| e.to_string())?;
        let Some(first) = args.first_mut() else {
            return Err(format!("no args parsed from {entry:?}"));
        };
        *first = normalize_test_target(first, workdir);
        Ok(args)
    }

    /// Runs one entry. Everything except cancellation is recorded as a failed
    /// result rather than returned as an error.
    pub async fn run_target(
        &self,
        workdir: &Path,
        entry: &str,
        structured: bool,
        sink: &dyn ConsoleSink,
        cancel: &CancelToken,
    ) -> Result<TestResult, VerifyError> {
        let args = match self.parse_args(workdir, entry) {
            Ok(args) => args,
            Err(reason) => {
                warn!(entry, error = %reason, "Unparseable test entry");
                return Ok(TestResult::failed(entry, "", reason));
            }
        };

        let mut cmd_args = self.base_args.clone();
        if structured && !self.json_flag.is_empty() {
            cmd_args.push(self.json_flag.clone());
        }
        cmd_args.extend(args);

        info!(entry, structured, "Running test target");
        let result = match run_streaming(workdir, &self.program, &cmd_args, sink, cancel, self.timeout).await {
            Ok(out) if out.success() => TestResult::passed(entry, out.output_lossy()),
            Ok(out) => TestResult::failed(entry, out.output_lossy(), describe_exit(&out.status)),
            Err(ProcessError::Cancelled) => return Err(VerifyError::Cancelled),
            Err(e) => TestResult::failed(entry, "", e.to_string()),
        };
        info!(entry, passed = result.passed, "Test target finished");
        Ok(result)
    }

    /// Runs `entries` in structured mode, returning results and event counts.
    pub async fn run_partial(
        &self,
        workdir: &Path,
        entries: &[String],
        sink: &dyn ConsoleSink,
        cancel: &CancelToken,
    ) -> Result<(Vec<TestResult>, EventCounts), VerifyError> {
        let mut results = Vec::with_capacity(entries.len());
        let mut counts = EventCounts::default();
        for entry in entries {
            let result = self.run_target(workdir, entry, true, sink, cancel).await?;
            counts += EventCounts::from_output(&result.output);
            results.push(result);
        }
        Ok((results, counts))
    }

    /// Runs `entries` for pass/fail only.
    pub async fn run_required(
        &self,
        workdir: &Path,
        entries: &[String],
        sink: &dyn ConsoleSink,
        cancel: &CancelToken,
    ) -> Result<Vec<TestResult>, VerifyError> {
        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            results.push(self.run_target(workdir, entry, false, sink, cancel).await?);
        }
        Ok(results)
    }
}

/// Prefixes `./` to a bare relative target that exists under `workdir`, so
/// the runner does not take it for a module import path.
pub fn normalize_test_target(target: &str, workdir: &Path) -> String {
    if target.is_empty()
        || target.starts_with("./")
        || target.starts_with("../")
        || target.starts_with('/')
    {
        return target.to_string();
    }

    let mut base = target.strip_suffix("/...").unwrap_or(target);
    if has_glob(base) {
        base = match base.rfind('/') {
            Some(idx) => &base[..idx],
            None => ".",
        };
    }
    if base.is_empty() {
        return target.to_string();
    }
    if workdir.join(base).exists() {
        format!("./{target}")
    } else {
        target.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CaptureSink;
    use std::fs;
    use tempfile::TempDir;

    fn workdir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("pkg/sub")).unwrap();
        dir
    }

    #[test]
    fn test_normalize_test_target() {
        let dir = workdir();
        let wd = dir.path();
        assert_eq!(normalize_test_target("pkg", wd), "./pkg");
        assert_eq!(normalize_test_target("pkg/...", wd), "./pkg/...");
        assert_eq!(normalize_test_target("pkg/*_test.go", wd), "./pkg/*_test.go");
        assert_eq!(normalize_test_target("./pkg", wd), "./pkg");
        assert_eq!(normalize_test_target("../pkg", wd), "../pkg");
        assert_eq!(normalize_test_target("/abs/pkg", wd), "/abs/pkg");
        assert_eq!(normalize_test_target("github.com/x/y", wd), "github.com/x/y");
        assert_eq!(normalize_test_target("", wd), "");
    }

    #[test]
    fn test_parse_args() {
        let dir = workdir();
        let runner = TestRunner::go();
        assert_eq!(
            runner.parse_args(dir.path(), "go test pkg -run 'TestA|TestB'").unwrap(),
            vec!["./pkg", "-run", "TestA|TestB"]
        );
        assert_eq!(runner.parse_args(dir.path(), "  ").unwrap_err(), "empty test entry");
        assert!(runner.parse_args(dir.path(), "pkg -run 'open").is_err());
        assert!(runner.parse_args(dir.path(), "go test").is_err());
    }

    fn fake_runner(dir: &Path, script: &str) -> TestRunner {
        let path = dir.join("runner.sh");
        fs::write(&path, format!("{script}\n")).unwrap();
        TestRunner::new("sh", vec![path.to_string_lossy().into_owned()])
    }

    #[tokio::test]
    async fn test_run_target_exit_status_decides() {
        let dir = workdir();
        let tools = TempDir::new().unwrap();
        let runner = fake_runner(tools.path(), r#"echo "args: $*"; [ "$1" != "./pkg/sub" ]"#);
        let sink = CaptureSink::new();

        let ok = runner
            .run_target(dir.path(), "pkg", false, &sink, &CancelToken::never())
            .await
            .unwrap();
        assert!(ok.passed);
        assert_eq!(ok.output, "args: ./pkg\n");

        let failed = runner
            .run_target(dir.path(), "pkg/sub", false, &sink, &CancelToken::never())
            .await
            .unwrap();
        assert!(!failed.passed);
        assert_eq!(failed.error, "exit status 1");
        assert_eq!(String::from_utf8(sink.output()).unwrap(), "args: ./pkg\nargs: ./pkg/sub\n");
    }

    #[tokio::test]
    async fn test_structured_run_adds_json_flag() {
        let dir = workdir();
        let tools = TempDir::new().unwrap();
        let runner = fake_runner(
            tools.path(),
            r#"[ "$1" = "-json" ] || exit 2
echo '{"Action":"pass","Test":"TestA"}'
echo '{"Action":"fail","Test":"TestB"}'
exit 1"#,
        );

        let (results, counts) = runner
            .run_partial(dir.path(), &["pkg".to_string()], &CaptureSink::new(), &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].passed);
        assert_eq!(counts, EventCounts { passed: 1, total: 2 });
    }

    #[tokio::test]
    async fn test_spawn_failure_is_failed_result() {
        let dir = workdir();
        let runner = TestRunner::new("definitely-not-a-runner-xyz", Vec::new());
        let result = runner
            .run_target(dir.path(), "pkg", false, &CaptureSink::new(), &CancelToken::never())
            .await
            .unwrap();
        assert!(!result.passed);
        assert!(result.error.contains("failed to start"));
    }

    #[tokio::test]
    async fn test_parse_failure_is_failed_result() {
        let dir = workdir();
        let result = TestRunner::go()
            .run_target(dir.path(), "pkg -run 'open", false, &CaptureSink::new(), &CancelToken::never())
            .await
            .unwrap();
        assert!(!result.passed);
        assert_eq!(result.name, "pkg -run 'open");
        assert!(!result.error.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_propagates() {
        let dir = workdir();
        let (handle, token) = crate::runner::cancel::cancel_pair();
        handle.cancel();
        let err = TestRunner::new("sleep", Vec::new())
            .run_target(dir.path(), "30", false, &CaptureSink::new(), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Cancelled));
    }
}
