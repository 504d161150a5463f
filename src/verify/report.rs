//! The persisted verification report and its human-readable renderings.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::VerifyError;
use crate::runner::result::{RunProgress, TokenUsage};

/// Outcome of one test target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl TestResult {
    pub fn passed(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            output: output.into(),
            error: String::new(),
        }
    }

    pub fn failed(name: impl Into<String>, output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            output: output.into(),
            error: error.into(),
        }
    }
}

/// Result of one `verify` invocation. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub run_id: String,
    pub scenario: String,
    pub agent: String,
    pub agent_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<RunProgress>,
    pub verified_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_score: Option<f64>,
    pub tests: Vec<TestResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partial_tests: Vec<TestResult>,
}

impl VerificationReport {
    /// A copy with agent transcripts dropped from the embedded progress.
    pub fn without_transcripts(&self) -> Self {
        let mut clone = self.clone();
        if let Some(progress) = clone.progress.as_mut() {
            progress.transcripts.clear();
        }
        clone
    }

    /// `<date>-<run id>-<agent>-<model>.verify.json`
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}-{}-{}.verify.json",
            self.verified_at.format("%Y-%m-%d"),
            safe_part(&self.run_id, "run"),
            safe_part(&self.agent, "agent"),
            safe_part(&self.model, "model"),
        )
    }
}

/// Trimmed `value` with path separators replaced, or `fallback` when blank.
fn safe_part(value: &str, fallback: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.replace('/', "_")
    }
}

/// Writes `report` (without transcripts) under `results_dir/<scenario>/`.
pub fn write_report(results_dir: &Path, scenario: &str, report: &VerificationReport) -> Result<PathBuf, VerifyError> {
    let clean = report.without_transcripts();
    let out_dir = results_dir.join(scenario);
    fs::create_dir_all(&out_dir).map_err(|source| VerifyError::WriteReport {
        path: out_dir.clone(),
        source,
    })?;

    let path = out_dir.join(clean.file_name());
    let json = serde_json::to_string_pretty(&clean)?;
    fs::write(&path, json).map_err(|source| VerifyError::WriteReport {
        path: path.clone(),
        source,
    })?;
    info!(path = %path.display(), success = report.success, "Wrote verification report");
    Ok(path)
}

/// Per-test PASS/FAIL lines, failure reasons, partial score and result.
pub fn summary_string(report: &VerificationReport) -> String {
    let mut out = format!(
        "Verification for {} (agent={} model={})\n",
        report.scenario, report.agent, report.model
    );
    let tests = report.tests.iter().map(|t| ("", t));
    let partial = report.partial_tests.iter().map(|t| ("partial ", t));
    for (prefix, test) in tests.chain(partial) {
        let status = if test.passed { "PASS" } else { "FAIL" };
        let _ = writeln!(out, "- {prefix}{}: {status}", test.name);
        if test.passed {
            continue;
        }
        for line in test.error.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let _ = writeln!(out, "  {line}");
        }
    }
    if let Some(score) = report.partial_score.filter(|s| *s < 1.0) {
        let _ = writeln!(out, "Partial success: {score:.2}");
    }
    out.push_str(if report.success {
        "Result: success\n"
    } else {
        "Result: failure\n"
    });
    out
}

/// [`summary_string`] followed by each test's captured output and error.
pub fn detailed_string(report: &VerificationReport) -> String {
    let mut out = summary_string(report);
    let tests = report.tests.iter().map(|t| ("", t));
    let partial = report.partial_tests.iter().map(|t| ("partial ", t));
    for (prefix, test) in tests.chain(partial) {
        if test.output.is_empty() && test.error.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{prefix}{} output:", test.name);
        if !test.output.is_empty() {
            let _ = writeln!(out, "{}", test.output.trim());
        }
        if !test.error.is_empty() {
            let _ = writeln!(out, "Error: {}", test.error.trim());
        }
    }
    out.trim().to_string()
}
