//! Verification of an agent's work on a scenario workspace.
//!
//! ```text
//! audit changes ─┬─ violations ─────────────────────────────────────┐
//!                └─ clean ─ inject hidden files ─ required tests    │
//!                           ─ partial tests ─ remove hidden files ──┴─ report ─ write ─ summary
//! ```
//!
//! The modification audit runs before hidden files are injected, so injected
//! files can never trip a `no-modify` rule. Hidden files are removed on every
//! path out of the test phase, including cancellation.

pub mod audit;
pub mod report;
pub mod rules;
pub mod score;
pub mod test_runner;

pub use audit::audit_changes;
pub use report::{detailed_string, summary_string, write_report, TestResult, VerificationReport};
pub use rules::{evaluate_rules, PathRule};
pub use score::{overall_success, EventCounts};
pub use test_runner::{normalize_test_target, TestRunner};

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{CopyError, VerifyError};
use crate::fsutil::{copy_destination_dir, copy_into_dir, safe_join, Reversal};
use crate::output::ConsoleSink;
use crate::runner::cancel::CancelToken;
use crate::runner::result::RunMetadata;
use crate::scenario::{CopyStep, Scenario};
use crate::workspace::BenchConfig;

/// Name of the synthetic test carrying modification-rule violations.
pub const MODIFICATION_RULES_TEST: &str = "verify.modification-rules";

/// Report produced by a verification and where it was written.
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub report: VerificationReport,
    /// `None` in report-only mode.
    pub report_path: Option<PathBuf>,
}

/// Runs the verification pipeline for one scenario workspace.
pub struct Verifier<'a> {
    config: &'a BenchConfig,
    sink: &'a dyn ConsoleSink,
    runner: TestRunner,
    cancel: CancelToken,
    only_report: bool,
}

impl<'a> Verifier<'a> {
    pub fn new(config: &'a BenchConfig, sink: &'a dyn ConsoleSink) -> Self {
        Self {
            config,
            sink,
            runner: TestRunner::go().with_timeout(config.test_timeout),
            cancel: CancelToken::never(),
            only_report: false,
        }
    }

    pub fn with_runner(mut self, runner: TestRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Print the summary without writing the report file.
    pub fn with_only_report(mut self, only_report: bool) -> Self {
        self.only_report = only_report;
        self
    }

    /// Audits, tests and reports on `scenario_name`'s workspace.
    ///
    /// Rule violations and failing tests produce a report with
    /// `success == false`; errors are reserved for configuration problems,
    /// copy failures, I/O and cancellation.
    pub async fn verify(&self, scenario_name: &str, scenario: &Scenario) -> Result<VerifyOutcome, VerifyError> {
        let scenario_dir = self.config.scenario_dir(scenario_name);
        let workspace_dir = self.config.workspace_dir(scenario_name);

        scenario.validate(&scenario_dir, self.config).await?;
        if !workspace_dir.is_dir() {
            return Err(VerifyError::WorkspaceMissing(workspace_dir));
        }
        let metadata = RunMetadata::load(&workspace_dir);

        let changes = audit_changes(&workspace_dir).await?;
        let violations = evaluate_rules(
            &changes,
            scenario.verify.must_modify.as_slice(),
            &scenario.verify.no_modify,
            &workspace_dir,
        );

        let report = if violations.is_empty() {
            self.run_tests(scenario_name, scenario, &scenario_dir, &workspace_dir, &metadata)
                .await?
        } else {
            warn!(scenario = scenario_name, violations = ?violations, "Modification rules violated");
            let tests = vec![TestResult::failed(MODIFICATION_RULES_TEST, "", violations.join("\n"))];
            build_report(scenario_name, &metadata, tests, Vec::new(), None, false)
        };

        self.finish(scenario_name, report)
    }

    async fn run_tests(
        &self,
        scenario_name: &str,
        scenario: &Scenario,
        scenario_dir: &Path,
        workspace_dir: &Path,
        metadata: &RunMetadata,
    ) -> Result<VerificationReport, VerifyError> {
        let hidden = apply_verify_copies(&scenario.verify.copy, scenario_dir, workspace_dir)?.guard();

        let tests = self
            .runner
            .run_required(workspace_dir, scenario.verify.tests.as_slice(), self.sink, &self.cancel)
            .await?;

        let partial_entries = scenario.verify.partial_tests.as_slice();
        let (partial_tests, counts) = self
            .runner
            .run_partial(workspace_dir, partial_entries, self.sink, &self.cancel)
            .await?;
        let partial_score = (!partial_entries.is_empty()).then(|| counts.score());

        hidden.revert();

        let success = overall_success(&tests, partial_score);
        info!(
            scenario = scenario_name,
            success,
            partial_score = ?partial_score,
            "Verification finished"
        );
        Ok(build_report(scenario_name, metadata, tests, partial_tests, partial_score, success))
    }

    fn finish(&self, scenario_name: &str, report: VerificationReport) -> Result<VerifyOutcome, VerifyError> {
        let report_path = if self.only_report {
            None
        } else {
            Some(write_report(&self.config.results_dir, scenario_name, &report)?)
        };
        self.sink.app(&summary_string(&report));
        Ok(VerifyOutcome { report, report_path })
    }
}

fn build_report(
    scenario_name: &str,
    metadata: &RunMetadata,
    tests: Vec<TestResult>,
    partial_tests: Vec<TestResult>,
    partial_score: Option<f64>,
    success: bool,
) -> VerificationReport {
    VerificationReport {
        run_id: metadata.run_id(),
        scenario: scenario_name.to_string(),
        agent: metadata.agent(),
        agent_version: metadata.agent_version(),
        model: metadata.model(),
        started_at: metadata.started_at(),
        progress: metadata.progress.clone(),
        verified_at: Utc::now(),
        duration_seconds: metadata.duration_seconds(),
        token_usage: metadata.token_usage(),
        success,
        partial_score,
        tests,
        partial_tests,
    }
}

/// Copies every `verify.copy` step into the workspace, overwriting.
///
/// If a step fails, steps already applied are reverted before the error is
/// returned.
pub fn apply_verify_copies(steps: &[CopyStep], scenario_dir: &Path, workspace_dir: &Path) -> Result<Reversal, VerifyError> {
    let mut applied = Vec::with_capacity(steps.len());
    for step in steps {
        match copy_verify_step(step, scenario_dir, workspace_dir) {
            Ok(reversal) => applied.push(reversal),
            Err(e) => {
                warn!(from = %step.from, to = %step.to, error = %e, "Verify copy failed, reverting earlier steps");
                Reversal::chain(applied).revert();
                return Err(e.into());
            }
        }
    }
    Ok(Reversal::chain(applied))
}

fn copy_verify_step(step: &CopyStep, scenario_dir: &Path, workspace_dir: &Path) -> Result<Reversal, CopyError> {
    let src = scenario_dir.join(&step.from);
    let meta = fs::metadata(&src).map_err(|e| CopyError::io(&src, e))?;
    let dst = if meta.is_dir() {
        safe_join(workspace_dir, &step.to)?
    } else {
        safe_join(workspace_dir, &copy_destination_dir(&step.to).to_string_lossy())?
    };
    copy_into_dir(&src, &dst, true)
}
