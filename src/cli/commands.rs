//! CLI command definitions for agentbench.
//!
//! Every command resolves a [`BenchConfig`] from the global flags (with
//! environment fallbacks handled by clap), loads the scenario, and hands off
//! to the library.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::builder::FalseyValueParser;
use clap::Parser;
use tracing::{info, warn};

use crate::output::{ConsoleSink, Printer};
use crate::runner::cancel::{cancel_pair, CancelToken};
use crate::scenario::Scenario;
use crate::setup::run_setup;
use crate::verify::{detailed_string, TestRunner, Verifier};
use crate::workspace::{clean_scenario, BenchConfig};

/// Benchmark AI coding agents against real repositories.
#[derive(Parser, Debug)]
#[command(name = "agentbench")]
#[command(about = "Set up, verify and score AI coding agent runs")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Repository root containing testdata/.
    #[arg(long, default_value = ".", global = true)]
    pub root: PathBuf,

    /// Workspace root holding one checkout per scenario.
    #[arg(long, env = "GOAGENTBENCH_WORKSPACE", global = true)]
    pub workspace: Option<PathBuf>,

    /// Directory for verification reports (relative to --root when relative).
    #[arg(long, env = "GOAGENTBENCH_RESULTS", global = true)]
    pub results_dir: Option<PathBuf>,

    /// Skip checking that the scenario commit exists on the remote.
    #[arg(
        long,
        env = "GOAGENTBENCH_SKIP_REMOTE",
        global = true,
        value_parser = FalseyValueParser::new()
    )]
    pub skip_remote: bool,

    /// Per test target timeout in seconds.
    #[arg(long, global = true)]
    pub test_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Validate a scenario definition and print it normalized.
    #[command(name = "validate-scenario")]
    ValidateScenario(ScenarioArgs),

    /// Prepare the scenario workspace.
    Setup(ScenarioArgs),

    /// Verify an agent run for a scenario.
    Verify(VerifyArgs),
}

#[derive(Parser, Debug)]
pub struct ScenarioArgs {
    /// Scenario name under testdata/.
    pub scenario: String,
}

#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// Scenario name under testdata/.
    pub scenario: String,

    /// Print the report without writing the results file.
    #[arg(long)]
    pub only_report: bool,

    /// Also print each test's captured output.
    #[arg(long)]
    pub detailed: bool,
}

impl Cli {
    /// Builds the run configuration from the global flags.
    pub fn config(&self) -> BenchConfig {
        let mut config = BenchConfig::new(&self.root).with_skip_remote(self.skip_remote);
        if let Some(workspace) = self.workspace.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            config = config.with_workspace(workspace);
        }
        if let Some(results) = self.results_dir.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            config = config.with_results_dir(results);
        }
        if let Some(secs) = self.test_timeout {
            config = config.with_test_timeout(Duration::from_secs(secs));
        }
        config
    }
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse arguments and run.
pub async fn run() -> anyhow::Result<ExitCode> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with already parsed arguments.
///
/// Returns a failure exit code when verification fails.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = cli.config();
    let printer = Printer::stdout();

    let (handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            handle.cancel();
        }
    });

    match cli.command {
        Commands::ValidateScenario(args) => {
            let (name, scenario) = load_scenario(&config, &args.scenario)?;
            scenario
                .validate(&config.scenario_dir(&name), &config)
                .await
                .with_context(|| format!("scenario {name} is invalid"))?;
            println!("{}", serde_json::to_string_pretty(&scenario)?);
            println!("valid");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Setup(args) => {
            let (name, scenario) = load_scenario(&config, &args.scenario)?;
            run_setup(&config, &name, &scenario, &printer, &cancel)
                .await
                .with_context(|| format!("setup of {name} failed"))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Verify(args) => run_verify(&config, args, &printer, cancel).await,
    }
}

async fn run_verify(
    config: &BenchConfig,
    args: VerifyArgs,
    printer: &dyn ConsoleSink,
    cancel: CancelToken,
) -> anyhow::Result<ExitCode> {
    let (name, scenario) = load_scenario(config, &args.scenario)?;
    let outcome = Verifier::new(config, printer)
        .with_runner(TestRunner::go().with_timeout(config.test_timeout))
        .with_cancel(cancel)
        .with_only_report(args.only_report)
        .verify(&name, &scenario)
        .await
        .with_context(|| format!("verification of {name} failed to run"))?;

    if let Some(path) = &outcome.report_path {
        info!(path = %path.display(), "Report written");
    }
    if args.detailed {
        printer.app(&detailed_string(&outcome.report));
    }
    Ok(if outcome.report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn load_scenario(config: &BenchConfig, raw_name: &str) -> anyhow::Result<(String, Scenario)> {
    let name = clean_scenario(raw_name)?;
    let path = config.scenario_file(&name);
    let scenario = Scenario::load(&path)?;
    Ok((name, scenario))
}
