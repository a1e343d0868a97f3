//! # aaa-cli
//!
//! Binary entry point for the arrange-act-assert test runner.
//!
//! This crate provides:
//! - CLI argument parsing using `clap`
//! - Configuration loading from `aaa.yml` with command-line overrides
//! - Logging initialization
//! - Exit codes: 0 when every test passed, 1 on test failures, 2 on runner errors

use aaa_core::{SuiteConfig, TestResult, TestSuite};
use anyhow::{Context, Result};
use clap::builder::RangedU64ValueParser;
use clap::{Parser, ValueEnum};
use std::io::{IsTerminal, stdout};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::task::LocalSet;
use tracing::{debug, error, info};

/// Color output mode for the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMode {
    /// Use colors when the config allows it and stdout is a TTY
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl ColorMode {
    fn should_use_colors(self, configured: bool) -> bool {
        match self {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => configured && stdout().is_terminal(),
        }
    }
}

/// Arrange-act-assert test runner
#[derive(Parser, Debug)]
#[command(name = "aaa", version, about)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "aaa.yml")]
    config: PathBuf,

    /// Folder scanned for test files
    #[arg(short, long)]
    folder: Option<PathBuf>,

    /// Test files run concurrently, at least 1 (defaults to the CPU count)
    #[arg(short = 'j', long, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    parallel: Option<usize>,

    /// Regex a test file path must match (replaces the configured list)
    #[arg(long)]
    include: Vec<String>,

    /// Regex that excludes a path (added to the configured list)
    #[arg(long)]
    exclude: Vec<String>,

    /// Command used to launch each test file, one argument per flag
    #[arg(long, allow_hyphen_values = true)]
    prefix: Vec<String>,

    /// Folder holding snapshot files
    #[arg(long)]
    snapshots_folder: Option<PathBuf>,

    /// Confirm recorded snapshots that did not change
    #[arg(long)]
    confirm_snapshots: bool,

    /// Fail every snapshot so it can be reviewed
    #[arg(long)]
    review_snapshots: bool,

    /// Rewrite every snapshot and require confirmation again
    #[arg(long)]
    regenerate_snapshots: bool,

    /// Collect coverage from test files
    #[arg(long)]
    coverage: bool,

    /// Write collected coverage payloads as JSON to this file
    #[arg(long, requires = "coverage")]
    coverage_file: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Color output mode (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorMode::Auto)]
    color: ColorMode,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout belongs to the reporter.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run_command(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

/// Runs the suite and reports whether it passed.
async fn run_command(cli: Cli) -> Result<bool> {
    let mut config = SuiteConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    apply_overrides(&mut config, &cli);
    check_parallel(&config)?;
    debug!(?config, "Effective configuration");

    let suite = TestSuite::new(config).context("Invalid test suite configuration")?;
    let result = LocalSet::new()
        .run_until(suite.run())
        .await
        .context("Test run failed")?;

    info!(
        files = result.files.len(),
        passed = result.summary.total.ok,
        failed = result.summary.total.error,
        run_errors = result.run_errors.len(),
        "Test run finished"
    );
    if let Some(path) = &cli.coverage_file {
        write_coverage(path, &result)?;
    }
    Ok(result.ok)
}

/// Applies command-line flags on top of the loaded configuration.
fn apply_overrides(config: &mut SuiteConfig, cli: &Cli) {
    if let Some(folder) = &cli.folder {
        config.folder = folder.clone();
    }
    if let Some(parallel) = cli.parallel {
        config.parallel = parallel;
    }
    if !cli.include.is_empty() {
        config.include = cli.include.clone();
    }
    config.exclude.extend(cli.exclude.iter().cloned());
    if !cli.prefix.is_empty() {
        config.prefix = cli.prefix.clone();
    }
    if let Some(folder) = &cli.snapshots_folder {
        config.test.snapshots_folder = folder.clone();
    }
    config.test.confirm_snapshots |= cli.confirm_snapshots;
    config.test.review_snapshots |= cli.review_snapshots;
    config.test.regenerate_snapshots |= cli.regenerate_snapshots;
    config.test.coverage |= cli.coverage;
    config.color = cli.color.should_use_colors(config.color);
}

/// `parallel: 0` runs registered in-process entries, and the binary has none.
fn check_parallel(config: &SuiteConfig) -> Result<()> {
    anyhow::ensure!(
        config.parallel > 0,
        "parallel must be at least 1: the aaa binary only runs test files as child processes"
    );
    Ok(())
}

fn write_coverage(path: &Path, result: &TestResult) -> Result<()> {
    let entries: Vec<_> = result
        .coverage
        .iter()
        .map(|(file, coverage)| serde_json::json!({ "file": file, "coverage": coverage }))
        .collect();
    let content = serde_json::to_string_pretty(&entries)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write coverage to {:?}", path))?;
    info!(path = %path.display(), files = entries.len(), "Coverage written");
    Ok(())
}
