//! Entry point for a test file binary.
//!
//! A test file is an executable whose `main` hands its registration function
//! to [`run_test_file_main`]. Spawned by a suite, it streams envelopes to the
//! parent; run directly, it prints with the default reporter and a summary.

use crate::bridge::{ChildChannel, is_child_process, test_options_from_env};
use crate::config::TestOptions;
use crate::coverage::CoverageSource;
use crate::engine::{Root, Suite};
use crate::formatter::{Formatter, check_summary};
use crate::reporter::OrderedReporter;
use aaa_proto::Message;
use std::process::ExitCode;
use tokio::task::LocalSet;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Where a test file sends its results.
pub(crate) enum FileOutput {
    /// Spawned by a suite: every message goes to the parent as an envelope.
    Parent(ChildChannel),
    /// Run directly: messages are rendered locally and the summary is checked.
    Local(Box<dyn Formatter>),
}

/// Runs `register` on a fresh root and returns the process exit code.
///
/// ```ignore
/// fn main() -> std::process::ExitCode {
///     aaa_core::run_test_file_main(|suite| {
///         suite.test("adds", Stages::new().act(|_, _| async { Ok(1 + 1) }));
///     })
/// }
/// ```
pub fn run_test_file_main<F>(register: F) -> ExitCode
where
    F: FnOnce(&Suite),
{
    run_with_coverage(register, None)
}

/// Like [`run_test_file_main`], reporting coverage when the options ask for it.
pub fn run_test_file_main_with_coverage<F>(register: F, coverage: Box<dyn CoverageSource>) -> ExitCode
where
    F: FnOnce(&Suite),
{
    run_with_coverage(register, Some(coverage))
}

/// Logs go to stderr. A spawned file's stderr is captured by the parent.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // The binary may already have installed its own subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_with_coverage<F>(register: F, coverage: Option<Box<dyn CoverageSource>>) -> ExitCode
where
    F: FnOnce(&Suite),
{
    init_logging();

    let options = match test_options_from_env() {
        Ok(options) => options,
        Err(e) => {
            error!(error = %e, "Invalid options from the parent process");
            return ExitCode::from(2);
        }
    };
    let output = if is_child_process() {
        FileOutput::Parent(ChildChannel::stdout())
    } else {
        FileOutput::Local(Box::new(OrderedReporter::stdout(true)))
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to build the test runtime");
            return ExitCode::from(2);
        }
    };
    let local = LocalSet::new();
    local.block_on(&runtime, run_test_file(register, options, output, coverage))
}

pub(crate) async fn run_test_file<F>(
    register: F,
    options: TestOptions,
    output: FileOutput,
    mut coverage: Option<Box<dyn CoverageSource>>,
) -> ExitCode
where
    F: FnOnce(&Suite),
{
    let collect_coverage = options.coverage;
    let root = Root::new(options);
    let child = match output {
        FileOutput::Parent(channel) => {
            root.set_parent_channel(channel);
            true
        }
        FileOutput::Local(formatter) => {
            root.set_formatter(formatter);
            false
        }
    };

    if collect_coverage && let Some(source) = coverage.as_mut() {
        if let Err(e) = source.start().await {
            warn!(error = %e, "Failed to start coverage");
        }
    }

    register(&root.suite());
    let ended = root.end().await;

    if collect_coverage && let Some(source) = coverage.as_mut() {
        match source.take_coverage().await {
            Ok(payload) => root.process_message("", &Message::Coverage { coverage: payload }),
            Err(e) => warn!(error = %e, "Failed to take coverage"),
        }
        if let Err(e) = source.stop().await {
            warn!(error = %e, "Failed to stop coverage");
        }
    }

    if let Err(e) = &ended {
        error!(error = %e, "Root cleanup failed");
    }
    // Test failures travel in the stream; the parent decides the outcome.
    if child {
        return if ended.is_ok() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    let summary = root.summary();
    let finalized = root
        .format_summary()
        .and_then(|()| check_summary(&summary, true));
    if let Err(e) = &finalized {
        error!(error = %e, "Run failed");
    }
    if ended.is_ok() && finalized.is_ok() && !summary.has_failures() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
