//! Suite orchestration: discover files, run them, finalize the summary.

use crate::bridge::SpawnOptions;
use crate::config::SuiteConfig;
use crate::discovery::{DirectorySource, FileFilter, FileSource};
use crate::engine::{Root, Suite};
use crate::error::RunError;
use crate::formatter::{Formatter, check_summary};
use crate::parallelize::{Settled, parallelize};
use crate::reporter::OrderedReporter;
use aaa_proto::Summary;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{error, info};

/// Registration function of an in-process test file.
pub type FileEntry = Box<dyn Fn(&Suite)>;

/// Outcome of a suite run.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub files: Vec<PathBuf>,
    /// Failures outside of any test: crashed files, missing entries,
    /// root cleanups and summary finalization.
    pub run_errors: Vec<String>,
    pub ok: bool,
    pub summary: Summary,
    /// Coverage payloads keyed by the file that sent them.
    pub coverage: Vec<(String, Value)>,
}

pub struct TestSuite {
    config: SuiteConfig,
    filter: FileFilter,
    root: Root,
    source: Box<dyn FileSource>,
    entries: HashMap<PathBuf, FileEntry>,
}

impl TestSuite {
    /// Builds a suite that reports to stdout with the default reporter.
    pub fn new(config: SuiteConfig) -> Result<Self, RunError> {
        let filter = FileFilter::new(&config.include, &config.exclude)?;
        let root = Root::new(config.test.clone());
        root.set_formatter(Box::new(
            OrderedReporter::stdout(config.color).with_require_asserts(config.require_asserts),
        ));
        Ok(Self {
            config,
            filter,
            root,
            source: Box::new(DirectorySource),
            entries: HashMap::new(),
        })
    }

    #[must_use]
    pub fn with_formatter(self, formatter: Box<dyn Formatter>) -> Self {
        self.root.set_formatter(formatter);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: Box<dyn FileSource>) -> Self {
        self.source = source;
        self
    }

    /// Registers the in-process entry used for `path` when `parallel` is 0.
    pub fn register_file(&mut self, path: impl Into<PathBuf>, entry: impl Fn(&Suite) + 'static) {
        self.entries.insert(path.into(), Box::new(entry));
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    /// Runs every discovered file and returns the aggregated result.
    ///
    /// Only discovery failures abort the run; everything else is collected
    /// into `TestResult::run_errors`.
    pub async fn run(self) -> Result<TestResult, RunError> {
        let files = self
            .source
            .get_files(&self.config.folder, &self.filter)
            .await?;
        info!(
            files = files.len(),
            parallel = self.config.parallel,
            "Running test files"
        );

        let mut run_errors = Vec::new();
        if self.config.parallel == 0 {
            for file in &files {
                match self.entries.get(file) {
                    Some(entry) => self
                        .root
                        .run_test_file(&file.display().to_string(), entry.as_ref()),
                    None => run_errors.push(format!(
                        "No in-process entry registered for {}",
                        file.display()
                    )),
                }
            }
        } else {
            let options = SpawnOptions {
                prefix: self.config.prefix.clone(),
                test_options: self.config.test.clone(),
            };
            let spawns = files
                .iter()
                .map(|file| self.root.spawn_test_file(file, &options));
            for result in parallelize(self.config.parallel, spawns).await {
                if let Settled::Rejected(e) = result {
                    run_errors.push(e.to_string());
                }
            }
        }

        if let Err(e) = self.root.end().await {
            run_errors.push(e.to_string());
        }
        let summary = self.root.summary();
        if let Err(e) = self
            .root
            .format_summary()
            .and_then(|()| check_summary(&summary, self.config.require_asserts))
        {
            run_errors.push(e.to_string());
        }
        for run_error in &run_errors {
            error!(error = %run_error, "Run error");
        }

        Ok(TestResult {
            ok: run_errors.is_empty() && summary.total.error == 0,
            coverage: self.root.take_coverage(),
            files,
            run_errors,
            summary,
        })
    }
}
