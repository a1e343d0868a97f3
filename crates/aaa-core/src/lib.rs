//! # aaa-core
//!
//! Core of the arrange-act-assert test runner.
//!
//! This crate provides:
//! - The lifecycle engine that runs ARRANGE, ACT/SNAPSHOT, ASSERT and cleanup
//!   hooks for every node of a test tree
//! - The ordered reporter that displays concurrent results in registration order
//! - The snapshot store with confirm, review and regenerate modes
//! - The process bridge and bounded pool used to run test files in parallel
//! - Suite orchestration and the entry point for test file binaries

mod after;
mod bridge;
mod collector;
mod completion;
mod config;
mod coverage;
mod discovery;
mod engine;
mod entry;
mod error;
mod formatter;
mod parallelize;
mod reporter;
mod runner;
mod snapshot;
mod stages;
mod suite;
pub mod testing;

pub use after::After;
pub use bridge::{
    AAA_TEST_FILE, AAA_TEST_OPTIONS, BridgeError, ChildChannel, SpawnOptions, is_child_process,
    spawn_test_file, test_options_from_env,
};
pub use completion::Completion;
pub use config::{SuiteConfig, TestOptions, default_parallel};
pub use coverage::{CoverageSource, StaticCoverage};
pub use discovery::{DirectorySource, FileFilter, FileSource};
pub use engine::{NodeState, Root, Suite};
pub use entry::{run_test_file_main, run_test_file_main_with_coverage};
pub use error::{ConfigError, RunError, Stage, TestError};
pub use formatter::{Formatter, NullFormatter, check_summary, style};
pub use parallelize::{Settled, parallelize};
pub use reporter::OrderedReporter;
pub use snapshot::{SnapshotMode, SnapshotStore};
pub use stages::Stages;
pub use suite::{FileEntry, TestResult, TestSuite};
