//! Configuration types for the runner.
//!
//! `TestOptions` travel with every test file (serialized into the child's
//! environment); `SuiteConfig` drives discovery and scheduling in the parent
//! and is loaded from `aaa.yml`.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Per-file options shared by the parent and every spawned test process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOptions {
    /// Folder holding snapshot files.
    #[serde(default = "default_snapshots_folder")]
    pub snapshots_folder: PathBuf,

    /// Confirm unvalidated snapshots that match.
    #[serde(default)]
    pub confirm_snapshots: bool,

    /// Fail every snapshot assertion so a human can review it.
    #[serde(default)]
    pub review_snapshots: bool,

    /// Overwrite every snapshot and require reconfirmation.
    #[serde(default)]
    pub regenerate_snapshots: bool,

    /// Collect coverage in spawned processes.
    #[serde(default)]
    pub coverage: bool,
}

fn default_snapshots_folder() -> PathBuf {
    PathBuf::from(".snapshots")
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            snapshots_folder: default_snapshots_folder(),
            confirm_snapshots: false,
            review_snapshots: false,
            regenerate_snapshots: false,
            coverage: false,
        }
    }
}

/// Top-level configuration for a suite run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteConfig {
    /// Number of test files spawned concurrently. `0` runs registered
    /// in-process entries instead of spawning.
    #[serde(default = "default_parallel")]
    pub parallel: usize,

    /// Folder scanned for test files.
    #[serde(default = "default_folder")]
    pub folder: PathBuf,

    /// A file runs if its path matches any of these patterns...
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    /// ...and none of these.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Command prefix used to launch each file (e.g. `["sh"]`).
    #[serde(default)]
    pub prefix: Vec<String>,

    /// Fail the run when no assertion node completed.
    #[serde(default = "default_true")]
    pub require_asserts: bool,

    /// Use ANSI colors in the default reporter.
    #[serde(default = "default_true")]
    pub color: bool,

    #[serde(flatten)]
    pub test: TestOptions,
}

fn default_true() -> bool {
    true
}

/// Host CPU count, falling back to one worker.
pub fn default_parallel() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

fn default_folder() -> PathBuf {
    PathBuf::from(".")
}

fn default_include() -> Vec<String> {
    vec![r"(?i)(^|[\\/]|[._-])test([._-][^\\/]*)?$".to_string()]
}

fn default_exclude() -> Vec<String> {
    vec![
        r"(?i)[\\/]\.git[\\/]".to_string(),
        r"(?i)\.(d|rlib|rmeta|o|pdb)$".to_string(),
    ]
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            parallel: default_parallel(),
            folder: default_folder(),
            include: default_include(),
            exclude: default_exclude(),
            prefix: Vec::new(),
            require_asserts: true,
            color: true,
            test: TestOptions::default(),
        }
    }
}

impl SuiteConfig {
    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        debug!(path = %path_ref.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path_ref)?;
        let config: Self = serde_yaml::from_str(&content)?;
        debug!(
            parallel = config.parallel,
            folder = %config.folder.display(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads the file if it exists, otherwise returns defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        if path_ref.exists() {
            Self::from_file(path_ref)
        } else {
            debug!(path = %path_ref.display(), "No configuration file, using defaults");
            Ok(Self::default())
        }
    }
}
