//! Error types for the lifecycle engine and the suite runner.

use std::fmt;

/// Stage of a node's pipeline that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Arrange,
    Act,
    Assert,
    Snapshot,
    After,
    Describe,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Arrange => "ARRANGE",
            Stage::Act => "ACT",
            Stage::Assert => "ASSERT",
            Stage::Snapshot => "SNAPSHOT",
            Stage::After => "AFTER",
            Stage::Describe => "DESCRIBE",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a node, as carried on its `End` message and its `Completion`.
///
/// Cloneable so every waiter on a node observes the same error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TestError {
    /// ARRANGE, ACT, ASSERT or SNAPSHOT returned an error or panicked.
    #[error("{stage}: {message}")]
    Stage { stage: Stage, message: String },

    /// A cleanup hook failed.
    #[error("AFTER: {message}")]
    After { message: String },

    /// A describe callback failed.
    #[error("DESCRIBE: {message}")]
    Describe { message: String },

    /// A node was added to a container that already ended.
    #[error("This test is closed. Can't add \"{description}\" to it")]
    ClosedSuite { description: String },

    /// The stage set was declared in a conflicting way.
    #[error("Invalid stages: {reason}")]
    InvalidStages { reason: String },

    #[error("Confirm snapshot: `{path}`")]
    SnapshotConfirmRequired { path: String },

    /// The stored snapshot differs from the candidate; the diff lists old (-) and new (+).
    #[error("Confirm snapshot: `{path}`\n{diff}")]
    SnapshotMismatch { path: String, diff: String },

    #[error("Review snapshot: `{path}`")]
    SnapshotReviewRequired { path: String },

    #[error(
        "No snapshot file found. First run without confirmation to validate the snapshots: `{path}`"
    )]
    SnapshotMissing { path: String },

    /// Snapshot storage could not be read, written or serialized.
    #[error("Snapshot `{path}` failed: {message}")]
    Snapshot { path: String, message: String },

    /// The task driving a node went away before it settled.
    #[error("Test task was dropped before it settled")]
    Dropped,
}

impl TestError {
    /// Builds the error for a failed stage body.
    pub fn stage(stage: Stage, message: impl Into<String>) -> Self {
        let message = message.into();
        match stage {
            Stage::After => TestError::After { message },
            Stage::Describe => TestError::Describe { message },
            _ => TestError::Stage { stage, message },
        }
    }
}

/// Whole-run failures, raised while finalizing the summary or preparing the run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("No test run")]
    NoTests,

    #[error("No asserts run")]
    NoAsserts,

    #[error("Failed to discover test files in {folder}: {source}")]
    Discovery {
        folder: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid file pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
