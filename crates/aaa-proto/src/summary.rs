//! Run-level counters.

use crate::{TestInfo, TestKind};
use serde::{Deserialize, Serialize};

/// Counters for one kind of node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub count: u64,
    pub ok: u64,
    pub error: u64,
}

/// A node that ended with an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedTest {
    pub file_id: String,
    pub id: u64,
    pub test: TestInfo,
    pub error: String,
}

/// Aggregated results of a run.
///
/// Only the root mutates a summary; reporters read it once the run ends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub test: SummaryResult,
    pub assert: SummaryResult,
    pub describe: SummaryResult,
    pub total: SummaryResult,
    pub failed: Vec<FailedTest>,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    fn result_mut(&mut self, kind: TestKind) -> &mut SummaryResult {
        match kind {
            TestKind::Test => &mut self.test,
            TestKind::Describe => &mut self.describe,
            TestKind::Assert => &mut self.assert,
        }
    }

    /// Counts a newly announced node.
    pub fn record_added(&mut self, kind: TestKind) {
        self.result_mut(kind).count += 1;
        self.total.count += 1;
    }

    /// Counts a node that ended successfully.
    pub fn record_ok(&mut self, kind: TestKind) {
        self.result_mut(kind).ok += 1;
        self.total.ok += 1;
    }

    /// Counts a failed node and appends it to `failed`.
    pub fn record_error(&mut self, file_id: &str, id: u64, test: TestInfo, error: String) {
        self.result_mut(test.kind).error += 1;
        self.total.error += 1;
        self.failed.push(FailedTest {
            file_id: file_id.to_string(),
            id,
            test,
            error,
        });
    }

    /// True if any node failed.
    pub fn has_failures(&self) -> bool {
        self.total.error > 0
    }
}
