//! Messages emitted by the lifecycle engine.
//!
//! Every node in a test tree announces itself with `Added`, then reports
//! `Start` and `End`. File-scope wrappers (`FileStart`/`FileEnd`) carry no id
//! and are produced by the parent process around each spawned file.

use serde::{Deserialize, Serialize};

/// Id of the implicit top of every tree. Never emitted as `Added`/`Start`/`End`.
pub const ROOT_ID: u64 = 0;

/// Builds the composite identity of a node across files.
///
/// `file_id` is empty for the local root and the file path for spawned files.
pub fn uid(file_id: &str, id: u64) -> String {
    format!("{file_id}_{id}")
}

/// What a node in the tree represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    /// A leaf test with stage functions.
    Test,
    /// A container whose callback registers more nodes.
    Describe,
    /// An assertion sub-node synthesized while a leaf runs.
    Assert,
}

impl TestKind {
    /// Returns the lowercase wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            TestKind::Test => "test",
            TestKind::Describe => "describe",
            TestKind::Assert => "assert",
        }
    }
}

/// Payload of an `Added` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestInfo {
    pub parent_id: u64,
    pub description: String,
    pub kind: TestKind,
}

impl TestInfo {
    pub fn new(parent_id: u64, description: impl Into<String>, kind: TestKind) -> Self {
        Self {
            parent_id,
            description: description.into(),
            kind,
        }
    }
}

/// A protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    FileStart,
    FileEnd,
    Added {
        id: u64,
        test: TestInfo,
    },
    Start {
        id: u64,
    },
    End {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Opaque coverage payload, forwarded verbatim.
    Coverage {
        coverage: serde_json::Value,
    },
}

impl Message {
    /// Creates an `Added` message.
    pub fn added(id: u64, parent_id: u64, description: impl Into<String>, kind: TestKind) -> Self {
        Message::Added {
            id,
            test: TestInfo::new(parent_id, description, kind),
        }
    }

    /// Creates an `End` message, carrying the error text if the node failed.
    pub fn end(id: u64, error: Option<String>) -> Self {
        Message::End { id, error }
    }

    /// Returns the node id this message refers to, if any.
    pub fn id(&self) -> Option<u64> {
        match self {
            Message::Added { id, .. } | Message::Start { id } | Message::End { id, .. } => {
                Some(*id)
            }
            Message::FileStart | Message::FileEnd | Message::Coverage { .. } => None,
        }
    }
}
