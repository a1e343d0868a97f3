//! Protocol error types.

/// Errors raised while decoding or validating a message stream.
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    /// A line carried the envelope tag but its payload was not a valid message.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// An `Added` message referenced a parent that was never announced.
    #[error("node {uid} was added under unknown parent {parent}")]
    OrphanAdded { uid: String, parent: String },

    /// A `Start` or `End` referenced a node that was never announced.
    #[error("{kind} references unknown node {uid}")]
    UnknownNode { kind: &'static str, uid: String },

    /// The same node was announced twice.
    #[error("node {uid} was added twice")]
    DuplicateNode { uid: String },
}

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, ProtoError>;
