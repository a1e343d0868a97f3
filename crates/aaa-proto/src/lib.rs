//! # aaa-proto
//!
//! Shared wire types for the arrange-act-assert test runner.
//!
//! This crate provides the foundational shapes exchanged between the lifecycle
//! engine, the reporters and spawned test processes:
//! - `Message`, the tagged union emitted while a test tree runs
//! - `Envelope`, the newline-delimited framing used on a child's stdout
//! - `Summary`, the run-level counters accumulated by the root
//! - `StreamValidator`, which checks that a stream is reconstructible as a tree

mod envelope;
mod error;
mod message;
mod summary;
mod validate;

pub use envelope::{ENVELOPE_TAG, Envelope};
pub use error::{ProtoError, Result};
pub use message::{Message, ROOT_ID, TestInfo, TestKind, uid};
pub use summary::{FailedTest, Summary, SummaryResult};
pub use validate::StreamValidator;
