//! Envelope framing for messages crossing a process boundary.
//!
//! A spawned test process writes one JSON object per line to its stdout:
//! `{"type":"testRunner","data":<Message>}`. Anything else on the same channel
//! (user prints, panics, tool noise) lacks the tag and is ignored.

use crate::{Message, Result};
use serde::{Deserialize, Serialize};

/// Discriminator carried by every envelope.
pub const ENVELOPE_TAG: &str = "testRunner";

/// A message wrapped for transmission to the parent process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub tag: String,
    pub data: Message,
}

impl Envelope {
    /// Wraps a message with the runner tag.
    pub fn new(data: Message) -> Self {
        Self {
            tag: ENVELOPE_TAG.to_string(),
            data,
        }
    }

    /// Serializes the envelope as a single line (without the trailing newline).
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a line from a child channel.
    ///
    /// Returns `Ok(None)` for lines that are not runner envelopes and an error
    /// for lines that carry the tag but an invalid payload.
    pub fn decode_line(line: &str) -> Result<Option<Message>> {
        let line = line.trim();
        if !line.starts_with('{') {
            return Ok(None);
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
            return Ok(None);
        };
        let is_envelope = value.get("type").and_then(|tag| tag.as_str()) == Some(ENVELOPE_TAG)
            && value.get("data").is_some();
        if !is_envelope {
            return Ok(None);
        }
        let envelope: Envelope = serde_json::from_value(value)?;
        Ok(Some(envelope.data))
    }
}
