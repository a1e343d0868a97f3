//! Helpers for exercising the runner from tests.

use crate::error::RunError;
use crate::formatter::Formatter;
use aaa_proto::{Message, Summary};
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

/// In-memory writer whose clones share one buffer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Formatter that records every message and summary it receives.
///
/// Clones share the recording, so one clone can be handed to a root while
/// the test keeps the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingFormatter {
    messages: Rc<RefCell<Vec<(String, Message)>>>,
    summaries: Rc<RefCell<Vec<Summary>>>,
}

impl RecordingFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message with the file id it was scoped to.
    pub fn messages(&self) -> Vec<(String, Message)> {
        self.messages.borrow().clone()
    }

    /// Messages of one file, in arrival order.
    pub fn messages_for(&self, file_id: &str) -> Vec<Message> {
        self.messages
            .borrow()
            .iter()
            .filter(|(file, _)| file == file_id)
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    pub fn summaries(&self) -> Vec<Summary> {
        self.summaries.borrow().clone()
    }
}

impl Formatter for RecordingFormatter {
    fn format(&mut self, file_id: &str, msg: &Message) {
        self.messages
            .borrow_mut()
            .push((file_id.to_string(), msg.clone()));
    }

    fn format_summary(&mut self, summary: &Summary) -> Result<(), RunError> {
        self.summaries.borrow_mut().push(summary.clone());
        Ok(())
    }
}
