//! Formatter seam between the root and whatever renders its messages.

use crate::error::RunError;
use aaa_proto::{Message, Summary};

/// Receives every message the root processes, already scoped by file.
pub trait Formatter {
    /// Renders one message. `file_id` is empty for nodes of the local root.
    fn format(&mut self, file_id: &str, msg: &Message);

    /// Renders the final summary once the run ended.
    fn format_summary(&mut self, _summary: &Summary) -> Result<(), RunError> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFormatter;

impl Formatter for NullFormatter {
    fn format(&mut self, _file_id: &str, _msg: &Message) {}
}

/// Fails a run that completed no test, or no assertion when `require_asserts`.
pub fn check_summary(summary: &Summary, require_asserts: bool) -> Result<(), RunError> {
    if summary.test.count == 0 {
        return Err(RunError::NoTests);
    }
    if require_asserts && summary.assert.count == 0 {
        return Err(RunError::NoAsserts);
    }
    Ok(())
}

/// ANSI escape sequences used by the default reporter.
pub mod style {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const GREEN: &str = "\x1b[92m";
    pub const RED: &str = "\x1b[91m";
    pub const YELLOW: &str = "\x1b[93m";
}
