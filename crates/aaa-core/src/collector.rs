//! The root's message sink.
//!
//! Every message of a run passes through here exactly once, in arrival order:
//! it is rolled into the summary, checked for well-formedness, and then handed
//! to the formatter, or forwarded to the parent process when running as a
//! spawned test file.

use crate::bridge::ChildChannel;
use crate::formatter::Formatter;
use crate::reporter::OrderedReporter;
use aaa_proto::{Message, ROOT_ID, StreamValidator, Summary, TestInfo, uid};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

pub(crate) struct MessageSink {
    summary: Summary,
    nodes: HashMap<String, TestInfo>,
    validator: StreamValidator,
    formatter: Option<Box<dyn Formatter>>,
    channel: Option<ChildChannel>,
    color: bool,
    coverage: Vec<(String, Value)>,
}

impl MessageSink {
    pub(crate) fn new() -> Self {
        Self {
            summary: Summary::new(),
            nodes: HashMap::new(),
            validator: StreamValidator::new(),
            formatter: None,
            channel: None,
            color: true,
            coverage: Vec::new(),
        }
    }

    pub(crate) fn set_formatter(&mut self, formatter: Box<dyn Formatter>) {
        self.formatter = Some(formatter);
    }

    pub(crate) fn set_channel(&mut self, channel: ChildChannel) {
        self.channel = Some(channel);
    }

    pub(crate) fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    pub(crate) fn summary(&self) -> &Summary {
        &self.summary
    }

    pub(crate) fn formatter_mut(&mut self) -> Option<&mut Box<dyn Formatter>> {
        self.formatter.as_mut()
    }

    pub(crate) fn take_coverage(&mut self) -> Vec<(String, Value)> {
        std::mem::take(&mut self.coverage)
    }

    pub(crate) fn process(&mut self, file_id: &str, msg: &Message) {
        if msg.id() == Some(ROOT_ID) {
            return;
        }
        if let Err(e) = self.validator.observe(file_id, msg) {
            warn!(file = file_id, error = %e, "Malformed message stream");
        }

        match msg {
            Message::Added { id, test } => {
                self.summary.record_added(test.kind);
                self.nodes.insert(uid(file_id, *id), test.clone());
            }
            Message::End { id, error } => match self.nodes.get(&uid(file_id, *id)) {
                Some(test) => match error {
                    Some(error) => {
                        self.summary
                            .record_error(file_id, *id, test.clone(), error.clone());
                    }
                    None => self.summary.record_ok(test.kind),
                },
                None => debug!(file = file_id, id, "End for a node that was never added"),
            },
            Message::Coverage { coverage } => {
                self.coverage.push((file_id.to_string(), coverage.clone()));
            }
            Message::FileStart | Message::FileEnd | Message::Start { .. } => {}
        }

        self.route(file_id, msg);
    }

    fn route(&mut self, file_id: &str, msg: &Message) {
        if let Some(formatter) = self.formatter.as_mut() {
            formatter.format(file_id, msg);
        } else if let Some(channel) = self.channel.as_mut() {
            if let Err(e) = channel.send(msg) {
                warn!(error = %e, "Failed to forward message to parent process");
            }
        } else {
            debug!("No formatter set, installing the default reporter");
            let formatter = self
                .formatter
                .insert(Box::new(OrderedReporter::stdout(self.color)));
            formatter.format(file_id, msg);
        }
    }
}
