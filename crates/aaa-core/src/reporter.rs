//! Default console reporter.
//!
//! Output is serialized per container: the children of a node are displayed in
//! registration order even when they run concurrently. A child that is not at
//! the head of its parent's queue stays hidden, and whatever it logs is
//! buffered at its topmost hidden ancestor. When the head child ends, the next
//! queued sibling is shown and its buffered lines are flushed in order.

use crate::error::RunError;
use crate::formatter::{Formatter, check_summary, style};
use aaa_proto::{Message, Summary, SummaryResult, TestInfo, TestKind, uid};
use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use tracing::{debug, warn};

const MAIN_ROOT: usize = 0;

#[derive(Debug, Clone)]
struct LogLine {
    style: &'static str,
    icon: &'static str,
    text: String,
}

impl LogLine {
    fn new(style: &'static str, icon: &'static str, text: impl Into<String>) -> Self {
        Self {
            style,
            icon,
            text: text.into(),
        }
    }
}

#[derive(Debug)]
struct Node {
    info: TestInfo,
    level: i32,
    parent: Option<usize>,
    children: Vec<usize>,
    pending_shown: Vec<usize>,
    shown: bool,
    /// Lines waiting for this node to be shown, with the node that logged them.
    pending_logs: Vec<(usize, LogLine)>,
    /// Children that started or ended before reaching the head of the queue.
    pending: HashSet<usize>,
    next: Option<usize>,
    start_logged: bool,
    children_ok: bool,
    ended: bool,
    error: Option<String>,
    is_root: bool,
}

impl Node {
    fn new(info: TestInfo, level: i32, parent: Option<usize>, is_root: bool) -> Self {
        Self {
            info,
            level,
            parent,
            children: Vec::new(),
            pending_shown: Vec::new(),
            shown: false,
            pending_logs: Vec::new(),
            pending: HashSet::new(),
            next: None,
            start_logged: false,
            children_ok: true,
            ended: false,
            error: None,
            is_root,
        }
    }

    fn root(parent: Option<usize>) -> Self {
        Self::new(TestInfo::new(0, "", TestKind::Describe), -1, parent, true)
    }
}

/// Tree reporter that writes to any `Write`.
pub struct OrderedReporter<W: Write> {
    out: W,
    color: bool,
    require_asserts: bool,
    nodes: Vec<Node>,
    uids: HashMap<String, usize>,
    files: HashMap<String, usize>,
}

impl OrderedReporter<io::Stdout> {
    /// Reporter on the process stdout.
    pub fn stdout(color: bool) -> Self {
        Self::new(io::stdout(), color)
    }
}

impl<W: Write> OrderedReporter<W> {
    pub fn new(out: W, color: bool) -> Self {
        let mut main = Node::root(None);
        main.shown = true;
        Self {
            out,
            color,
            require_asserts: true,
            nodes: vec![main],
            uids: HashMap::new(),
            files: HashMap::new(),
        }
    }

    /// Whether `format_summary` fails a run without assertions.
    #[must_use]
    pub fn with_require_asserts(mut self, require_asserts: bool) -> Self {
        self.require_asserts = require_asserts;
        self
    }

    fn paint(&self, code: &'static str) -> &'static str {
        if self.color { code } else { "" }
    }

    fn add_node(&mut self, node: Node) -> usize {
        let index = self.nodes.len();
        self.nodes.push(node);
        index
    }

    fn add_child(&mut self, parent: usize, child: usize) {
        let node = &mut self.nodes[parent];
        node.children.push(child);
        if node.next.is_none() {
            node.next = Some(child);
        }
    }

    fn start(&mut self, node: usize) {
        if let Some(parent) = self.nodes[node].parent {
            self.log_start(parent);
            self.start_child(parent, node);
        }
    }

    fn end(&mut self, node: usize, error: Option<String>) {
        let entry = &mut self.nodes[node];
        entry.ended = true;
        entry.error = error;
        if let Some(parent) = entry.parent {
            self.end_child(parent, node);
        }
    }

    fn start_child(&mut self, parent: usize, child: usize) {
        if self.nodes[parent].next == Some(child) {
            if self.nodes[parent].shown {
                self.show(child);
            } else {
                self.nodes[parent].pending_shown.push(child);
            }
        } else {
            self.nodes[parent].pending.insert(child);
        }
    }

    fn end_child(&mut self, parent: usize, child: usize) {
        if self.nodes[child].error.is_some() {
            self.set_child_error(parent);
        }
        if self.nodes[parent].next != Some(child) {
            self.nodes[parent].pending.insert(child);
            return;
        }
        let next = {
            let siblings = &self.nodes[parent].children;
            siblings
                .iter()
                .position(|&c| c == child)
                .and_then(|i| siblings.get(i + 1).copied())
        };
        self.nodes[parent].next = next;
        self.log_end(child);
        if let Some(next) = next
            && self.nodes[parent].pending.remove(&next)
        {
            self.start_child(parent, next);
            if self.nodes[next].ended {
                self.end_child(parent, next);
            }
        }
    }

    fn set_child_error(&mut self, node: usize) {
        let mut current = Some(node);
        while let Some(index) = current {
            if !self.nodes[index].children_ok {
                break;
            }
            self.nodes[index].children_ok = false;
            current = self.nodes[index].parent;
        }
    }

    fn log_start(&mut self, node: usize) {
        if !self.nodes[node].start_logged {
            self.nodes[node].start_logged = true;
            let line = LogLine::new(style::BOLD, "►", self.nodes[node].info.description.clone());
            self.log(node, line);
        }
    }

    fn log_end(&mut self, node: usize) {
        let entry = &self.nodes[node];
        let description = entry.info.description.clone();
        let line = match &entry.error {
            Some(_) if entry.start_logged && !entry.children_ok => {
                LogLine::new(style::YELLOW, "►", description)
            }
            Some(error) => LogLine::new(style::RED, "X", format!("{description}:\n{error}")),
            None if entry.start_logged => LogLine::new("", "√", description),
            None => LogLine::new(style::GREEN, "√", description),
        };
        self.log(node, line);
    }

    fn show(&mut self, node: usize) {
        self.nodes[node].shown = true;
        for child in std::mem::take(&mut self.nodes[node].pending_shown) {
            self.show(child);
        }
        for (origin, line) in std::mem::take(&mut self.nodes[node].pending_logs) {
            self.log(origin, line);
        }
    }

    fn log(&mut self, node: usize, line: LogLine) {
        if self.nodes[node].shown {
            if !self.nodes[node].is_root {
                self.write_line(node, &line);
            }
        } else {
            self.buffer(node, node, line);
        }
    }

    fn buffer(&mut self, at: usize, origin: usize, line: LogLine) {
        match self.nodes[at].parent {
            Some(parent) if !self.nodes[parent].shown => self.buffer(parent, origin, line),
            _ => self.nodes[at].pending_logs.push((origin, line)),
        }
    }

    fn write_line(&mut self, node: usize, line: &LogLine) {
        let level = usize::try_from(self.nodes[node].level).unwrap_or(0);
        let pad = " ".repeat(level * 2);
        let icon = if line.icon.is_empty() {
            String::new()
        } else {
            format!("{} ", line.icon)
        };
        let icon_pad = " ".repeat(icon.chars().count());
        let (code, reset) = (self.paint(line.style), self.paint(style::RESET));

        let mut rendered = String::new();
        for (i, text) in line.text.split('\n').enumerate() {
            if i == 0 {
                rendered.push_str(&format!("{pad}{code}{icon}{text}{reset}"));
            } else {
                rendered.push_str(&format!("\n{pad}{icon_pad}{text}"));
            }
        }
        self.emit(&rendered);
    }

    fn emit(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{text}") {
            debug!(error = %e, "Reporter output failed");
        }
    }

    fn summary_result(&self, title: &str, result: &SummaryResult) -> String {
        let (red, reset) = (self.paint(style::RED), self.paint(style::RESET));
        let ok_color = if result.error > 0 {
            self.paint(style::YELLOW)
        } else {
            self.paint(style::GREEN)
        };
        let count_color = if result.count == 0 { red } else { ok_color };
        let mut text = format!("- {title}: {count_color}{}{reset}", result.count);
        if result.error > 0 {
            let ok_count_color = if result.ok == 0 { red } else { ok_color };
            text.push_str(&format!("\n  · OK: {ok_count_color}{}{reset}", result.ok));
            text.push_str(&format!("\n  · ERROR: {red}{}{reset}", result.error));
        }
        text
    }

    fn failure_chain(&self, node: usize) -> String {
        let (red, bold, reset) = (
            self.paint(style::RED),
            self.paint(style::BOLD),
            self.paint(style::RESET),
        );
        let mut lines = Vec::new();
        let mut current = Some(node);
        while let Some(index) = current {
            let entry = &self.nodes[index];
            if entry.is_root {
                break;
            }
            let pad = " ".repeat(usize::try_from(entry.level).unwrap_or(0) * 2);
            let description = &entry.info.description;
            if index == node {
                lines.push(format!("{pad}{red}X {description}:{reset}"));
            } else {
                lines.push(format!("{pad}{bold}► {description}{reset}"));
            }
            current = entry.parent;
        }
        lines.reverse();
        lines.join("\n")
    }
}

impl<W: Write> Formatter for OrderedReporter<W> {
    fn format(&mut self, file_id: &str, msg: &Message) {
        match msg {
            Message::FileStart => {
                let root = self.add_node(Node::root(Some(MAIN_ROOT)));
                self.add_child(MAIN_ROOT, root);
                self.start(root);
                self.files.insert(file_id.to_string(), root);
            }
            Message::FileEnd => match self.files.get(file_id) {
                Some(&root) => self.end(root, None),
                None => warn!(file = file_id, "Received file end without file start"),
            },
            Message::Added { id, test } => {
                if test.description.is_empty() {
                    return;
                }
                let parent = self
                    .uids
                    .get(&uid(file_id, test.parent_id))
                    .or_else(|| self.files.get(file_id))
                    .copied()
                    .unwrap_or(MAIN_ROOT);
                let level = self.nodes[parent].level + 1;
                let node = self.add_node(Node::new(test.clone(), level, Some(parent), false));
                self.add_child(parent, node);
                self.uids.insert(uid(file_id, *id), node);
            }
            Message::Start { id } => {
                if let Some(&node) = self.uids.get(&uid(file_id, *id)) {
                    self.start(node);
                }
            }
            Message::End { id, error } => {
                if let Some(&node) = self.uids.get(&uid(file_id, *id)) {
                    self.end(node, error.clone());
                }
            }
            Message::Coverage { .. } => {}
        }
    }

    fn format_summary(&mut self, summary: &Summary) -> Result<(), RunError> {
        let (bold, yellow, reset) = (
            self.paint(style::BOLD),
            self.paint(style::YELLOW),
            self.paint(style::RESET),
        );
        self.emit(&format!("\n{bold}Summary:{reset}"));
        let mut sections = vec![
            self.summary_result("Asserts", &summary.assert),
            self.summary_result("Tests", &summary.test),
        ];
        if summary.describe.count > 0 {
            sections.push(self.summary_result("Describes", &summary.describe));
        }
        sections.push(self.summary_result("Total", &summary.total));
        for section in sections {
            self.emit(&section);
        }

        for failed in &summary.failed {
            let Some(&node) = self.uids.get(&uid(&failed.file_id, failed.id)) else {
                continue;
            };
            if !self.nodes[node].children_ok {
                continue;
            }
            let chain = self.failure_chain(node);
            self.emit(&format!("{yellow}[X]----- - - - -  -  -   -{reset}"));
            self.emit(&chain);
            self.emit(&failed.error);
        }
        check_summary(summary, self.require_asserts)
    }
}
