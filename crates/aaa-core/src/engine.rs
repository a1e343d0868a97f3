//! Lifecycle engine.
//!
//! A run context (`Root`) owns an arena of nodes addressed by id. Registering a
//! node emits `Added` and queues it on its parent; each parent drains its queue
//! one child at a time on the current `LocalSet`. Nodes registered while a
//! drain is active join that drain; nodes registered after it emptied start a
//! new one that may overlap with unrelated subtrees.
//!
//! A container ends once its callback returned and every child settled, then
//! runs its own cleanup hooks. A failing child does not fail its container.

use crate::after::{After, merge_cleanup};
use crate::bridge::{BridgeError, ChildChannel, SpawnOptions, spawn_test_file};
use crate::collector::MessageSink;
use crate::completion::{Completion, Signal};
use crate::config::TestOptions;
use crate::error::{RunError, Stage, TestError};
use crate::formatter::Formatter;
use crate::runner::run_stage;
use crate::snapshot::SnapshotStore;
use crate::stages::{Pipeline, Stages};
use aaa_proto::{Message, ROOT_ID, Summary, TestKind};
use futures::future::{LocalBoxFuture, join_all};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info};

type DescribeFn = Box<dyn FnOnce(Suite, After) -> LocalBoxFuture<'static, anyhow::Result<()>>>;

/// Where a node is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Created,
    Running,
    EndedOk,
    EndedError,
}

enum NodeBody {
    Leaf(Pipeline),
    Describe(DescribeFn),
}

struct Node {
    parent: Option<u64>,
    description: String,
    children: Vec<u64>,
    pending: VecDeque<u64>,
    draining: bool,
    finished: bool,
    body: Option<NodeBody>,
    after: After,
    signal: Option<Signal>,
    completion: Completion,
    state: NodeState,
}

impl Node {
    fn new(parent: Option<u64>, description: String, body: Option<NodeBody>) -> (Self, Completion) {
        let (signal, completion) = Completion::pending();
        let node = Self {
            parent,
            description,
            children: Vec::new(),
            pending: VecDeque::new(),
            draining: false,
            finished: false,
            body,
            after: After::new(),
            signal: Some(signal),
            completion: completion.clone(),
            state: NodeState::Created,
        };
        (node, completion)
    }
}

/// State shared by every handle of one run.
struct RunState {
    nodes: RefCell<HashMap<u64, Node>>,
    next_id: Cell<u64>,
    sink: RefCell<MessageSink>,
    snapshots: SnapshotStore,
    options: TestOptions,
}

impl RunState {
    fn allocate_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn emit(&self, msg: &Message) {
        self.sink.borrow_mut().process("", msg);
    }

    fn start_node(&self, id: u64) {
        if let Some(node) = self.nodes.borrow_mut().get_mut(&id) {
            node.state = NodeState::Running;
        }
        self.emit(&Message::Start { id });
    }

    /// Descriptions from the top-level node down to `id`.
    fn chain(&self, id: u64) -> Vec<String> {
        let nodes = self.nodes.borrow();
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(index) = current {
            if index == ROOT_ID {
                break;
            }
            let Some(node) = nodes.get(&index) else {
                break;
            };
            chain.push(node.description.clone());
            current = node.parent;
        }
        chain.reverse();
        chain
    }

    /// Marks `id` closed and waits for every child to settle.
    async fn close(&self, id: u64) {
        let completions: Vec<Completion> = {
            let mut nodes = self.nodes.borrow_mut();
            let children = match nodes.get_mut(&id) {
                Some(node) => {
                    node.finished = true;
                    node.children.clone()
                }
                None => Vec::new(),
            };
            children
                .iter()
                .filter_map(|child| nodes.get(child).map(|n| n.completion.clone()))
                .collect()
        };
        join_all(completions).await;
    }

    fn finish(&self, id: u64, result: &Result<(), TestError>) {
        self.emit(&Message::end(id, result.as_ref().err().map(ToString::to_string)));
        let signal = self.nodes.borrow_mut().get_mut(&id).and_then(|node| {
            node.state = if result.is_ok() {
                NodeState::EndedOk
            } else {
                NodeState::EndedError
            };
            node.signal.take()
        });
        if let Some(signal) = signal {
            let _ = signal.send(result.clone());
        }
    }
}

/// Queues `child` on `parent` and starts a drain if none is active.
fn schedule(state: &Rc<RunState>, parent: u64, child: u64) {
    let first = {
        let mut nodes = state.nodes.borrow_mut();
        let Some(node) = nodes.get_mut(&parent) else {
            return;
        };
        node.pending.push_back(child);
        if node.draining {
            return;
        }
        node.draining = true;
        node.pending.pop_front()
    };
    if let Some(first) = first {
        state.start_node(first);
        tokio::task::spawn_local(drain(state.clone(), parent, first));
    }
}

async fn drain(state: Rc<RunState>, parent: u64, first: u64) {
    let mut current = Some(first);
    while let Some(id) = current {
        // The child's own End carries its failure; the parent keeps draining.
        let _ = run_node(state.clone(), id).await;
        current = {
            let mut nodes = state.nodes.borrow_mut();
            nodes.get_mut(&parent).and_then(|node| {
                let next = node.pending.pop_front();
                if next.is_none() {
                    node.draining = false;
                }
                next
            })
        };
        if let Some(next) = current {
            state.start_node(next);
        }
    }
}

async fn run_node(state: Rc<RunState>, id: u64) -> Result<(), TestError> {
    let (body, after) = {
        let mut nodes = state.nodes.borrow_mut();
        let Some(node) = nodes.get_mut(&id) else {
            return Err(TestError::Dropped);
        };
        (node.body.take(), node.after.clone())
    };

    let outcome = match body {
        Some(NodeBody::Leaf(pipeline)) => {
            let ctx = LeafContext {
                chain: state.chain(id),
                state: state.clone(),
                id,
                after: after.clone(),
            };
            pipeline(ctx).await
        }
        Some(NodeBody::Describe(callback)) => {
            let suite = Suite {
                state: state.clone(),
                node: id,
            };
            let hooks = after.clone();
            run_stage(Stage::Describe, async move { callback(suite, hooks).await }).await
        }
        None => Ok(()),
    };

    state.close(id).await;
    let result = merge_cleanup(outcome, after.run_all().await);
    debug!(id, ok = result.is_ok(), "Node ended");
    state.finish(id, &result);
    result
}

/// What a leaf pipeline needs from the engine while it runs.
pub(crate) struct LeafContext {
    state: Rc<RunState>,
    id: u64,
    after: After,
    chain: Vec<String>,
}

impl LeafContext {
    pub(crate) fn after(&self) -> After {
        self.after.clone()
    }

    /// Reports `body` as an assertion sub-node of the leaf.
    pub(crate) async fn assert_node<F>(&self, description: &str, body: F) -> Result<(), TestError>
    where
        F: Future<Output = Result<(), TestError>>,
    {
        let id = self.state.allocate_id();
        self.state
            .emit(&Message::added(id, self.id, description, TestKind::Assert));
        self.state.emit(&Message::Start { id });
        let result = body.await;
        self.state
            .emit(&Message::end(id, result.as_ref().err().map(ToString::to_string)));
        result
    }

    /// Checks a value against the snapshot at the leaf's chain, extended by `name`.
    pub(crate) fn check_snapshot(&self, name: Option<&str>, value: &Value) -> Result<(), TestError> {
        let mut chain = self.chain.clone();
        if let Some(name) = name {
            chain.push(name.to_string());
        }
        self.state.snapshots.check(&chain, value)
    }
}

/// Builder for the children of one node.
#[derive(Clone)]
pub struct Suite {
    state: Rc<RunState>,
    node: u64,
}

impl Suite {
    /// Registers a leaf test and schedules it.
    pub fn test<A: 'static, B: 'static>(
        &self,
        description: impl Into<String>,
        stages: Stages<A, B>,
    ) -> Completion {
        self.add(
            description.into(),
            TestKind::Test,
            NodeBody::Leaf(stages.into_pipeline()),
        )
    }

    /// Registers a container and schedules its callback.
    pub fn describe<F, Fut>(&self, description: impl Into<String>, callback: F) -> Completion
    where
        F: FnOnce(Suite, After) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        let callback: DescribeFn = Box::new(
            move |suite: Suite, after: After| -> LocalBoxFuture<'static, anyhow::Result<()>> {
                Box::pin(callback(suite, after))
            },
        );
        self.add(description.into(), TestKind::Describe, NodeBody::Describe(callback))
    }

    /// Cleanup registrar of the node this suite builds children for.
    pub fn after(&self) -> After {
        self.state
            .nodes
            .borrow()
            .get(&self.node)
            .map(|node| node.after.clone())
            .unwrap_or_default()
    }

    /// Id of the node this suite builds children for.
    pub fn id(&self) -> u64 {
        self.node
    }

    fn add(&self, description: String, kind: TestKind, body: NodeBody) -> Completion {
        let state = &self.state;
        let closed = state
            .nodes
            .borrow()
            .get(&self.node)
            .is_none_or(|node| node.finished);
        if closed {
            debug!(parent = self.node, description = %description, "Rejected registration on a closed node");
            return Completion::settled(Err(TestError::ClosedSuite { description }));
        }

        let id = state.allocate_id();
        let (node, completion) = Node::new(Some(self.node), description.clone(), Some(body));
        {
            let mut nodes = state.nodes.borrow_mut();
            nodes.insert(id, node);
            if let Some(parent) = nodes.get_mut(&self.node) {
                parent.children.push(id);
            }
        }
        debug!(id, parent = self.node, kind = kind.as_str(), "Registered node");
        state.emit(&Message::added(id, self.node, description, kind));
        schedule(state, self.node, id);
        completion
    }
}

/// Per-run context: node arena, id counter, message sink and snapshot store.
///
/// Must be used from within a `tokio::task::LocalSet`.
#[derive(Clone)]
pub struct Root {
    state: Rc<RunState>,
}

impl Root {
    pub fn new(options: TestOptions) -> Self {
        let (mut node, _) = Node::new(None, String::new(), None);
        node.state = NodeState::Running;
        let state = RunState {
            nodes: RefCell::new(HashMap::from([(ROOT_ID, node)])),
            next_id: Cell::new(ROOT_ID + 1),
            sink: RefCell::new(MessageSink::new()),
            snapshots: SnapshotStore::from_options(&options),
            options,
        };
        Self {
            state: Rc::new(state),
        }
    }

    pub fn options(&self) -> &TestOptions {
        &self.state.options
    }

    /// Replaces the destination of every message.
    pub fn set_formatter(&self, formatter: Box<dyn Formatter>) {
        self.state.sink.borrow_mut().set_formatter(formatter);
    }

    /// Forwards messages to a parent process when no formatter is set.
    pub fn set_parent_channel(&self, channel: ChildChannel) {
        self.state.sink.borrow_mut().set_channel(channel);
    }

    /// Colors of the default reporter, if it ends up installed.
    pub fn set_color(&self, color: bool) {
        self.state.sink.borrow_mut().set_color(color);
    }

    /// Builder for top-level nodes.
    pub fn suite(&self) -> Suite {
        Suite {
            state: self.state.clone(),
            node: ROOT_ID,
        }
    }

    pub fn test<A: 'static, B: 'static>(
        &self,
        description: impl Into<String>,
        stages: Stages<A, B>,
    ) -> Completion {
        self.suite().test(description, stages)
    }

    pub fn describe<F, Fut>(&self, description: impl Into<String>, callback: F) -> Completion
    where
        F: FnOnce(Suite, After) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        self.suite().describe(description, callback)
    }

    /// Root-level cleanups, run by `end`.
    pub fn after(&self) -> After {
        self.suite().after()
    }

    /// Feeds a message from another stream, scoped under `file_id`.
    pub fn process_message(&self, file_id: &str, msg: &Message) {
        self.state.sink.borrow_mut().process(file_id, msg);
    }

    /// Registers the nodes of an in-process test file on this root.
    pub fn run_test_file(&self, file_id: &str, entry: &dyn Fn(&Suite)) {
        debug!(file = file_id, "Running test file in process");
        entry(&self.suite());
    }

    /// Runs a test file in a child process and replays its messages.
    ///
    /// The file's stream is wrapped in `FileStart`/`FileEnd`, which is sent even
    /// when the process fails.
    pub async fn spawn_test_file(
        &self,
        path: &Path,
        options: &SpawnOptions,
    ) -> Result<(), BridgeError> {
        let file_id = path.display().to_string();
        self.process_message(&file_id, &Message::FileStart);
        let result = spawn_test_file(path, options, |msg| self.process_message(&file_id, &msg)).await;
        self.process_message(&file_id, &Message::FileEnd);
        result
    }

    /// Closes the root, waits for every node and runs the root-level cleanups.
    pub async fn end(&self) -> Result<(), TestError> {
        self.state.close(ROOT_ID).await;
        let after = self.after();
        let result = after.run_all().await;
        let summary = self.summary();
        info!(
            total = summary.total.count,
            ok = summary.total.ok,
            failed = summary.total.error,
            "Run ended"
        );
        result
    }

    pub fn summary(&self) -> Summary {
        self.state.sink.borrow().summary().clone()
    }

    /// Hands the summary to the formatter, if one is installed.
    pub fn format_summary(&self) -> Result<(), RunError> {
        let mut sink = self.state.sink.borrow_mut();
        let summary = sink.summary().clone();
        match sink.formatter_mut() {
            Some(formatter) => formatter.format_summary(&summary),
            None => Ok(()),
        }
    }

    /// Coverage payloads received so far, with the file they came from.
    pub fn take_coverage(&self) -> Vec<(String, Value)> {
        self.state.sink.borrow_mut().take_coverage()
    }

    pub fn node_state(&self, id: u64) -> Option<NodeState> {
        self.state.nodes.borrow().get(&id).map(|node| node.state)
    }
}
