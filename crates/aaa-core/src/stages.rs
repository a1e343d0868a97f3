//! Stage declarations for a leaf test.
//!
//! `Stages<A, B>` carries the arrange value type `A` and the act value type
//! `B`. Builder methods only exist in the states where they make sense, and
//! the few orderings the types cannot rule out (re-declaring a stage whose
//! value type is `()`) are recorded and reported when the test runs.

use crate::after::After;
use crate::engine::LeafContext;
use crate::error::{Stage, TestError};
use crate::runner::run_stage;
use futures::future::LocalBoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::rc::Rc;

type StageFuture<T> = LocalBoxFuture<'static, anyhow::Result<T>>;
type ArrangeFn<A> = Box<dyn FnOnce(After) -> StageFuture<A>>;
type ActFn<A, B> = Box<dyn FnOnce(Rc<A>, After) -> StageFuture<B>>;
type AssertFn<A, B> = Box<dyn FnOnce(Rc<B>, Rc<A>, After) -> StageFuture<()>>;
type SnapshotFn<A, B> = Box<dyn FnOnce(Rc<B>, Rc<A>, After) -> StageFuture<Value>>;
type ToJson<B> = fn(&B) -> serde_json::Result<Value>;

/// Type-erased leaf body, run by the engine with the leaf's context.
pub(crate) type Pipeline = Box<dyn FnOnce(LeafContext) -> LocalBoxFuture<'static, Result<(), TestError>>>;

enum Primary<A, B> {
    /// No ACT declared; yields `()`.
    Implicit(ActFn<A, B>),
    Act(ActFn<A, B>),
    Snapshot(ActFn<A, B>, ToJson<B>),
    /// Dropped because the declaration was rejected.
    Missing,
}

impl<A, B> Primary<A, B> {
    fn declared(&self) -> Option<&'static str> {
        match self {
            Primary::Act(_) => Some("ACT"),
            Primary::Snapshot(..) => Some("SNAPSHOT"),
            Primary::Implicit(_) | Primary::Missing => None,
        }
    }
}

/// The stages of a leaf test.
///
/// ```ignore
/// suite.test(
///     "adds numbers",
///     Stages::new()
///         .arrange(|_| async { Ok((2, 3)) })
///         .act(|pair, _| async move { Ok(pair.0 + pair.1) })
///         .assert(|sum, _, _| async move {
///             assert_eq!(*sum, 5);
///             Ok(())
///         }),
/// );
/// ```
pub struct Stages<A = (), B = ()> {
    arrange: ArrangeFn<A>,
    arranged: bool,
    primary: Primary<A, B>,
    assert: Option<AssertFn<A, B>>,
    asserts: Vec<(String, AssertFn<A, B>)>,
    snapshots: Vec<(String, SnapshotFn<A, B>)>,
    invalid: Option<String>,
}

fn unit_arrange() -> ArrangeFn<()> {
    Box::new(|_: After| -> StageFuture<()> { Box::pin(async { Ok(()) }) })
}

fn unit_act<A: 'static>() -> ActFn<A, ()> {
    Box::new(|_: Rc<A>, _: After| -> StageFuture<()> { Box::pin(async { Ok(()) }) })
}

fn to_json<B: Serialize>(value: &B) -> serde_json::Result<Value> {
    serde_json::to_value(value)
}

impl Stages {
    /// An empty leaf: no arrange, no act, no assertions.
    pub fn new() -> Self {
        Self {
            arrange: unit_arrange(),
            arranged: false,
            primary: Primary::Implicit(unit_act()),
            assert: None,
            asserts: Vec::new(),
            snapshots: Vec::new(),
            invalid: None,
        }
    }

    /// Declares ARRANGE. Its value reaches later stages as `Rc<A>`.
    pub fn arrange<A, F, Fut>(self, arrange: F) -> Stages<A, ()>
    where
        A: 'static,
        F: FnOnce(After) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<A>> + 'static,
    {
        let conflict = if self.arranged {
            Some("ARRANGE declared twice".to_string())
        } else if let Some(stage) = self.primary.declared() {
            Some(format!("ARRANGE declared after {stage}"))
        } else if self.has_assertions() {
            Some("ARRANGE declared after assertions".to_string())
        } else {
            None
        };
        let invalid = self.invalid.or(conflict);
        let primary = if invalid.is_some() {
            Primary::Missing
        } else {
            Primary::Implicit(unit_act())
        };
        Stages {
            arrange: Box::new(move |after: After| -> StageFuture<A> { Box::pin(arrange(after)) }),
            arranged: true,
            primary,
            assert: None,
            asserts: Vec::new(),
            snapshots: Vec::new(),
            invalid,
        }
    }
}

impl Default for Stages {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: 'static> Stages<A, ()> {
    /// Declares ACT. Receives the arrange value; its value reaches the assertions.
    pub fn act<B, F, Fut>(self, act: F) -> Stages<A, B>
    where
        B: 'static,
        F: FnOnce(Rc<A>, After) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<B>> + 'static,
    {
        let act: ActFn<A, B> =
            Box::new(move |arranged: Rc<A>, after: After| -> StageFuture<B> { Box::pin(act(arranged, after)) });
        self.with_primary("ACT", Primary::Act(act))
    }

    /// Declares SNAPSHOT in place of ACT.
    ///
    /// The value is serialized to JSON and checked against the snapshot store
    /// before it reaches the assertions.
    pub fn snapshot<B, F, Fut>(self, snapshot: F) -> Stages<A, B>
    where
        B: Serialize + 'static,
        F: FnOnce(Rc<A>, After) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<B>> + 'static,
    {
        let act: ActFn<A, B> = Box::new(move |arranged: Rc<A>, after: After| -> StageFuture<B> {
            Box::pin(snapshot(arranged, after))
        });
        self.with_primary("SNAPSHOT", Primary::Snapshot(act, to_json::<B>))
    }

    fn with_primary<B: 'static>(self, stage: &str, primary: Primary<A, B>) -> Stages<A, B> {
        let conflict = if let Some(declared) = self.primary.declared() {
            if declared == stage {
                Some(format!("{stage} declared twice"))
            } else {
                Some(format!("{stage} declared together with {declared}"))
            }
        } else if self.has_assertions() {
            Some(format!("{stage} declared after assertions"))
        } else {
            None
        };
        let invalid = self.invalid.or(conflict);
        Stages {
            arrange: self.arrange,
            arranged: self.arranged,
            primary: if invalid.is_some() { Primary::Missing } else { primary },
            assert: None,
            asserts: Vec::new(),
            snapshots: Vec::new(),
            invalid,
        }
    }
}

impl<A: 'static, B: 'static> Stages<A, B> {
    /// Declares the single ASSERT.
    pub fn assert<F, Fut>(mut self, assert: F) -> Self
    where
        F: FnOnce(Rc<B>, Rc<A>, After) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        if self.assert.is_some() {
            self.invalid
                .get_or_insert_with(|| "ASSERT declared twice".to_string());
        } else {
            self.assert = Some(Box::new(
                move |acted: Rc<B>, arranged: Rc<A>, after: After| -> StageFuture<()> {
                    Box::pin(assert(acted, arranged, after))
                },
            ));
        }
        self
    }

    /// Adds a named entry to ASSERTS. Every entry runs even when another fails.
    pub fn asserts<F, Fut>(mut self, name: impl Into<String>, assert: F) -> Self
    where
        F: FnOnce(Rc<B>, Rc<A>, After) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        self.asserts.push((
            name.into(),
            Box::new(
                move |acted: Rc<B>, arranged: Rc<A>, after: After| -> StageFuture<()> {
                    Box::pin(assert(acted, arranged, after))
                },
            ),
        ));
        self
    }

    /// Adds a named entry to SNAPSHOTS, checked against the store under the
    /// test's description chain plus `name`.
    pub fn snapshots<S, F, Fut>(mut self, name: impl Into<String>, snapshot: F) -> Self
    where
        S: Serialize,
        F: FnOnce(Rc<B>, Rc<A>, After) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<S>> + 'static,
    {
        self.snapshots.push((
            name.into(),
            Box::new(
                move |acted: Rc<B>, arranged: Rc<A>, after: After| -> StageFuture<Value> {
                    Box::pin(async move {
                        let value = snapshot(acted, arranged, after).await?;
                        Ok(serde_json::to_value(&value)?)
                    })
                },
            ),
        ));
        self
    }

    fn has_assertions(&self) -> bool {
        self.assert.is_some() || !self.asserts.is_empty() || !self.snapshots.is_empty()
    }

    pub(crate) fn invalid_reason(&self) -> Option<&str> {
        self.invalid.as_deref()
    }

    pub(crate) fn into_pipeline(self) -> Pipeline {
        Box::new(move |ctx: LeafContext| -> LocalBoxFuture<'static, Result<(), TestError>> {
            Box::pin(self.run(ctx))
        })
    }

    async fn run(self, ctx: LeafContext) -> Result<(), TestError> {
        if let Some(reason) = self.invalid {
            return Err(TestError::InvalidStages { reason });
        }
        let Stages {
            arrange,
            primary,
            assert,
            asserts,
            snapshots,
            ..
        } = self;
        let after = ctx.after();

        let hooks = after.clone();
        let arranged = Rc::new(run_stage(Stage::Arrange, async move { arrange(hooks).await }).await?);

        let acted = match primary {
            Primary::Implicit(act) | Primary::Act(act) => {
                let (input, hooks) = (arranged.clone(), after.clone());
                run_stage(Stage::Act, async move { act(input, hooks).await }).await?
            }
            Primary::Snapshot(act, to_json) => {
                let (input, hooks) = (arranged.clone(), after.clone());
                let value = run_stage(Stage::Snapshot, async move { act(input, hooks).await }).await?;
                let json = to_json(&value).map_err(|e| TestError::stage(Stage::Snapshot, e.to_string()))?;
                ctx.assert_node("", async { ctx.check_snapshot(None, &json) })
                    .await?;
                value
            }
            Primary::Missing => {
                return Err(TestError::InvalidStages {
                    reason: "no ACT or SNAPSHOT stage".to_string(),
                });
            }
        };
        let acted = Rc::new(acted);

        if let Some(assert) = assert {
            let (acted, arranged, hooks) = (acted.clone(), arranged.clone(), after.clone());
            ctx.assert_node(
                "",
                run_stage(Stage::Assert, async move { assert(acted, arranged, hooks).await }),
            )
            .await?;
        }

        let mut first_error = None;
        for (name, assert) in asserts {
            let (acted, arranged, hooks) = (acted.clone(), arranged.clone(), after.clone());
            let result = ctx
                .assert_node(
                    &name,
                    run_stage(Stage::Assert, async move { assert(acted, arranged, hooks).await }),
                )
                .await;
            if let Err(error) = result {
                first_error.get_or_insert(error);
            }
        }
        for (name, snapshot) in snapshots {
            let (acted, arranged, hooks) = (acted.clone(), arranged.clone(), after.clone());
            let result = ctx
                .assert_node(&name, async {
                    let value =
                        run_stage(Stage::Snapshot, async move { snapshot(acted, arranged, hooks).await })
                            .await?;
                    ctx.check_snapshot(Some(&name), &value)
                })
                .await;
            if let Err(error) = result {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
