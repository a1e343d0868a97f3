//! Cleanup hooks registered from any stage.
//!
//! Hooks collect into one list per node and run in reverse registration order
//! once the node's pipeline is over. Every hook runs even when an earlier one
//! fails; the first failure is the one returned.

use crate::error::{Stage, TestError};
use crate::runner::run_stage;
use futures::future::LocalBoxFuture;
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use tracing::{debug, warn};

type Hook = Box<dyn FnOnce() -> LocalBoxFuture<'static, anyhow::Result<()>>>;

#[derive(Default)]
struct HookList {
    hooks: Vec<Hook>,
    drained: bool,
}

/// Registrar handed to ARRANGE, ACT, ASSERT, SNAPSHOT and describe callbacks.
///
/// Cloning shares the same list.
#[derive(Clone, Default)]
pub struct After {
    list: Rc<RefCell<HookList>>,
}

impl After {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cleanup hook.
    ///
    /// If the owning node already ran its hooks, the hook runs once right away
    /// on the current `LocalSet` and a failure is only logged.
    pub fn register<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        let boxed: Hook = Box::new(move || Box::pin(hook()));
        let mut list = self.list.borrow_mut();
        if list.drained {
            drop(list);
            debug!("Cleanup registered after its node ended, running it now");
            tokio::task::spawn_local(async move {
                if let Err(error) = run_stage(Stage::After, async move { boxed().await }).await {
                    warn!(%error, "Late cleanup hook failed");
                }
            });
        } else {
            list.hooks.push(boxed);
        }
    }

    /// Registers a cleanup for `value` and hands the value back.
    ///
    /// ```ignore
    /// let dir = after.keep(tempdir()?, |dir| async move { Ok(dir.close()?) });
    /// ```
    pub fn keep<T, F, Fut>(&self, value: T, cleanup: F) -> T
    where
        T: Clone + 'static,
        F: FnOnce(T) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        let kept = value.clone();
        self.register(move || cleanup(kept));
        value
    }

    /// Number of hooks waiting to run.
    pub fn len(&self) -> usize {
        self.list.borrow().hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every registered hook, last registered first.
    pub(crate) async fn run_all(&self) -> Result<(), TestError> {
        let hooks = {
            let mut list = self.list.borrow_mut();
            list.drained = true;
            std::mem::take(&mut list.hooks)
        };
        let mut first_error = None;
        for hook in hooks.into_iter().rev() {
            if let Err(error) = run_stage(Stage::After, async move { hook().await }).await {
                debug!(%error, "Cleanup hook failed");
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Merges a pipeline result with the result of its cleanup hooks.
///
/// The pipeline's own error wins; a cleanup failure it shadows is logged.
pub(crate) fn merge_cleanup(
    pipeline: Result<(), TestError>,
    cleanup: Result<(), TestError>,
) -> Result<(), TestError> {
    match (pipeline, cleanup) {
        (Err(error), Err(shadowed)) => {
            warn!(%shadowed, %error, "Cleanup failed after the pipeline already failed");
            Err(error)
        }
        (Err(error), Ok(())) | (Ok(()), Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}
