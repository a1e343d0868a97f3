//! Settlement handle for a registered node.

use crate::error::TestError;
use futures::channel::oneshot;
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

pub(crate) type Signal = oneshot::Sender<Result<(), TestError>>;

/// Resolves once the node it was returned for has ended.
///
/// The node runs whether or not this is polled. Clones observe the same result.
#[derive(Clone)]
#[must_use = "a completion does nothing unless awaited, but the test still runs"]
pub struct Completion {
    inner: Shared<LocalBoxFuture<'static, Result<(), TestError>>>,
}

impl Completion {
    /// A completion paired with the sender that settles it.
    pub(crate) fn pending() -> (Signal, Self) {
        let (tx, rx) = oneshot::channel();
        let inner: LocalBoxFuture<'static, Result<(), TestError>> =
            Box::pin(async move { rx.await.unwrap_or(Err(TestError::Dropped)) });
        (
            tx,
            Self {
                inner: inner.shared(),
            },
        )
    }

    /// A completion that is already settled.
    pub(crate) fn settled(result: Result<(), TestError>) -> Self {
        let inner: LocalBoxFuture<'static, Result<(), TestError>> =
            Box::pin(futures::future::ready(result));
        Self {
            inner: inner.shared(),
        }
    }
}

impl Future for Completion {
    type Output = Result<(), TestError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}
