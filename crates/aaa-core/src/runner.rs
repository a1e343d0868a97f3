//! Runs a single user-supplied stage body.
//!
//! Bodies return `anyhow::Result`; a body may also panic (typically through
//! `assert!`/`assert_eq!`). Both outcomes become a `TestError` tagged with the
//! stage that produced it, so callers compose plain `Result`s.

use crate::error::{Stage, TestError};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Awaits a stage body, converting errors and panics into a `TestError`.
///
/// The closure producing the future should be invoked inside `body` so that a
/// synchronous panic before the first await is also captured.
pub(crate) async fn run_stage<T, F>(stage: Stage, body: F) -> Result<T, TestError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match AssertUnwindSafe(body).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(TestError::stage(stage, format!("{error:#}"))),
        Err(payload) => Err(TestError::stage(stage, panic_message(payload.as_ref()))),
    }
}

/// Extracts the message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}
