//! Coverage collaborator.
//!
//! The runner does not instrument code itself. A `CoverageSource` is started
//! before a file's tests run, and whatever it returns afterwards travels to
//! the parent as an opaque `Coverage` message.

use async_trait::async_trait;
use serde_json::Value;

#[async_trait(?Send)]
pub trait CoverageSource {
    async fn start(&mut self) -> anyhow::Result<()>;

    /// Returns the payload collected since `start`.
    async fn take_coverage(&mut self) -> anyhow::Result<Value>;

    async fn stop(&mut self) -> anyhow::Result<()>;
}

/// Reports a fixed payload. Useful for wiring tests.
#[derive(Debug, Clone, Default)]
pub struct StaticCoverage {
    payload: Value,
    started: bool,
}

impl StaticCoverage {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            started: false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

#[async_trait(?Send)]
impl CoverageSource for StaticCoverage {
    async fn start(&mut self) -> anyhow::Result<()> {
        self.started = true;
        Ok(())
    }

    async fn take_coverage(&mut self) -> anyhow::Result<Value> {
        anyhow::ensure!(self.started, "coverage was not started");
        Ok(self.payload.clone())
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        self.started = false;
        Ok(())
    }
}
