use crate::error::DrainError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Orderly completion of in-flight simulation work during shutdown.
///
/// The control channel calls `drain` exactly once, after `ShuttingDown` has
/// been committed and outside of its lock. The channel never cancels it.
#[async_trait]
pub trait Drainer: Send + Sync {
    async fn drain(&self) -> Result<(), DrainError>;

    /// Name used in log output
    fn name(&self) -> &str {
        "drainer"
    }
}

/// Drainer for simulations with nothing in flight
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDrainer;

#[async_trait]
impl Drainer for NoopDrainer {
    async fn drain(&self) -> Result<(), DrainError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Drainer that waits a fixed duration, standing in for real wind-down work
#[derive(Debug, Clone, Copy)]
pub struct DelayDrainer {
    delay: Duration,
}

impl DelayDrainer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Drainer for DelayDrainer {
    async fn drain(&self) -> Result<(), DrainError> {
        debug!("Draining for {:?}", self.delay);
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "delay"
    }
}
