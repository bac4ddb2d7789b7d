//! Deciding that a crawl has run out of work
//!
//! The monitor only asks for confirmation once it has seen every live worker
//! idle. A detector then decides whether that observation holds up.

use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Read-only view of the pool used to confirm quiescence
pub trait PoolProbe: Send + Sync {
    /// Whether any live worker is busy
    fn someone_working(&self) -> bool;

    /// Number of URLs waiting in the frontier
    fn queue_len(&self) -> Result<u64>;

    fn is_shutting_down(&self) -> bool;
}

/// Confirms that an idle-looking pool is really done
#[async_trait]
pub trait QuiescenceDetector: Send + Sync {
    /// Returns true when the session should terminate
    async fn confirm(&self, probe: &dyn PoolProbe) -> Result<bool>;
}

/// Waits, re-checks the workers, then checks the queue twice
///
/// The queue checks are skipped once the session is shutting down. This
/// narrows, but does not close, the window in which a worker about to
/// schedule new links is mistaken for a finished crawl.
#[derive(Debug, Clone)]
pub struct DelayedDoubleCheck {
    pub shutdown_delay: Duration,
}

impl DelayedDoubleCheck {
    pub fn new(shutdown_delay: Duration) -> Self {
        Self { shutdown_delay }
    }
}

#[async_trait]
impl QuiescenceDetector for DelayedDoubleCheck {
    async fn confirm(&self, probe: &dyn PoolProbe) -> Result<bool> {
        tracing::debug!(
            "It looks like no crawler is working, waiting {:?} to make sure",
            self.shutdown_delay
        );
        tokio::time::sleep(self.shutdown_delay).await;

        if probe.someone_working() {
            return Ok(false);
        }

        if !probe.is_shutting_down() {
            if probe.queue_len()? > 0 {
                return Ok(false);
            }

            tracing::debug!(
                "No crawler is working and the queue is empty, waiting {:?} before finishing",
                self.shutdown_delay
            );
            tokio::time::sleep(self.shutdown_delay).await;

            if probe.queue_len()? > 0 {
                return Ok(false);
            }
        }

        Ok(true)
    }
}
