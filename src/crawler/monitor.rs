//! The session monitor
//!
//! A single task that owns the slot table. Every monitoring interval it
//! respawns dead workers, looks for quiescence and, once the pool is done,
//! runs the termination sequence:
//!
//! 1. finish the frontier
//! 2. per slot, in order: `before_exit`, then collect `local_data`
//! 3. wait out the cleanup delay
//! 4. close the frontier, the doc-id server, the fetcher, then the environment
//! 5. publish `SessionStatus::Finished`

use crate::config::SessionConfig;
use crate::crawler::controller::SessionStatus;
use crate::crawler::quiescence::{PoolProbe, QuiescenceDetector};
use crate::crawler::worker::{FetchWorker, SessionHandle, WorkerFactory, WorkerSlot};
use crate::Result;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

pub(crate) struct Monitor<W: FetchWorker> {
    pub slots: Vec<WorkerSlot<W>>,
    pub factory: Arc<dyn WorkerFactory<W>>,
    pub session: SessionHandle,
    pub quiescence: Arc<dyn QuiescenceDetector>,
    pub timing: SessionConfig,
    pub local_data: Arc<Mutex<Vec<W::LocalData>>>,
    pub status: Arc<watch::Sender<SessionStatus>>,
}

impl<W: FetchWorker> Monitor<W> {
    /// Runs until the session terminates
    ///
    /// An error means the monitor gave up before the termination sequence.
    pub async fn run(mut self) -> Result<()> {
        let quiescence = self.quiescence.clone();

        loop {
            tokio::time::sleep(self.timing.monitoring_delay()).await;

            self.respawn_dead_slots()?;

            if self.someone_working() {
                continue;
            }
            if !self.timing.shutdown_on_empty_queue && !self.session.is_shutting_down() {
                continue;
            }

            if quiescence.confirm(&self).await? {
                self.terminate().await;
                return Ok(());
            }
        }
    }

    fn respawn_dead_slots(&mut self) -> Result<()> {
        if self.session.is_shutting_down() {
            return Ok(());
        }

        for index in 0..self.slots.len() {
            if self.slots[index].is_alive() {
                continue;
            }

            tracing::info!("Crawler {} was dead, restarting it", index + 1);
            self.slots[index] = WorkerSlot::spawn(self.factory.as_ref(), index, &self.session)?;
        }
        Ok(())
    }

    async fn terminate(&mut self) {
        tracing::info!("All of the crawlers are stopped. Finishing the process...");
        self.session.frontier().finish();

        let mut collected = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            slot.worker.before_exit().await;
            collected.push(slot.worker.local_data());
        }
        self.local_data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(collected);

        let cleanup_delay = self.timing.cleanup_delay();
        if !cleanup_delay.is_zero() {
            tracing::info!(
                "Waiting for {} seconds before final clean up...",
                cleanup_delay.as_secs()
            );
            tokio::time::sleep(cleanup_delay).await;
        }

        self.session.release();

        self.status.send_replace(SessionStatus::Finished);
        tracing::info!("Crawl session finished");
    }
}

impl<W: FetchWorker> PoolProbe for Monitor<W> {
    fn someone_working(&self) -> bool {
        self.slots.iter().any(WorkerSlot::is_working)
    }

    fn queue_len(&self) -> Result<u64> {
        Ok(self.session.frontier().len()?)
    }

    fn is_shutting_down(&self) -> bool {
        self.session.is_shutting_down()
    }
}
