//! Worker contracts and the per-slot bookkeeping of the pool

use crate::config::Config;
use crate::crawler::PageFetcher;
use crate::robots::AdmissionPolicy;
use crate::storage::{DocIdServer, Environment, Frontier};
use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A fetch worker driven by the session
///
/// One worker runs per slot. The session binds it to its slot, runs it on its
/// own task, and treats the task ending (normally or by panic) as the worker
/// dying. Workers publish their state only through `is_idle`.
#[async_trait]
pub trait FetchWorker: Send + Sync + 'static {
    /// Per-worker result collected when the session terminates
    type LocalData: Send + 'static;

    /// Called once, before `run`, with the worker's slot and session
    fn bind(&mut self, context: WorkerContext);

    /// The worker loop; returning means the worker is dead
    async fn run(&self);

    /// True while the worker is waiting for new URLs
    fn is_idle(&self) -> bool;

    /// Hook run by the session during termination, in slot order
    async fn before_exit(&self) {}

    fn local_data(&self) -> Self::LocalData;
}

/// Builds workers for the pool
///
/// Called once per slot at start-up and again whenever a dead slot is
/// respawned. Any closure returning `Result<W>` is a factory.
pub trait WorkerFactory<W>: Send + Sync {
    fn create(&self) -> Result<W>;
}

impl<W, F> WorkerFactory<W> for F
where
    F: Fn() -> Result<W> + Send + Sync,
{
    fn create(&self) -> Result<W> {
        self()
    }
}

/// Factory for workers that can be built with `Default`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFactory;

impl<W: Default> WorkerFactory<W> for DefaultFactory {
    fn create(&self) -> Result<W> {
        Ok(W::default())
    }
}

/// What a worker receives when it is bound to a slot
#[derive(Clone)]
pub struct WorkerContext {
    /// Zero-based slot index
    pub slot: usize,
    pub session: SessionHandle,
}

impl WorkerContext {
    /// One-based slot identity, as used in logs
    pub fn slot_id(&self) -> usize {
        self.slot + 1
    }
}

/// Shared view of a running session: configuration, collaborators and the
/// shutdown flag
#[derive(Clone)]
pub struct SessionHandle {
    pub(crate) config: Arc<Config>,
    pub(crate) env: Arc<Environment>,
    pub(crate) frontier: Arc<dyn Frontier>,
    pub(crate) doc_ids: Arc<dyn DocIdServer>,
    pub(crate) admission: Arc<dyn AdmissionPolicy>,
    pub(crate) fetcher: Arc<PageFetcher>,
    pub(crate) shutting_down: Arc<AtomicBool>,
}

impl SessionHandle {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn frontier(&self) -> &dyn Frontier {
        self.frontier.as_ref()
    }

    pub fn doc_ids(&self) -> &dyn DocIdServer {
        self.doc_ids.as_ref()
    }

    pub fn admission(&self) -> &dyn AdmissionPolicy {
        self.admission.as_ref()
    }

    pub fn fetcher(&self) -> &PageFetcher {
        &self.fetcher
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Whether the durable environment has been closed
    pub fn is_storage_closed(&self) -> bool {
        self.env.is_closed()
    }

    /// Sets the shutdown flag; returns false if it was already set
    pub(crate) fn begin_shutdown(&self) -> bool {
        !self.shutting_down.swap(true, Ordering::SeqCst)
    }

    /// Finishes the frontier and closes the collaborators, environment last
    ///
    /// Parked workers are released and the storage folder can be opened
    /// again. Idempotent.
    pub(crate) fn release(&self) {
        self.frontier.finish();
        if let Err(e) = self.frontier.close() {
            tracing::error!("Failed to close the frontier: {}", e);
        }
        if let Err(e) = self.doc_ids.close() {
            tracing::error!("Failed to close the doc id server: {}", e);
        }
        self.fetcher.shut_down();
        if let Err(e) = self.env.close() {
            tracing::error!("Failed to close the crawl environment: {}", e);
        }
    }
}

/// One entry of the pool: the worker and the task running it
pub(crate) struct WorkerSlot<W> {
    pub worker: Arc<W>,
    handle: JoinHandle<()>,
}

impl<W: FetchWorker> WorkerSlot<W> {
    /// Creates a worker, binds it to `index` and starts its task
    pub fn spawn(
        factory: &dyn WorkerFactory<W>,
        index: usize,
        session: &SessionHandle,
    ) -> Result<Self> {
        let mut worker = factory.create()?;
        worker.bind(WorkerContext {
            slot: index,
            session: session.clone(),
        });

        let worker = Arc::new(worker);
        let task_worker = worker.clone();
        let handle = tokio::spawn(async move {
            task_worker.run().await;
            tracing::debug!("Crawler {} exited", index + 1);
        });

        Ok(Self {
            worker,
            handle,
        })
    }

    pub fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Alive and not waiting for new URLs
    pub fn is_working(&self) -> bool {
        self.is_alive() && !self.worker.is_idle()
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}
