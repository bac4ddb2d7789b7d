//! The crawl session orchestrator
//!
//! `CrawlController` owns the durable crawl state and the shared
//! collaborators. It admits seeds, starts the worker pool and its monitor,
//! and exposes the lifecycle of the session to the embedding application.

use crate::config::{validate, Config};
use crate::crawler::monitor::Monitor;
use crate::crawler::observer::{IgnoreSeedEvents, SeedEventObserver};
use crate::crawler::quiescence::{DelayedDoubleCheck, QuiescenceDetector};
use crate::crawler::seeds::SeedRegistry;
use crate::crawler::worker::{DefaultFactory, FetchWorker, SessionHandle, WorkerFactory, WorkerSlot};
use crate::crawler::PageFetcher;
use crate::robots::{AdmissionPolicy, RobotstxtServer};
use crate::storage::{open_store, StorageError};
use crate::url::{canonicalize_url, WebUrl};
use crate::{Result, TidepoolError};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Where a session is in its life
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Not finished yet (also the state before `start`)
    Running,
    /// The termination sequence completed
    Finished,
    /// The monitor failed; the termination sequence did not run
    Aborted(String),
}

/// Orchestrates one crawl session over a pool of `W` workers
pub struct CrawlController<W: FetchWorker> {
    session: SessionHandle,
    seeds: SeedRegistry,
    observer: Arc<dyn SeedEventObserver>,
    quiescence: Arc<dyn QuiescenceDetector>,
    status: Arc<watch::Sender<SessionStatus>>,
    local_data: Arc<Mutex<Vec<W::LocalData>>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl<W: FetchWorker> CrawlController<W> {
    /// Validates the configuration and opens the crawl state
    ///
    /// Creates the storage folder when needed, and wipes the previous state
    /// unless resumable crawling is on. The robots.txt server is the default
    /// admission policy.
    pub fn new(config: Config) -> Result<Self> {
        validate(&config)?;

        let store = open_store(
            Path::new(&config.crawler.storage_folder),
            config.crawler.resumable_crawling,
            config.crawler.max_pages_to_fetch,
        )?;
        let fetcher = Arc::new(PageFetcher::new(&config)?);
        let admission: Arc<dyn AdmissionPolicy> =
            Arc::new(RobotstxtServer::new(&config.robots, fetcher.clone()));
        let quiescence = Arc::new(DelayedDoubleCheck::new(config.session.shutdown_delay()));

        let session = SessionHandle {
            config: Arc::new(config),
            env: store.env,
            frontier: store.frontier,
            doc_ids: store.doc_ids,
            admission,
            fetcher,
            shutting_down: Arc::new(AtomicBool::new(false)),
        };

        let (status, _) = watch::channel(SessionStatus::Running);

        Ok(Self {
            session,
            seeds: SeedRegistry::new(),
            observer: Arc::new(IgnoreSeedEvents),
            quiescence,
            status: Arc::new(status),
            local_data: Arc::new(Mutex::new(Vec::new())),
            monitor: Mutex::new(None),
        })
    }

    /// Replaces the robots.txt admission policy
    pub fn with_admission_policy(mut self, admission: Arc<dyn AdmissionPolicy>) -> Self {
        self.session.admission = admission;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SeedEventObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replaces the quiescence confirmation used by the monitor
    pub fn with_quiescence(mut self, quiescence: Arc<dyn QuiescenceDetector>) -> Self {
        self.quiescence = quiescence;
        self
    }

    pub fn config(&self) -> &Config {
        self.session.config()
    }

    /// Shared session view handed to every worker
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Adds a seed URL to the crawl
    ///
    /// Seeds deeper than the configured max depth are ignored. A URL that
    /// already has a document id is not scheduled again unless `doc_id` pins
    /// it explicitly. Seeds refused by the admission policy are logged and
    /// skipped. The seed's domain and host are remembered in every case once
    /// the URL canonicalizes.
    ///
    /// An explicit `doc_id` must be at least 1 and above every id handed out
    /// so far. A negative `doc_id` is treated as absent.
    ///
    /// # Errors
    ///
    /// `TidepoolError::InvalidUrl` when the URL cannot be canonicalized, and
    /// storage errors from the frontier or the doc-id server. A rejected
    /// explicit `doc_id` is logged and the seed skipped.
    pub async fn add_seed(&self, page_url: &str, doc_id: Option<i64>, depth: u16) -> Result<()> {
        if let Some(max_depth) = self.session.config.crawler.max_depth {
            if depth > max_depth {
                tracing::trace!(
                    "Ignoring seed {} at depth {} (max depth is {})",
                    page_url,
                    depth,
                    max_depth
                );
                return Ok(());
            }
        }

        let canonical = match canonicalize_url(page_url, None) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("Invalid seed URL: {} ({})", page_url, e);
                self.observer.seed_invalid(page_url, &e);
                return Err(TidepoolError::InvalidUrl {
                    url: page_url.to_string(),
                });
            }
        };

        self.seeds.record(&canonical);

        let doc_ids = self.session.doc_ids();
        let doc_id = match doc_id.filter(|id| *id >= 0) {
            None => match doc_ids.lookup(canonical.as_str())? {
                Some(existing) => {
                    tracing::trace!("This URL is already seen: {}", canonical);
                    self.observer
                        .seed_already_seen(&WebUrl::seed(canonical, existing));
                    return Ok(());
                }
                None => doc_ids.allocate(canonical.as_str())?,
            },
            Some(requested) => match doc_ids.register_explicit(canonical.as_str(), requested) {
                Ok(()) => requested,
                Err(e @ StorageError::DocIdConflict { .. })
                | Err(e @ StorageError::DocIdNotIncreasing { .. }) => {
                    tracing::error!("Could not add seed {}: {}", page_url, e);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            },
        };

        let seed = WebUrl::seed(canonical, doc_id);
        if self.session.admission().allows(&seed).await {
            self.session.frontier().schedule(&seed)?;
            tracing::debug!("Scheduled seed {} with doc id {}", seed.as_str(), doc_id);
        } else {
            tracing::warn!(
                "Robots.txt does not allow this seed: {}",
                page_url
            );
            self.observer.seed_denied_by_robots(&seed);
        }

        Ok(())
    }

    /// Marks a URL as already crawled so it is never scheduled
    ///
    /// Used when resuming from an external record of a previous crawl. An
    /// unusable URL or a rejected `doc_id` is logged and skipped.
    pub fn add_seen_url(&self, url: &str, doc_id: i64) -> Result<()> {
        let canonical = match canonicalize_url(url, None) {
            Ok(canonical) => canonical,
            Err(e) => {
                tracing::error!("Could not add seen url {}: {}", url, e);
                return Ok(());
            }
        };

        match self
            .session
            .doc_ids()
            .register_explicit(canonical.as_str(), doc_id)
        {
            Ok(()) => Ok(()),
            Err(e @ StorageError::DocIdConflict { .. })
            | Err(e @ StorageError::DocIdNotIncreasing { .. }) => {
                tracing::error!("Could not add seen url {}: {}", url, e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Starts `number_of_crawlers` workers built by `factory`, plus the monitor
    ///
    /// A controller runs one session: the environment is closed when it
    /// ends, so a second call returns `TidepoolError::AlreadyStarted`. With
    /// `blocking` set this waits for the session to finish. A factory failure
    /// aborts the start-up and stops any worker already started.
    pub async fn start<F>(&self, factory: F, number_of_crawlers: usize, blocking: bool) -> Result<()>
    where
        F: WorkerFactory<W> + 'static,
    {
        {
            let mut monitor = self.monitor.lock().unwrap_or_else(PoisonError::into_inner);
            if monitor.is_some() {
                return Err(TidepoolError::AlreadyStarted);
            }

            let factory: Arc<dyn WorkerFactory<W>> = Arc::new(factory);
            let mut slots = Vec::with_capacity(number_of_crawlers);
            for index in 0..number_of_crawlers {
                match WorkerSlot::spawn(factory.as_ref(), index, &self.session) {
                    Ok(slot) => {
                        tracing::info!("Crawler {} started", index + 1);
                        slots.push(slot);
                    }
                    Err(e) => {
                        tracing::error!("Could not create crawler {}: {}", index + 1, e);
                        for slot in &slots {
                            slot.abort();
                        }
                        return Err(e);
                    }
                }
            }

            let session_monitor = Monitor {
                slots,
                factory,
                session: self.session.clone(),
                quiescence: self.quiescence.clone(),
                timing: self.session.config.session.clone(),
                local_data: self.local_data.clone(),
                status: self.status.clone(),
            };
            *monitor = Some(spawn_supervised(
                session_monitor,
                self.session.clone(),
                self.status.clone(),
            ));
        }

        if blocking {
            self.wait_until_finish().await?;
        }
        Ok(())
    }

    pub async fn start_non_blocking<F>(&self, factory: F, number_of_crawlers: usize) -> Result<()>
    where
        F: WorkerFactory<W> + 'static,
    {
        self.start(factory, number_of_crawlers, false).await
    }

    /// Starts workers built with `W::default()`
    pub async fn start_default(&self, number_of_crawlers: usize, blocking: bool) -> Result<()>
    where
        W: Default,
    {
        self.start(DefaultFactory, number_of_crawlers, blocking).await
    }

    /// Waits until the session has finished
    ///
    /// Returns immediately if it already has. Any number of callers may wait.
    ///
    /// # Errors
    ///
    /// `TidepoolError::SessionAborted` if the monitor failed.
    pub async fn wait_until_finish(&self) -> Result<()> {
        let mut rx = self.status.subscribe();
        let status = rx
            .wait_for(|status| *status != SessionStatus::Running)
            .await
            .map_err(|_| TidepoolError::SessionAborted("session dropped".to_string()))?
            .clone();

        match status {
            SessionStatus::Aborted(reason) => Err(TidepoolError::SessionAborted(reason)),
            _ => Ok(()),
        }
    }

    /// Asks the session to stop
    ///
    /// Workers stop at their next URL, the fetcher refuses new requests and
    /// the frontier releases every waiting worker. The monitor then runs the
    /// termination sequence without waiting for the queue to drain.
    pub fn shutdown(&self) {
        if self.session.begin_shutdown() {
            tracing::info!("Shutting down...");
        }
        self.session.fetcher().shut_down();
        self.session.frontier().finish();
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        *self.status.borrow() == SessionStatus::Finished
    }

    pub fn is_aborted(&self) -> bool {
        matches!(*self.status.borrow(), SessionStatus::Aborted(_))
    }

    pub fn is_shutting_down(&self) -> bool {
        self.session.is_shutting_down()
    }

    /// Per-worker results, in slot order; empty until the session finishes
    pub fn crawlers_local_data(&self) -> Vec<W::LocalData>
    where
        W::LocalData: Clone,
    {
        self.local_data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Moves the per-worker results out of the controller
    pub fn take_crawlers_local_data(&self) -> Vec<W::LocalData> {
        std::mem::take(&mut *self.local_data.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn has_domain_in_seeds(&self, domain: &str) -> bool {
        self.seeds.has_domain(domain)
    }

    pub fn has_host_in_seeds(&self, host: &str) -> bool {
        self.seeds.has_host(host)
    }
}

/// Runs the monitor and turns its failure into `SessionStatus::Aborted`
///
/// An aborted session skips the termination sequence, but the store is still
/// released so that parked workers exit and the folder can be reopened.
fn spawn_supervised<W: FetchWorker>(
    monitor: Monitor<W>,
    session: SessionHandle,
    status: Arc<watch::Sender<SessionStatus>>,
) -> JoinHandle<()> {
    let inner = tokio::spawn(monitor.run());

    tokio::spawn(async move {
        let reason = match inner.await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(e) if e.is_panic() => "monitor panicked".to_string(),
            Err(e) => e.to_string(),
        };

        tracing::error!("Crawl monitor failed: {}", reason);
        session.release();
        status.send_replace(SessionStatus::Aborted(reason));
    })
}

impl<W: FetchWorker> Drop for CrawlController<W> {
    fn drop(&mut self) {
        if !self.session.is_storage_closed() {
            tracing::debug!("Crawl controller dropped, releasing the crawl state");
            self.session.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robots::AllowAll;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Worker that never does anything
    #[derive(Default)]
    struct Parked;

    #[async_trait]
    impl FetchWorker for Parked {
        type LocalData = ();

        fn bind(&mut self, _context: crate::crawler::WorkerContext) {}

        async fn run(&self) {
            std::future::pending::<()>().await;
        }

        fn is_idle(&self) -> bool {
            true
        }

        fn local_data(&self) {}
    }

    struct DenyAll;

    #[async_trait]
    impl AdmissionPolicy for DenyAll {
        async fn allows(&self, _url: &WebUrl) -> bool {
            false
        }
    }

    fn controller(dir: &TempDir, max_depth: Option<u16>) -> CrawlController<Parked> {
        let mut config = Config::for_tests(dir.path().to_str().unwrap());
        config.crawler.max_depth = max_depth;
        CrawlController::new(config)
            .unwrap()
            .with_admission_policy(Arc::new(AllowAll))
    }

    #[tokio::test]
    async fn test_fresh_seed_is_scheduled_once() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir, None);

        controller.add_seed("http://a.test/", None, 0).await.unwrap();
        controller.add_seed("http://A.test/#top", None, 0).await.unwrap();

        assert_eq!(controller.session().frontier().len().unwrap(), 1);
        assert_eq!(
            controller.session().doc_ids().lookup("http://a.test/").unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_too_deep_seed_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir, Some(2));

        controller.add_seed("http://deep.test/", None, 3).await.unwrap();

        assert_eq!(controller.session().frontier().len().unwrap(), 0);
        assert_eq!(controller.session().doc_ids().len().unwrap(), 0);
        assert!(!controller.has_domain_in_seeds("deep.test"));
    }

    #[tokio::test]
    async fn test_invalid_seed_is_an_error() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir, None);

        let result = controller.add_seed("ftp://a.test/file", None, 0).await;

        assert!(matches!(result, Err(TidepoolError::InvalidUrl { .. })));
        assert_eq!(controller.session().doc_ids().len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_denied_seed_is_registered_but_not_scheduled() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir, None).with_admission_policy(Arc::new(DenyAll));

        controller.add_seed("http://Shop.Example.com/", None, 0).await.unwrap();

        assert_eq!(controller.session().frontier().len().unwrap(), 0);
        assert!(controller.has_domain_in_seeds("example.com"));
        assert!(controller.has_host_in_seeds("shop.example.com"));
    }

    #[tokio::test]
    async fn test_explicit_doc_id_conflict_skips_seed() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir, None);

        controller.add_seed("http://a.test/", Some(5), 0).await.unwrap();
        controller.add_seed("http://a.test/", Some(9), 0).await.unwrap();

        assert_eq!(controller.session().frontier().len().unwrap(), 1);
        assert_eq!(
            controller.session().doc_ids().lookup("http://a.test/").unwrap(),
            Some(5)
        );
    }

    #[tokio::test]
    async fn test_seen_url_is_never_scheduled() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir, None);

        controller.add_seen_url("http://a.test/old", 3).unwrap();
        controller.add_seed("http://a.test/old", None, 0).await.unwrap();
        controller.add_seen_url("not a url", 4).unwrap();

        assert_eq!(controller.session().frontier().len().unwrap(), 0);
        assert_eq!(controller.session().doc_ids().allocate("http://a.test/new").unwrap(), 4);
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir, None);

        controller.start_default(1, false).await.unwrap();
        let second = controller.start_default(1, false).await;

        assert!(matches!(second, Err(TidepoolError::AlreadyStarted)));
        controller.shutdown();
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::for_tests(dir.path().to_str().unwrap());
        config.session.monitoring_delay = 0;

        let result = CrawlController::<Parked>::new(config);
        assert!(matches!(result, Err(TidepoolError::Config(_))));
    }

    #[tokio::test]
    async fn test_huge_robots_cache_lifetime_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::for_tests(dir.path().to_str().unwrap());
        config.robots.cache_hours = 9_000_000_000_000_000;

        let result = CrawlController::<Parked>::new(config);
        assert!(matches!(result, Err(TidepoolError::Config(_))));
    }

    #[tokio::test]
    async fn test_negative_doc_id_is_allocated() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir, None);

        controller.add_seed("http://a.test/", Some(-1), 0).await.unwrap();

        assert_eq!(controller.session().frontier().len().unwrap(), 1);
        assert_eq!(
            controller.session().doc_ids().lookup("http://a.test/").unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_zero_doc_id_skips_seed() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir, None);

        controller.add_seed("http://a.test/", Some(0), 0).await.unwrap();

        assert_eq!(controller.session().frontier().len().unwrap(), 0);
        assert_eq!(controller.session().doc_ids().lookup("http://a.test/").unwrap(), None);
    }

    #[derive(Default)]
    struct Recorder {
        events: std::sync::Mutex<Vec<String>>,
    }

    impl SeedEventObserver for Recorder {
        fn seed_denied_by_robots(&self, url: &WebUrl) {
            self.events.lock().unwrap().push(format!("denied {}", url.as_str()));
        }

        fn seed_invalid(&self, url: &str, _error: &crate::UrlError) {
            self.events.lock().unwrap().push(format!("invalid {}", url));
        }

        fn seed_already_seen(&self, url: &WebUrl) {
            self.events.lock().unwrap().push(format!("seen {}", url.as_str()));
        }
    }

    #[tokio::test]
    async fn test_observer_hears_every_seed_outcome() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let controller = controller(&dir, None)
            .with_admission_policy(Arc::new(DenyAll))
            .with_observer(recorder.clone());

        controller.add_seed("http://a.test/", None, 0).await.unwrap();
        controller.add_seed("http://a.test/", None, 0).await.unwrap();
        assert!(controller.add_seed("mailto:me@a.test", None, 0).await.is_err());

        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec![
                "denied http://a.test/".to_string(),
                "seen http://a.test/".to_string(),
                "invalid mailto:me@a.test".to_string(),
            ]
        );
    }
}
