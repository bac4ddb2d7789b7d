//! The default fetch worker
//!
//! Pulls batches from the frontier, fetches each URL, schedules newly found
//! links and hands every fetched page to a [`PageVisitor`].

use crate::crawler::fetcher::FetchOutcome;
use crate::crawler::parser::parse_html;
use crate::crawler::worker::{FetchWorker, WorkerContext};
use crate::url::{canonicalize_url, WebUrl};
use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use url::Url;

/// Number of URLs claimed from the frontier at a time
const BATCH_SIZE: usize = 50;

/// A fetched page as seen by a [`PageVisitor`]
#[derive(Debug, Clone)]
pub struct Page {
    pub url: WebUrl,
    pub status_code: u16,
    pub content_type: String,
    pub title: Option<String>,
    pub body: String,
    /// Canonical outgoing links (empty for non-HTML pages)
    pub links: Vec<Url>,
}

impl Page {
    pub fn is_html(&self) -> bool {
        self.content_type.contains("text/html")
    }
}

/// Application hooks of an [`HttpWorker`]
pub trait PageVisitor: Send + Sync + 'static {
    /// Whether a link found on `referring` should be crawled
    fn should_visit(&self, _referring: &WebUrl, _url: &Url) -> bool {
        true
    }

    /// Called for every successfully fetched page
    fn visit(&self, _page: &Page) {}

    /// Called once when the session terminates
    fn on_before_exit(&self) {}
}

/// Counters published as an [`HttpWorker`]'s local data
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// One-based slot identity
    pub slot: usize,
    pub pages_visited: u64,
    pub pages_failed: u64,
    pub links_scheduled: u64,
}

/// Fetch worker that crawls over HTTP
pub struct HttpWorker<V> {
    visitor: V,
    context: Option<WorkerContext>,
    idle: AtomicBool,
    pages_visited: AtomicU64,
    pages_failed: AtomicU64,
    links_scheduled: AtomicU64,
}

impl<V: PageVisitor> HttpWorker<V> {
    pub fn new(visitor: V) -> Self {
        Self {
            visitor,
            context: None,
            idle: AtomicBool::new(false),
            pages_visited: AtomicU64::new(0),
            pages_failed: AtomicU64::new(0),
            links_scheduled: AtomicU64::new(0),
        }
    }

    pub fn visitor(&self) -> &V {
        &self.visitor
    }

    async fn process_page(&self, ctx: &WorkerContext, item: &WebUrl) -> Result<()> {
        let session = &ctx.session;

        let outcome = match session.fetcher().fetch(&item.url).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::debug!("Crawler {} skipped {}: {}", ctx.slot_id(), item.as_str(), e);
                return Ok(());
            }
        };

        match outcome {
            FetchOutcome::Redirect {
                status_code,
                location,
            } => self.handle_redirect(ctx, item, status_code, location).await,
            FetchOutcome::HttpError { status_code } => {
                self.pages_failed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    "Skipping URL: {}, status code: {}",
                    item.as_str(),
                    status_code
                );
                Ok(())
            }
            FetchOutcome::NetworkError { error } => {
                self.pages_failed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Fetch of {} failed: {}", item.as_str(), error);
                Ok(())
            }
            FetchOutcome::Success {
                final_url,
                status_code,
                content_type,
                body,
            } => {
                let mut page = Page {
                    url: item.clone(),
                    status_code,
                    content_type,
                    title: None,
                    body,
                    links: Vec::new(),
                };

                if page.is_html() {
                    let max_links = session.config().crawler.max_outgoing_links;
                    let parsed = parse_html(&page.body, &final_url, max_links);
                    page.title = parsed.title;
                    page.links = parsed.links.iter().map(|l| l.url.clone()).collect();

                    let mut to_schedule = Vec::new();
                    for link in parsed.links {
                        if let Some(child) = self.admit_link(ctx, item, link.url).await? {
                            to_schedule.push(WebUrl {
                                anchor: link.anchor,
                                ..child
                            });
                        }
                    }
                    session.frontier().schedule_all(&to_schedule)?;
                    self.links_scheduled
                        .fetch_add(to_schedule.len() as u64, Ordering::Relaxed);
                }

                self.visitor.visit(&page);
                self.pages_visited.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    "Crawler {} visited {} ({} links)",
                    ctx.slot_id(),
                    item.as_str(),
                    page.links.len()
                );
                Ok(())
            }
        }
    }

    async fn handle_redirect(
        &self,
        ctx: &WorkerContext,
        item: &WebUrl,
        status_code: u16,
        location: Option<String>,
    ) -> Result<()> {
        let session = &ctx.session;

        if !session.config().crawler.follow_redirects {
            tracing::debug!("Not following redirect {} from {}", status_code, item.as_str());
            return Ok(());
        }

        let Some(location) = location else {
            tracing::warn!("URL {} was redirected to nothing", item.as_str());
            return Ok(());
        };

        let target = match canonicalize_url(&location, Some(&item.url)) {
            Ok(target) => target,
            Err(e) => {
                tracing::debug!("Ignoring redirect from {} to {}: {}", item.as_str(), location, e);
                return Ok(());
            }
        };

        if session.doc_ids().lookup(target.as_str())?.is_some() {
            tracing::debug!("Redirect target {} has already been seen", target);
            return Ok(());
        }

        let candidate = WebUrl {
            url: target,
            doc_id: 0,
            ..item.clone()
        };

        if !self.visitor.should_visit(item, &candidate.url) {
            tracing::debug!("Not visiting {} as per the visitor's policy", candidate.as_str());
            return Ok(());
        }
        if !session.admission().allows(&candidate).await {
            tracing::debug!("Not visiting {} as per robots.txt", candidate.as_str());
            return Ok(());
        }

        let doc_id = session.doc_ids().allocate(candidate.as_str())?;
        session.frontier().schedule(&WebUrl { doc_id, ..candidate })?;
        self.links_scheduled.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Returns the work item for `url` when it should be scheduled
    async fn admit_link(
        &self,
        ctx: &WorkerContext,
        parent: &WebUrl,
        url: Url,
    ) -> Result<Option<WebUrl>> {
        let session = &ctx.session;
        let crawler = &session.config().crawler;

        if session.doc_ids().lookup(url.as_str())?.is_some() {
            return Ok(None);
        }

        if let Some(max_depth) = crawler.max_depth {
            if parent.depth >= max_depth {
                return Ok(None);
            }
        }

        if !crawler.include_https && url.scheme() == "https" {
            return Ok(None);
        }

        if !self.visitor.should_visit(parent, &url) {
            tracing::trace!("Not visiting {} as per the visitor's policy", url);
            return Ok(None);
        }

        let candidate = WebUrl::child_of(parent, url, 0, parent.depth.saturating_add(1));
        if !session.admission().allows(&candidate).await {
            tracing::trace!("Not visiting {} as per robots.txt", candidate.as_str());
            return Ok(None);
        }

        let doc_id = session.doc_ids().allocate(candidate.as_str())?;
        Ok(Some(WebUrl { doc_id, ..candidate }))
    }
}

impl<V: PageVisitor + Default> Default for HttpWorker<V> {
    fn default() -> Self {
        Self::new(V::default())
    }
}

#[async_trait]
impl<V: PageVisitor> FetchWorker for HttpWorker<V> {
    type LocalData = WorkerStats;

    fn bind(&mut self, context: WorkerContext) {
        self.context = Some(context);
    }

    async fn run(&self) {
        let Some(ctx) = &self.context else {
            tracing::error!("Worker started without being bound to a session");
            return;
        };
        let session = &ctx.session;

        loop {
            self.idle.store(true, Ordering::SeqCst);
            let batch = match session.frontier().next_urls(BATCH_SIZE).await {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::error!("Crawler {} could not read the frontier: {}", ctx.slot_id(), e);
                    return;
                }
            };
            self.idle.store(false, Ordering::SeqCst);

            if batch.is_empty() {
                return;
            }

            for item in &batch {
                if session.is_shutting_down() {
                    tracing::info!("Crawler {} exiting because of controller shutdown", ctx.slot_id());
                    return;
                }

                if let Err(e) = self.process_page(ctx, item).await {
                    tracing::error!(
                        "Crawler {} failed to process {}: {}",
                        ctx.slot_id(),
                        item.as_str(),
                        e
                    );
                }
                if let Err(e) = session.frontier().set_processed(item) {
                    tracing::error!("Could not mark {} processed: {}", item.as_str(), e);
                }
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst)
    }

    async fn before_exit(&self) {
        self.visitor.on_before_exit();
    }

    fn local_data(&self) -> WorkerStats {
        WorkerStats {
            slot: self.context.as_ref().map(WorkerContext::slot_id).unwrap_or(0),
            pages_visited: self.pages_visited.load(Ordering::Relaxed),
            pages_failed: self.pages_failed.load(Ordering::Relaxed),
            links_scheduled: self.links_scheduled.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::crawler::CrawlController;
    use crate::robots::AllowAll;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct Recorder {
        visited: Arc<Mutex<Vec<String>>>,
    }

    impl PageVisitor for Recorder {
        fn should_visit(&self, _referring: &WebUrl, url: &Url) -> bool {
            !url.path().starts_with("/skip")
        }

        fn visit(&self, page: &Page) {
            self.visited.lock().unwrap().push(page.url.url.path().to_string());
        }
    }

    async fn html(server: &MockServer, p: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html"))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_crawls_links_up_to_max_depth() {
        let server = MockServer::start().await;
        html(&server, "/", r#"<a href="/a">a</a><a href="/skip">s</a><a href="/redirect">r</a>"#).await;
        html(&server, "/a", r#"<a href="/b">b</a><a href="/">home</a>"#).await;
        Mock::given(method("GET"))
            .and(path("/redirect"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/moved"))
            .mount(&server)
            .await;
        html(&server, "/moved", "<p>moved</p>").await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut config = Config::for_tests(dir.path().to_str().unwrap());
        config.crawler.max_depth = Some(1);
        let controller = CrawlController::<HttpWorker<Recorder>>::new(config)
            .unwrap()
            .with_admission_policy(Arc::new(AllowAll));

        let visited = Arc::new(Mutex::new(Vec::new()));
        controller
            .add_seed(&format!("{}/", server.uri()), None, 0)
            .await
            .unwrap();

        let shared = visited.clone();
        let factory = move || -> Result<HttpWorker<Recorder>> {
            Ok(HttpWorker::new(Recorder {
                visited: shared.clone(),
            }))
        };
        tokio::time::timeout(Duration::from_secs(10), controller.start(factory, 2, true))
            .await
            .unwrap()
            .unwrap();

        let mut paths = visited.lock().unwrap().clone();
        paths.sort();
        assert_eq!(paths, vec!["/", "/a", "/moved"]);

        let stats = controller.crawlers_local_data();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].slot, 1);
        assert_eq!(stats[1].slot, 2);
        assert_eq!(stats.iter().map(|s| s.pages_visited).sum::<u64>(), 3);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_counted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = Config::for_tests(dir.path().to_str().unwrap());
        let controller = CrawlController::<HttpWorker<Recorder>>::new(config)
            .unwrap()
            .with_admission_policy(Arc::new(AllowAll));
        controller
            .add_seed(&format!("{}/broken", server.uri()), None, 0)
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(10), controller.start_default(1, true))
            .await
            .unwrap()
            .unwrap();

        let stats = controller.crawlers_local_data();
        assert_eq!(stats[0].pages_failed, 1);
        assert_eq!(stats[0].pages_visited, 0);
    }
}
