//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for a crawl session, including:
//! - Building the HTTP client with the configured user agent and timeouts
//! - The politeness delay shared by every worker
//! - Manual redirect reporting
//! - Error classification
//! - Refusing work once the session shuts the fetcher down

use crate::config::Config;
use crate::{Result, TidepoolError};
use reqwest::{header, redirect::Policy, Client};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchOutcome {
    /// Successfully fetched the page
    Success {
        /// URL the response was served from
        final_url: Url,
        /// HTTP status code
        status_code: u16,
        /// Content-Type header value
        content_type: String,
        /// Page body, cut at the configured download size
        body: String,
    },

    /// The server answered with a redirect
    Redirect {
        status_code: u16,
        /// Location header value, if present
        location: Option<String>,
    },

    /// Non-success HTTP status
    HttpError { status_code: u16 },

    /// Network error (connection refused, timeout, etc.)
    NetworkError { error: String },
}

impl FetchOutcome {
    /// Whether this is a successful response with an HTML body
    pub fn is_html(&self) -> bool {
        matches!(self, Self::Success { content_type, .. } if content_type.contains("text/html"))
    }
}

/// HTTP transport shared by every worker of a session
pub struct PageFetcher {
    client: Client,
    politeness_delay: Duration,
    max_download_size: usize,
    last_fetch: Mutex<Option<Instant>>,
    shut_down: AtomicBool,
}

impl PageFetcher {
    /// Builds the fetcher from the crawl configuration
    pub fn new(config: &Config) -> std::result::Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            politeness_delay: Duration::from_millis(config.crawler.politeness_delay),
            max_download_size: config.crawler.max_download_size,
            last_fetch: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Fetches a URL, waiting out the politeness delay first
    ///
    /// Redirects are reported, not followed. Returns
    /// `TidepoolError::FetcherShutDown` once [`PageFetcher::shut_down`] has
    /// been called.
    pub async fn fetch(&self, url: &Url) -> Result<FetchOutcome> {
        if self.is_shut_down() {
            return Err(TidepoolError::FetcherShutDown);
        }

        self.wait_for_turn().await;

        if self.is_shut_down() {
            return Err(TidepoolError::FetcherShutDown);
        }

        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => return Ok(classify_error(&e)),
        };

        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return Ok(FetchOutcome::Redirect {
                status_code: status.as_u16(),
                location,
            });
        }

        if !status.is_success() {
            return Ok(FetchOutcome::HttpError {
                status_code: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        match self.read_body(response).await {
            Ok(body) => Ok(FetchOutcome::Success {
                final_url,
                status_code: status.as_u16(),
                content_type,
                body,
            }),
            Err(e) => Ok(classify_error(&e)),
        }
    }

    /// Makes every later fetch fail; idempotent
    pub fn shut_down(&self) {
        if !self.shut_down.swap(true, Ordering::SeqCst) {
            tracing::debug!("Page fetcher shut down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    async fn wait_for_turn(&self) {
        let mut last_fetch = self.last_fetch.lock().await;
        if let Some(last) = *last_fetch {
            let elapsed = last.elapsed();
            if elapsed < self.politeness_delay {
                tokio::time::sleep(self.politeness_delay - elapsed).await;
            }
        }
        *last_fetch = Some(Instant::now());
    }

    async fn read_body(
        &self,
        mut response: reqwest::Response,
    ) -> std::result::Result<String, reqwest::Error> {
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let room = self.max_download_size.saturating_sub(body.len());
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                tracing::debug!(
                    "Truncated response from {} at {} bytes",
                    response.url(),
                    self.max_download_size
                );
                break;
            }
            body.extend_from_slice(&chunk);
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The crawl configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &Config) -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.header_value())
        .timeout(Duration::from_millis(config.crawler.socket_timeout))
        .connect_timeout(Duration::from_millis(config.crawler.connection_timeout))
        .redirect(Policy::none()) // Handle redirects manually
        .gzip(true)
        .brotli(true)
        .build()
}

fn classify_error(e: &reqwest::Error) -> FetchOutcome {
    let error = if e.is_timeout() {
        "Request timeout".to_string()
    } else if e.is_connect() {
        "Connection refused".to_string()
    } else {
        e.to_string()
    };
    FetchOutcome::NetworkError { error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher_with(politeness_delay: u64, max_download_size: usize) -> PageFetcher {
        let mut config = Config::for_tests("./unused");
        config.crawler.politeness_delay = politeness_delay;
        config.crawler.max_download_size = max_download_size;
        PageFetcher::new(&config).unwrap()
    }

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[test]
    fn test_build_http_client() {
        let config = Config::for_tests("./unused");
        assert!(build_http_client(&config).is_ok());
    }

    #[tokio::test]
    async fn test_fetch_html_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<html><body>hi</body></html>", "text/html"),
            )
            .mount(&server)
            .await;

        let outcome = fetcher_with(0, 1024)
            .fetch(&url(&server, "/page"))
            .await
            .unwrap();

        assert!(outcome.is_html());
        match outcome {
            FetchOutcome::Success {
                status_code, body, ..
            } => {
                assert_eq!(status_code, 200);
                assert!(body.contains("hi"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_reports_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let outcome = fetcher_with(0, 1024)
            .fetch(&url(&server, "/missing"))
            .await
            .unwrap();

        assert!(matches!(outcome, FetchOutcome::HttpError { status_code: 404 }));
    }

    #[tokio::test]
    async fn test_fetch_reports_redirect_without_following() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
            .mount(&server)
            .await;

        let outcome = fetcher_with(0, 1024)
            .fetch(&url(&server, "/old"))
            .await
            .unwrap();

        match outcome {
            FetchOutcome::Redirect {
                status_code,
                location,
            } => {
                assert_eq!(status_code, 301);
                assert_eq!(location.as_deref(), Some("/new"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_body_is_capped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("x".repeat(5000), "text/plain"))
            .mount(&server)
            .await;

        let outcome = fetcher_with(0, 100)
            .fetch(&url(&server, "/big"))
            .await
            .unwrap();

        match outcome {
            FetchOutcome::Success { body, .. } => assert_eq!(body.len(), 100),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let fetcher = fetcher_with(0, 1024);
        let outcome = fetcher
            .fetch(&Url::parse("http://127.0.0.1:1/").unwrap())
            .await
            .unwrap();

        assert!(matches!(outcome, FetchOutcome::NetworkError { .. }));
    }

    #[tokio::test]
    async fn test_politeness_delay_between_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let fetcher = fetcher_with(150, 1024);
        let start = std::time::Instant::now();
        fetcher.fetch(&url(&server, "/a")).await.unwrap();
        fetcher.fetch(&url(&server, "/b")).await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_shut_down_fetcher_refuses_work() {
        let fetcher = fetcher_with(0, 1024);

        fetcher.shut_down();
        fetcher.shut_down();

        let result = fetcher.fetch(&Url::parse("http://a.test/").unwrap()).await;
        assert!(matches!(result, Err(TidepoolError::FetcherShutDown)));
    }
}
