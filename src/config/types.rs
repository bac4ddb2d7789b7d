use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Tidepool
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub robots: RobotsConfig,
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub seeds: Vec<SeedEntry>,
    #[serde(default)]
    pub seen_urls: Vec<SeenUrlEntry>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Folder holding the durable crawl state (frontier, document ids)
    pub storage_folder: String,

    /// Number of concurrent fetch workers
    #[serde(default = "default_number_of_crawlers")]
    pub number_of_crawlers: usize,

    /// Maximum depth to crawl from seed URLs (absent means unlimited)
    #[serde(default)]
    pub max_depth: Option<u16>,

    /// Maximum number of pages scheduled over the life of the crawl
    #[serde(default)]
    pub max_pages_to_fetch: Option<u64>,

    /// Maximum number of outgoing links followed from a single page
    #[serde(default = "default_max_outgoing_links")]
    pub max_outgoing_links: usize,

    /// Keep the frontier between runs so an interrupted crawl can resume
    #[serde(default)]
    pub resumable_crawling: bool,

    /// Minimum time between two requests (milliseconds)
    #[serde(default = "default_politeness_delay")]
    pub politeness_delay: u64,

    /// Whether https pages are crawled
    #[serde(default = "default_true")]
    pub include_https: bool,

    /// Whether redirect targets are scheduled
    #[serde(default = "default_true")]
    pub follow_redirects: bool,

    /// Maximum response body size in bytes
    #[serde(default = "default_max_download_size")]
    pub max_download_size: usize,

    /// Connection timeout (milliseconds)
    #[serde(default = "default_timeout")]
    pub connection_timeout: u64,

    /// Whole-request timeout (milliseconds)
    #[serde(default = "default_timeout")]
    pub socket_timeout: u64,
}

/// Timing of the session monitor
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SessionConfig {
    /// Interval between two monitor passes (milliseconds)
    #[serde(default = "default_session_delay")]
    pub monitoring_delay: u64,

    /// Wait before each quiescence re-check (milliseconds)
    #[serde(default = "default_session_delay")]
    pub shutdown_delay: u64,

    /// Grace period before collaborators are closed (milliseconds)
    #[serde(default = "default_session_delay")]
    pub cleanup_delay: u64,

    /// Finish the session on its own once the frontier is exhausted
    #[serde(default = "default_true")]
    pub shutdown_on_empty_queue: bool,
}

/// Robots.txt handling configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RobotsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// User agent token matched against robots.txt groups
    #[serde(default = "default_robots_agent")]
    pub user_agent_name: String,

    /// Hours before a cached robots.txt is fetched again
    #[serde(default = "default_cache_hours")]
    pub cache_hours: i64,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    /// Email address for crawler-related contact
    pub contact_email: String,
}

/// A seed URL, optionally pinned to a document id from an earlier crawl
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SeedEntry {
    pub url: String,
    #[serde(default)]
    pub doc_id: Option<i64>,
}

/// A URL known from an earlier crawl that must not be fetched again
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SeenUrlEntry {
    pub url: String,
    pub doc_id: i64,
}

impl SessionConfig {
    pub fn monitoring_delay(&self) -> Duration {
        Duration::from_millis(self.monitoring_delay)
    }

    pub fn shutdown_delay(&self) -> Duration {
        Duration::from_millis(self.shutdown_delay)
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.cleanup_delay)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            monitoring_delay: default_session_delay(),
            shutdown_delay: default_session_delay(),
            cleanup_delay: default_session_delay(),
            shutdown_on_empty_queue: true,
        }
    }
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user_agent_name: default_robots_agent(),
            cache_hours: default_cache_hours(),
        }
    }
}

impl UserAgentConfig {
    /// Formats the full user agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

fn default_number_of_crawlers() -> usize {
    4
}

fn default_max_outgoing_links() -> usize {
    5000
}

fn default_politeness_delay() -> u64 {
    200
}

fn default_max_download_size() -> usize {
    1_048_576
}

fn default_timeout() -> u64 {
    20_000
}

fn default_session_delay() -> u64 {
    10_000
}

fn default_robots_agent() -> String {
    "tidepool".to_string()
}

/// Longest robots.txt cache lifetime accepted, ten years
pub const MAX_ROBOTS_CACHE_HOURS: i64 = 24 * 365 * 10;

fn default_cache_hours() -> i64 {
    24
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
impl Config {
    /// Fast, permissive configuration for unit tests
    pub(crate) fn for_tests(storage_folder: &str) -> Self {
        Config {
            crawler: CrawlerConfig {
                storage_folder: storage_folder.to_string(),
                number_of_crawlers: 2,
                max_depth: None,
                max_pages_to_fetch: None,
                max_outgoing_links: 100,
                resumable_crawling: false,
                politeness_delay: 0,
                include_https: true,
                follow_redirects: true,
                max_download_size: 64 * 1024,
                connection_timeout: 2_000,
                socket_timeout: 2_000,
            },
            session: SessionConfig {
                monitoring_delay: 20,
                shutdown_delay: 20,
                cleanup_delay: 0,
                shutdown_on_empty_queue: true,
            },
            robots: RobotsConfig {
                enabled: false,
                ..RobotsConfig::default()
            },
            user_agent: UserAgentConfig {
                crawler_name: "TestCrawler".to_string(),
                crawler_version: "1.0".to_string(),
                contact_url: "https://example.com/about".to_string(),
                contact_email: "admin@example.com".to_string(),
            },
            seeds: vec![],
            seen_urls: vec![],
        }
    }
}
