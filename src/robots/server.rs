//! Robots.txt admission policy backed by the session's page fetcher

use crate::config::{RobotsConfig, MAX_ROBOTS_CACHE_HOURS};
use crate::crawler::{FetchOutcome, PageFetcher};
use crate::robots::{AdmissionPolicy, CachedRobots, RobotRules};
use crate::url::WebUrl;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use url::Url;

/// Maximum number of redirects followed when fetching robots.txt
const MAX_ROBOTS_REDIRECTS: usize = 3;

/// Fetches, caches and applies robots.txt rules per origin
pub struct RobotstxtServer {
    enabled: bool,
    user_agent_name: String,
    max_age: chrono::Duration,
    fetcher: Arc<PageFetcher>,
    cache: Mutex<HashMap<String, CachedRobots>>,
}

impl RobotstxtServer {
    pub fn new(config: &RobotsConfig, fetcher: Arc<PageFetcher>) -> Self {
        Self {
            enabled: config.enabled,
            user_agent_name: config.user_agent_name.clone(),
            max_age: chrono::Duration::hours(config.cache_hours.clamp(0, MAX_ROBOTS_CACHE_HOURS)),
            fetcher,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Checks `url` against the robots.txt of its origin
    pub async fn allows_url(&self, url: &Url) -> bool {
        if !self.enabled {
            return true;
        }

        let rules = self.rules_for(url).await;
        rules.allows(url.as_str(), &self.user_agent_name)
    }

    async fn rules_for(&self, url: &Url) -> RobotRules {
        let key = url.origin().ascii_serialization();

        {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = cache.get(&key) {
                if !entry.is_stale(self.max_age) {
                    return entry.rules.clone();
                }
            }
        }

        let rules = self.fetch_rules(url).await;

        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, CachedRobots::new(rules.clone()));

        rules
    }

    async fn fetch_rules(&self, url: &Url) -> RobotRules {
        let mut target = match url.join("/robots.txt") {
            Ok(target) => target,
            Err(_) => return RobotRules::allow_all(),
        };

        for _ in 0..=MAX_ROBOTS_REDIRECTS {
            match self.fetcher.fetch(&target).await {
                Ok(FetchOutcome::Success { body, .. }) => {
                    tracing::debug!("Fetched robots.txt from {}", target);
                    return RobotRules::from_body(&body);
                }
                Ok(FetchOutcome::Redirect {
                    location: Some(location),
                    ..
                }) => match target.join(&location) {
                    Ok(next) => target = next,
                    Err(_) => break,
                },
                Ok(FetchOutcome::Redirect { location: None, .. }) => break,
                Ok(FetchOutcome::HttpError { status_code }) => {
                    tracing::debug!(
                        "robots.txt at {} answered {}, allowing everything",
                        target,
                        status_code
                    );
                    return RobotRules::allow_all();
                }
                Ok(FetchOutcome::NetworkError { error }) => {
                    tracing::debug!("Could not fetch robots.txt at {}: {}", target, error);
                    return RobotRules::allow_all();
                }
                Err(e) => {
                    tracing::debug!("Could not fetch robots.txt at {}: {}", target, e);
                    return RobotRules::allow_all();
                }
            }
        }

        RobotRules::allow_all()
    }
}

#[async_trait]
impl AdmissionPolicy for RobotstxtServer {
    async fn allows(&self, url: &WebUrl) -> bool {
        self.allows_url(&url.url).await
    }
}
