//! Bookkeeping of the domains and hosts a crawl was seeded with

use crate::url::split_host;
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};
use url::Url;

/// Domains and hosts the crawl was seeded with
///
/// Append-only. Entries are lower-cased; lookups are case-insensitive.
#[derive(Debug, Default)]
pub struct SeedRegistry {
    inner: RwLock<Entries>,
}

#[derive(Debug, Default)]
struct Entries {
    domains: HashSet<String>,
    hosts: HashSet<String>,
}

impl SeedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the domain and the host (`sub.domain`, or the domain alone)
    /// of a seed URL
    pub fn record(&self, url: &Url) {
        let (sub_domain, domain) = split_host(url);
        let host = if sub_domain.is_empty() {
            domain.clone()
        } else {
            format!("{}.{}", sub_domain, domain)
        };

        let mut entries = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        entries.domains.insert(domain.to_lowercase());
        entries.hosts.insert(host.to_lowercase());
    }

    pub fn has_domain(&self, domain: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .domains
            .contains(&domain.to_lowercase())
    }

    pub fn has_host(&self, host: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .hosts
            .contains(&host.to_lowercase())
    }
}
