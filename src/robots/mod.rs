//! Robots.txt handling module
//!
//! This module provides the admission seam used for seeds and discovered
//! links, plus the robots.txt implementation of it: fetching, parsing and
//! caching robots.txt files per origin.

mod cache;
mod parser;
mod server;

pub use cache::CachedRobots;
pub use parser::RobotRules;
pub use server::RobotstxtServer;

use crate::url::WebUrl;
use async_trait::async_trait;

/// Decides whether a URL may be crawled
///
/// Implementations are called concurrently by the session and by every
/// worker.
#[async_trait]
pub trait AdmissionPolicy: Send + Sync {
    async fn allows(&self, url: &WebUrl) -> bool;
}

/// Admission policy that admits every URL
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl AdmissionPolicy for AllowAll {
    async fn allows(&self, _url: &WebUrl) -> bool {
        true
    }
}
