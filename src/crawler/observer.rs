//! Hooks for seed admission events

use crate::url::WebUrl;
use crate::UrlError;

/// Receives notable seed admission outcomes
///
/// Every method defaults to doing nothing, so an embedding application only
/// overrides what it cares about. Called from whichever task adds seeds.
pub trait SeedEventObserver: Send + Sync {
    /// The admission policy refused the seed; it was not scheduled
    fn seed_denied_by_robots(&self, _url: &WebUrl) {}

    /// The seed could not be canonicalized
    fn seed_invalid(&self, _url: &str, _error: &UrlError) {}

    /// The seed already had a document id and was not scheduled again
    fn seed_already_seen(&self, _url: &WebUrl) {}
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreSeedEvents;

impl SeedEventObserver for IgnoreSeedEvents {}
