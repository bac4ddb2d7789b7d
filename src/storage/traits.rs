//! Storage traits and error types
//!
//! The session orchestrator only talks to the frontier and the document-id
//! store through these traits; the SQLite implementations live next door.

use crate::url::WebUrl;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not create storage folder {path}: {source}")]
    Folder {
        path: String,
        source: std::io::Error,
    },

    #[error("Storage has been closed")]
    Closed,

    #[error("URL {url} is already bound to doc id {existing}, cannot bind it to {requested}")]
    DocIdConflict {
        url: String,
        existing: i64,
        requested: i64,
    },

    #[error("Requested doc id {requested} is not larger than the last assigned id {last}")]
    DocIdNotIncreasing { requested: i64, last: i64 },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable, resumable queue of URLs waiting to be fetched
///
/// Implementations must be safe to use from every worker and from the
/// session orchestrator at the same time.
#[async_trait]
pub trait Frontier: Send + Sync {
    /// Adds a URL to the queue
    fn schedule(&self, url: &WebUrl) -> StorageResult<()>;

    /// Adds several URLs to the queue
    fn schedule_all(&self, urls: &[WebUrl]) -> StorageResult<()> {
        for url in urls {
            self.schedule(url)?;
        }
        Ok(())
    }

    /// Claims up to `max` URLs, waiting while the queue is empty
    ///
    /// Returns an empty batch only once the frontier has been finished.
    async fn next_urls(&self, max: usize) -> StorageResult<Vec<WebUrl>>;

    /// Marks a claimed URL as done
    fn set_processed(&self, url: &WebUrl) -> StorageResult<()>;

    /// Number of queued URLs that no worker has claimed yet
    fn len(&self) -> StorageResult<u64>;

    /// Number of URLs ever accepted by `schedule`
    fn scheduled_count(&self) -> StorageResult<u64>;

    /// Number of URLs ever marked processed
    fn processed_count(&self) -> StorageResult<u64>;

    /// Releases every waiting `next_urls` caller; idempotent
    fn finish(&self);

    fn is_finished(&self) -> bool;

    /// Releases durable resources; only called after `finish`
    fn close(&self) -> StorageResult<()>;
}

/// Maps canonical URLs to monotonically increasing document ids
pub trait DocIdServer: Send + Sync {
    /// Returns the id bound to `url`, if any
    fn lookup(&self, url: &str) -> StorageResult<Option<i64>>;

    /// Returns the id bound to `url`, binding the next free id when unbound
    fn allocate(&self, url: &str) -> StorageResult<i64>;

    /// Binds `url` to a caller-chosen id
    ///
    /// Fails when `url` is bound to a different id, or when `doc_id` is not
    /// larger than every id handed out so far.
    fn register_explicit(&self, url: &str, doc_id: i64) -> StorageResult<()>;

    /// Number of bound URLs
    fn len(&self) -> StorageResult<u64>;

    fn close(&self) -> StorageResult<()>;
}
