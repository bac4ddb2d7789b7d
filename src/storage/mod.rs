//! Storage module for the durable crawl state
//!
//! This module handles all database operations for a crawl session:
//! - The shared environment under `<storage-folder>/frontier`
//! - The frontier queue with resumable in-process tracking
//! - The canonical URL to document id mapping

mod doc_ids;
mod environment;
mod frontier;
mod schema;
mod traits;

pub use doc_ids::SqliteDocIdServer;
pub use environment::Environment;
pub use frontier::SqliteFrontier;
pub use traits::{DocIdServer, Frontier, StorageError, StorageResult};

use std::path::Path;
use std::sync::Arc;

/// The three durable collaborators of a session, opened together
pub struct CrawlStore {
    pub env: Arc<Environment>,
    pub frontier: Arc<SqliteFrontier>,
    pub doc_ids: Arc<SqliteDocIdServer>,
}

/// Opens the environment, the document-id server and the frontier
///
/// # Arguments
///
/// * `storage_folder` - Root folder of the crawl state
/// * `resumable` - Keep the state of a previous session instead of wiping it
/// * `max_pages_to_fetch` - Upper bound on URLs the frontier will accept
pub fn open_store(
    storage_folder: &Path,
    resumable: bool,
    max_pages_to_fetch: Option<u64>,
) -> StorageResult<CrawlStore> {
    let env = Arc::new(Environment::open(storage_folder, resumable)?);
    let doc_ids = Arc::new(SqliteDocIdServer::open(env.clone())?);
    let frontier = Arc::new(SqliteFrontier::open(env.clone(), max_pages_to_fetch)?);

    Ok(CrawlStore {
        env,
        frontier,
        doc_ids,
    })
}
