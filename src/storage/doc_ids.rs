//! SQLite-backed document-id server

use crate::storage::environment::Environment;
use crate::storage::traits::{DocIdServer, StorageError, StorageResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Document-id store sharing the crawl environment with the frontier
///
/// Ids start at 1 and only ever grow; an id, once bound to a URL, is never
/// reassigned.
pub struct SqliteDocIdServer {
    env: Arc<Environment>,
    closed: AtomicBool,
}

impl SqliteDocIdServer {
    pub fn open(env: Arc<Environment>) -> StorageResult<Self> {
        let server = Self {
            env,
            closed: AtomicBool::new(false),
        };
        tracing::debug!("Doc id server opened with {} known URLs", server.len()?);
        Ok(server)
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

impl DocIdServer for SqliteDocIdServer {
    fn lookup(&self, url: &str) -> StorageResult<Option<i64>> {
        self.ensure_open()?;
        self.env.with_connection(|conn| lookup_in(conn, url))
    }

    fn allocate(&self, url: &str) -> StorageResult<i64> {
        self.ensure_open()?;
        self.env.with_connection(|conn| {
            let tx = conn.transaction()?;
            if let Some(existing) = lookup_in(&tx, url)? {
                return Ok(existing);
            }

            let doc_id = last_doc_id(&tx)? + 1;
            tx.execute(
                "INSERT INTO doc_ids (url, doc_id) VALUES (?1, ?2)",
                params![url, doc_id],
            )?;
            tx.commit()?;
            Ok(doc_id)
        })
    }

    fn register_explicit(&self, url: &str, doc_id: i64) -> StorageResult<()> {
        self.ensure_open()?;
        self.env.with_connection(|conn| {
            let tx = conn.transaction()?;

            if let Some(existing) = lookup_in(&tx, url)? {
                if existing == doc_id {
                    return Ok(());
                }
                return Err(StorageError::DocIdConflict {
                    url: url.to_string(),
                    existing,
                    requested: doc_id,
                });
            }

            let last = last_doc_id(&tx)?;
            if doc_id <= last {
                return Err(StorageError::DocIdNotIncreasing {
                    requested: doc_id,
                    last,
                });
            }

            tx.execute(
                "INSERT INTO doc_ids (url, doc_id) VALUES (?1, ?2)",
                params![url, doc_id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    fn len(&self) -> StorageResult<u64> {
        self.env.with_connection(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM doc_ids", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    fn close(&self) -> StorageResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Doc id server closed");
        }
        Ok(())
    }
}

fn lookup_in(conn: &Connection, url: &str) -> StorageResult<Option<i64>> {
    let doc_id = conn
        .query_row(
            "SELECT doc_id FROM doc_ids WHERE url = ?1",
            params![url],
            |row| row.get(0),
        )
        .optional()?;
    Ok(doc_id)
}

fn last_doc_id(conn: &Connection) -> StorageResult<i64> {
    let last: i64 = conn.query_row("SELECT COALESCE(MAX(doc_id), 0) FROM doc_ids", [], |row| {
        row.get(0)
    })?;
    Ok(last)
}
