//! SQLite-backed frontier
//!
//! Queued URLs live in `work_queue`. A batch handed to a worker is moved to
//! `in_process` in the same transaction, and only leaves it once the worker
//! marks it processed. Opening a resumable environment moves anything still
//! in `in_process` back to the queue.
//!
//! The scheduled/processed counters are persisted alongside the queue and
//! mirrored in memory, so they stay readable after the environment closes.

use crate::storage::environment::Environment;
use crate::storage::traits::{Frontier, StorageError, StorageResult};
use crate::url::WebUrl;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use url::Url;

const SCHEDULED: &str = "scheduled";
const PROCESSED: &str = "processed";

/// Frontier stored in the shared crawl environment
pub struct SqliteFrontier {
    env: Arc<Environment>,
    max_pages_to_fetch: Option<u64>,
    scheduled: AtomicU64,
    processed: AtomicU64,
    finished: AtomicBool,
    closed: AtomicBool,
    available: Notify,
}

impl SqliteFrontier {
    /// Opens the frontier, re-queueing in-flight work from an interrupted run
    pub fn open(env: Arc<Environment>, max_pages_to_fetch: Option<u64>) -> StorageResult<Self> {
        if env.is_resumable() {
            let requeued = env.with_connection(|conn| {
                let tx = conn.transaction()?;
                let moved = tx.execute(
                    "INSERT OR IGNORE INTO work_queue SELECT * FROM in_process",
                    [],
                )?;
                tx.execute("DELETE FROM in_process", [])?;
                tx.commit()?;
                Ok(moved)
            })?;

            if requeued > 0 {
                tracing::info!(
                    "Re-queued {} URLs left in process by a previous session",
                    requeued
                );
            }
        }

        let (scheduled, processed) = env.with_connection(|conn| {
            Ok((read_counter(conn, SCHEDULED)?, read_counter(conn, PROCESSED)?))
        })?;

        let frontier = Self {
            env,
            max_pages_to_fetch,
            scheduled: AtomicU64::new(scheduled),
            processed: AtomicU64::new(processed),
            finished: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            available: Notify::new(),
        };

        tracing::debug!(
            "Frontier opened: {} queued, {} scheduled so far, {} processed so far",
            frontier.len()?,
            frontier.scheduled_count()?,
            frontier.processed_count()?
        );

        Ok(frontier)
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }

    fn claim(&self, max: usize) -> StorageResult<Vec<WebUrl>> {
        self.env.with_connection(|conn| {
            let tx = conn.transaction()?;
            let batch = {
                let mut stmt = tx.prepare(
                    "SELECT doc_id, url, parent_doc_id, parent_url, depth, anchor, priority
                     FROM work_queue
                     ORDER BY priority, depth, doc_id
                     LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![max as i64], row_to_web_url)?;
                rows.collect::<Result<Vec<_>, _>>()?
            };

            for item in &batch {
                tx.execute(
                    "INSERT OR REPLACE INTO in_process SELECT * FROM work_queue WHERE doc_id = ?1",
                    params![item.doc_id],
                )?;
                tx.execute(
                    "DELETE FROM work_queue WHERE doc_id = ?1",
                    params![item.doc_id],
                )?;
            }

            tx.commit()?;
            Ok(batch)
        })
    }
}

#[async_trait]
impl Frontier for SqliteFrontier {
    fn schedule(&self, url: &WebUrl) -> StorageResult<()> {
        self.ensure_open()?;

        let inserted = self.env.with_connection(|conn| {
            if let Some(max) = self.max_pages_to_fetch {
                if self.scheduled.load(Ordering::SeqCst) >= max {
                    tracing::debug!(
                        "Not scheduling {}: reached the limit of {} pages",
                        url.as_str(),
                        max
                    );
                    return Ok(false);
                }
            }

            let tx = conn.transaction()?;
            let changed = tx.execute(
                "INSERT OR IGNORE INTO work_queue
                 (doc_id, url, parent_doc_id, parent_url, depth, anchor, priority, queued_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    url.doc_id,
                    url.as_str(),
                    url.parent_doc_id,
                    url.parent_url,
                    url.depth,
                    url.anchor,
                    url.priority,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            if changed == 1 {
                bump_counter(&tx, SCHEDULED)?;
            }
            tx.commit()?;
            if changed == 1 {
                self.scheduled.fetch_add(1, Ordering::SeqCst);
            }
            Ok(changed == 1)
        })?;

        if inserted {
            self.available.notify_waiters();
        }
        Ok(())
    }

    async fn next_urls(&self, max: usize) -> StorageResult<Vec<WebUrl>> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before checking so a schedule() in between is not missed
            notified.as_mut().enable();

            if self.is_finished() {
                return Ok(Vec::new());
            }
            self.ensure_open()?;

            let batch = self.claim(max)?;
            if !batch.is_empty() {
                return Ok(batch);
            }

            notified.await;
        }
    }

    fn set_processed(&self, url: &WebUrl) -> StorageResult<()> {
        self.ensure_open()?;

        self.env.with_connection(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM in_process WHERE doc_id = ?1",
                params![url.doc_id],
            )?;
            if removed == 1 {
                bump_counter(&tx, PROCESSED)?;
                self.processed.fetch_add(1, Ordering::SeqCst);
            } else {
                tracing::warn!(
                    "Marked {} processed but it was not in process",
                    url.as_str()
                );
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn len(&self) -> StorageResult<u64> {
        self.env.with_connection(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM work_queue", [], |row| {
                row.get(0)
            })?;
            Ok(count as u64)
        })
    }

    fn scheduled_count(&self) -> StorageResult<u64> {
        Ok(self.scheduled.load(Ordering::SeqCst))
    }

    fn processed_count(&self) -> StorageResult<u64> {
        Ok(self.processed.load(Ordering::SeqCst))
    }

    fn finish(&self) {
        if !self.finished.swap(true, Ordering::SeqCst) {
            tracing::debug!("Frontier finished");
        }
        self.available.notify_waiters();
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn close(&self) -> StorageResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Frontier closed");
        }
        Ok(())
    }
}

fn row_to_web_url(row: &Row<'_>) -> rusqlite::Result<WebUrl> {
    let raw: String = row.get(1)?;
    let url = Url::parse(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

    Ok(WebUrl {
        url,
        doc_id: row.get(0)?,
        parent_doc_id: row.get(2)?,
        parent_url: row.get(3)?,
        depth: row.get(4)?,
        anchor: row.get(5)?,
        priority: row.get(6)?,
    })
}

fn read_counter(conn: &Connection, name: &str) -> StorageResult<u64> {
    let value: Option<i64> = conn
        .query_row(
            "SELECT value FROM counters WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.unwrap_or(0) as u64)
}

fn bump_counter(conn: &Connection, name: &str) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO counters (name, value) VALUES (?1, 1)
         ON CONFLICT(name) DO UPDATE SET value = value + 1",
        params![name],
    )?;
    Ok(())
}
