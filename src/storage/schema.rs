//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the crawl environment.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Canonical URL to document id mapping
CREATE TABLE IF NOT EXISTS doc_ids (
    url TEXT PRIMARY KEY,
    doc_id INTEGER NOT NULL UNIQUE
);

-- URLs waiting to be claimed by a worker
CREATE TABLE IF NOT EXISTS work_queue (
    doc_id INTEGER PRIMARY KEY,
    url TEXT NOT NULL,
    parent_doc_id INTEGER,
    parent_url TEXT,
    depth INTEGER NOT NULL,
    anchor TEXT,
    priority INTEGER NOT NULL DEFAULT 0,
    queued_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_work_queue_order ON work_queue(priority, depth, doc_id);

-- URLs claimed by a worker but not yet processed; re-queued on resume
CREATE TABLE IF NOT EXISTS in_process (
    doc_id INTEGER PRIMARY KEY,
    url TEXT NOT NULL,
    parent_doc_id INTEGER,
    parent_url TEXT,
    depth INTEGER NOT NULL,
    anchor TEXT,
    priority INTEGER NOT NULL DEFAULT 0,
    queued_at TEXT NOT NULL
);

-- Persistent frontier counters
CREATE TABLE IF NOT EXISTS counters (
    name TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
