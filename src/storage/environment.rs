//! Shared durable environment
//!
//! One SQLite database under `<storage-folder>/frontier`, opened once per
//! session and shared by the frontier and the document-id server. It is
//! closed exactly once, at the very end of the termination sequence.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{StorageError, StorageResult};
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

const DATABASE_FILE: &str = "tidepool.db";

/// Directory-backed storage handle shared by the crawl collaborators
pub struct Environment {
    home: PathBuf,
    resumable: bool,
    conn: Mutex<Option<Connection>>,
}

impl Environment {
    /// Opens (creating if needed) the environment under `storage_folder`
    ///
    /// When `resumable` is false the previous contents of the frontier folder
    /// are deleted first and the database runs without a journal. When it is
    /// true the database is opened in WAL mode with full syncs so that an
    /// interrupted crawl can pick up where it stopped.
    pub fn open(storage_folder: &Path, resumable: bool) -> StorageResult<Self> {
        create_folder(storage_folder)?;

        let home = storage_folder.join("frontier");
        create_folder(&home)?;

        if !resumable {
            delete_folder_contents(&home)?;
            tracing::info!(
                "Deleted contents of {} (resumable crawling is disabled)",
                home.display()
            );
        }

        let conn = Connection::open(home.join(DATABASE_FILE))?;
        if resumable {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = FULL;
                PRAGMA locking_mode = EXCLUSIVE;
            ",
            )?;
        } else {
            conn.execute_batch(
                "
                PRAGMA journal_mode = OFF;
                PRAGMA synchronous = OFF;
                PRAGMA temp_store = MEMORY;
            ",
            )?;
        }

        initialize_schema(&conn)?;

        Ok(Self {
            home,
            resumable,
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Folder holding the database files
    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn is_resumable(&self) -> bool {
        self.resumable
    }

    /// Runs `f` with exclusive access to the connection
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(conn) => f(conn),
            None => Err(StorageError::Closed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Closes the database; later calls are no-ops
    pub fn close(&self) -> StorageResult<()> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| StorageError::Sqlite(e))?;
            tracing::debug!("Closed crawl environment at {}", self.home.display());
        }
        Ok(())
    }
}

fn create_folder(path: &Path) -> StorageResult<()> {
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|source| StorageError::Folder {
        path: path.display().to_string(),
        source,
    })?;
    tracing::debug!("Created folder: {}", path.display());
    Ok(())
}

fn delete_folder_contents(path: &Path) -> StorageResult<()> {
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}
