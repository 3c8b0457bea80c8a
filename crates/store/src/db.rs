//! Shared SQLite connection handle.
//!
//! One connection guarded by an async mutex serves the whole process;
//! store methods take the lock, run their statements synchronously, and
//! release. Transactions use `BEGIN IMMEDIATE` where the callers need
//! write atomicity (turn numbering, pending-confirmation transitions).

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;

use quill_domain::error::{Error, Result};

use crate::schema::SCHEMA;

#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(store_err)?;
        Self::init(conn, Some(path))
    }

    /// Throwaway in-memory database, used by tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<&Path>) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")
            .map_err(store_err)?;
        conn.execute_batch(SCHEMA).map_err(store_err)?;
        if let Some(p) = path {
            tracing::info!(path = %p.display(), "database opened");
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection under the lock.
    pub async fn with<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T>,
    {
        let mut conn = self.conn.lock().await;
        f(&mut conn).map_err(store_err)
    }
}

pub(crate) fn store_err(e: rusqlite::Error) -> Error {
    Error::Store(e.to_string())
}

/// `true` for errors worth retrying: lock contention and unique races.
pub(crate) fn is_retryable(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(f, _) => matches!(
            f.code,
            rusqlite::ErrorCode::DatabaseBusy
                | rusqlite::ErrorCode::DatabaseLocked
                | rusqlite::ErrorCode::ConstraintViolation
        ),
        _ => false,
    }
}

/// Current UTC timestamp in RFC 3339, the canonical stored format.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
