//! `SQLite` ledger.
//!
//! One table keyed by `(resource, created_at, snapshot_id)` with
//! `created_at` stored as minute-truncated Unix seconds. Access goes through
//! a `Mutex<Connection>`; WAL mode and a busy timeout let an operator read
//! the ledger while a run writes to it.

use super::{LedgerEntry, SnapshotLedger, record_operation_metrics};
use crate::locks::acquire_lock;
use crate::models::{SnapshotId, VolumeId};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS snapshot_ledger (
        resource     TEXT    NOT NULL,
        created_at   INTEGER NOT NULL,
        snapshot_id  TEXT    NOT NULL,
        recorded_at  INTEGER NOT NULL,
        PRIMARY KEY (resource, created_at, snapshot_id)
    );
    CREATE INDEX IF NOT EXISTS idx_snapshot_ledger_created_at
        ON snapshot_ledger (created_at);
";

/// Ledger stored in a `SQLite` database.
#[derive(Clone)]
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteLedger {
    /// Opens (creating if needed) a ledger database at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::Ledger {
                operation: "create_ledger_dir".to_string(),
                cause: format!("{}: {e}", parent.display()),
            })?;
        }
        let conn = Connection::open(path).map_err(|e| Error::Ledger {
            operation: "open".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        configure_connection(&conn);
        Self::initialize(conn, Some(path.to_path_buf()))
    }

    /// Opens a private in-memory ledger.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::ledger("open", e))?;
        Self::initialize(conn, None)
    }

    fn initialize(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::ledger("initialize_schema", e))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Returns the database path, or `None` for an in-memory ledger.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the number of recorded snapshots.
    pub fn count(&self) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM snapshot_ledger", [], |row| row.get(0))
            .map_err(|e| Error::ledger("count", e))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn store_blocking(conn: &Mutex<Connection>, entry: &LedgerEntry) -> Result<()> {
        let conn = acquire_lock(conn);
        conn.execute(
            "INSERT OR IGNORE INTO snapshot_ledger (resource, created_at, snapshot_id, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.resource().as_str(),
                entry.created_at().timestamp(),
                entry.snapshot_id().as_str(),
                Utc::now().timestamp(),
            ],
        )
        .map_err(|e| Error::ledger("store", e))?;
        Ok(())
    }

    fn delete_blocking(conn: &Mutex<Connection>, entry: &LedgerEntry) -> Result<bool> {
        let conn = acquire_lock(conn);
        let removed = conn
            .execute(
                "DELETE FROM snapshot_ledger
                 WHERE resource = ?1 AND created_at = ?2 AND snapshot_id = ?3",
                params![
                    entry.resource().as_str(),
                    entry.created_at().timestamp(),
                    entry.snapshot_id().as_str(),
                ],
            )
            .map_err(|e| Error::ledger("delete", e))?;
        Ok(removed > 0)
    }

    fn list_blocking(conn: &Mutex<Connection>, limit: usize) -> Result<Vec<LedgerEntry>> {
        let conn = acquire_lock(conn);
        let mut stmt = conn
            .prepare(
                "SELECT resource, created_at, snapshot_id FROM snapshot_ledger
                 ORDER BY created_at DESC, resource, snapshot_id
                 LIMIT ?1",
            )
            .map_err(|e| Error::ledger("list", e))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| Error::ledger("list", e))?;

        let mut entries = Vec::new();
        for row in rows {
            let (resource, created_at, snapshot_id) = row.map_err(|e| Error::ledger("list", e))?;
            entries.push(LedgerEntry::new(
                VolumeId::new(resource),
                SnapshotId::new(snapshot_id),
                from_unix_seconds(created_at)?,
            ));
        }
        Ok(entries)
    }

    /// Runs `op` on the blocking pool so `SQLite` I/O never stalls the runtime.
    async fn run_blocking<T, F>(&self, operation: &'static str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Mutex<Connection>) -> Result<T> + Send + 'static,
    {
        let start = Instant::now();
        let conn = Arc::clone(&self.conn);
        let result = tokio::task::spawn_blocking(move || op(&conn))
            .await
            .map_err(|e| Error::ledger(operation, e))
            .and_then(|inner| inner);
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("sqlite", operation, start, status);
        result
    }
}

#[async_trait]
impl SnapshotLedger for SqliteLedger {
    async fn store(&self, entry: &LedgerEntry) -> Result<()> {
        let entry = entry.clone();
        self.run_blocking("store", move |conn| Self::store_blocking(conn, &entry))
            .await
    }

    async fn delete(&self, entry: &LedgerEntry) -> Result<bool> {
        let entry = entry.clone();
        self.run_blocking("delete", move |conn| Self::delete_blocking(conn, &entry))
            .await
    }

    async fn list(&self, limit: usize) -> Result<Vec<LedgerEntry>> {
        self.run_blocking("list", move |conn| Self::list_blocking(conn, limit))
            .await
    }
}

/// Applies WAL journaling, NORMAL sync and a 5 second busy timeout.
///
/// Pragma failures are ignored: the ledger still works with `SQLite`'s
/// defaults.
fn configure_connection(conn: &Connection) {
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
}

fn from_unix_seconds(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| Error::ledger("list", format!("invalid created_at {secs}")))
}
