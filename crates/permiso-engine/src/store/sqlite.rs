//! Persistent store backend on `SQLite`.
//!
//! One `kv` table holds every namespaced blob with its absolute expiry.
//! Expiry is enforced on read (expired rows behave as absent and are
//! removed lazily); [`SqliteStore::sweep`] clears the backlog in bulk.
//! The create-if-absent primitive leans on `INSERT OR IGNORE`, which is
//! atomic under `SQLite`'s connection serialization.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{KvStore, StoreError};

/// `SQLite`-backed [`KvStore`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) a store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the database cannot be opened or the
    /// schema cannot be created.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(StoreError::backend)?;
        Self::from_connection(conn)
    }

    /// Opens a private in-memory database. Useful for tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::backend)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(StoreError::backend)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key        TEXT PRIMARY KEY,
                value      BLOB NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            [],
        )
        .map_err(StoreError::backend)?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_kv_expires_at ON kv (expires_at)",
            [],
        )
        .map_err(StoreError::backend)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }

    #[allow(clippy::cast_possible_wrap)] // TTLs are single-digit days
    fn expiry(ttl: Duration) -> i64 {
        Self::now_millis() + ttl.as_millis() as i64
    }

    /// Removes every expired row. Intended for a periodic maintenance task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    pub fn sweep(&self) -> Result<usize, StoreError> {
        let conn = self.lock();
        let removed = conn
            .execute("DELETE FROM kv WHERE expires_at <= ?1", params![Self::now_millis()])
            .map_err(StoreError::backend)?;
        if removed > 0 {
            debug!(removed, "swept expired rows");
        }
        Ok(removed)
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.lock();
        let row: Option<(Vec<u8>, i64)> = conn
            .query_row(
                "SELECT value, expires_at FROM kv WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(StoreError::backend)?;
        match row {
            Some((value, expires_at)) if expires_at > Self::now_millis() => Ok(Some(value)),
            Some(_) => {
                conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
                    .map_err(StoreError::backend)?;
                Ok(None)
            },
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 expires_at = excluded.expires_at",
            params![key, value, Self::expiry(ttl)],
        )
        .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let conn = self.lock();
        let now = Self::now_millis();
        let removed = conn
            .execute(
                "DELETE FROM kv WHERE key = ?1 AND expires_at > ?2",
                params![key, now],
            )
            .map_err(StoreError::backend)?;
        // Also clear an expired leftover, without reporting it as live.
        conn.execute(
            "DELETE FROM kv WHERE key = ?1 AND expires_at <= ?2",
            params![key, now],
        )
        .map_err(StoreError::backend)?;
        Ok(removed > 0)
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let conn = self.lock();
        // An expired row must not block creation.
        conn.execute(
            "DELETE FROM kv WHERE key = ?1 AND expires_at <= ?2",
            params![key, Self::now_millis()],
        )
        .map_err(StoreError::backend)?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)",
                params![key, value, Self::expiry(ttl)],
            )
            .map_err(StoreError::backend)?;
        Ok(inserted == 1)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.query_row("SELECT 1", [], |_| Ok(()))
            .map_err(|err| StoreError::Unavailable {
                reason: err.to_string(),
            })
    }
}
