#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Time-boxed cache for external API results stored in `DuckDB`.
//!
//! Directions and nearby-place lookups are slow, rate limited and paid
//! for, while their answers change slowly. [`TtlCache`] memoizes them in a
//! single table that survives process restarts:
//!
//! ```sql
//! key TEXT PRIMARY KEY, value TEXT NOT NULL, updated_at BIGINT NOT NULL
//! ```
//!
//! Every read checks the row's age against the TTL. A stale row is
//! reported as absent and deleted on the spot; if that delete fails the
//! row simply stays behind, since the age check alone gates what readers
//! see. Rows that are never read again are never deleted unless
//! [`TtlCache::purge_expired`] is called.

pub mod paths;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use duckdb::Connection;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Default time-to-live for cached entries (14 days).
pub const DEFAULT_TTL: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Default table name.
pub const DEFAULT_TABLE: &str = "cache";

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// `DuckDB` error.
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    /// I/O error (creating the cache directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be serialized to JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Table name contains characters other than ASCII alphanumerics and `_`.
    #[error("Invalid cache table name: {name:?}")]
    InvalidTable {
        /// The rejected name.
        name: String,
    },

    /// The connection mutex was poisoned by a panicking writer.
    #[error("Cache connection lock poisoned")]
    Poisoned,
}

/// Source of "now" in Unix epoch seconds.
pub type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

/// Persistent key-value cache with per-entry expiry.
///
/// `duckdb::Connection` is `Send` but not `Sync`, so the connection sits
/// behind a `Mutex`. The lock is held for one statement (or one
/// select-then-delete pair) and never across an `.await`, so the cache
/// can be shared between concurrently enriched listings.
pub struct TtlCache {
    conn: Mutex<Connection>,
    table: String,
    ttl_seconds: i64,
    clock: Clock,
}

impl std::fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("table", &self.table)
            .field("ttl_seconds", &self.ttl_seconds)
            .finish_non_exhaustive()
    }
}

impl TtlCache {
    /// Opens (or creates) the cache `DuckDB` file at `path`.
    ///
    /// A zero `ttl` disables expiry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the directory cannot be created, the
    /// connection fails, or the table name is invalid.
    pub fn open(path: &Path, table: &str, ttl: Duration) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            paths::ensure_dir(parent)?;
        }

        let conn = Connection::open(path)?;
        log::debug!("Opened API cache at {}", path.display());
        Self::from_connection(conn, table, ttl)
    }

    /// Opens the cache at the default path with the default table and TTL.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the connection or schema creation fails.
    pub fn open_default() -> Result<Self, CacheError> {
        Self::open(&paths::cache_db_path(), DEFAULT_TABLE, DEFAULT_TTL)
    }

    /// Opens a throwaway in-memory cache.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the connection or schema creation fails.
    pub fn in_memory(ttl: Duration) -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?, DEFAULT_TABLE, ttl)
    }

    fn from_connection(conn: Connection, table: &str, ttl: Duration) -> Result<Self, CacheError> {
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(CacheError::InvalidTable {
                name: table.to_string(),
            });
        }

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at BIGINT NOT NULL
            );"
        ))?;

        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
            ttl_seconds: i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
            clock: Box::new(|| chrono::Utc::now().timestamp()),
        })
    }

    /// Replaces the wall clock, e.g. to simulate the passage of time.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Configured TTL in seconds (`0` = never expires).
    #[must_use]
    pub const fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }

    const fn is_expired(&self, updated_at: i64, now: i64) -> bool {
        self.ttl_seconds > 0 && now.saturating_sub(updated_at) > self.ttl_seconds
    }

    /// Returns the cached value for `key`, or `None` if it is missing,
    /// expired, or unreadable.
    ///
    /// Never fails: storage and decode errors are logged and reported as
    /// a miss.
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.get_raw(key) {
            Ok(raw) => raw?,
            Err(e) => {
                log::warn!("Cache read failed for {key:?}: {e}");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                log::debug!("Cached value for {key:?} does not decode, ignoring: {e}");
                None
            }
        }
    }

    /// Returns the raw JSON text stored for `key` if present and fresh.
    ///
    /// An expired row is deleted before returning `None`. Failure of that
    /// delete is logged and swallowed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the select fails.
    pub fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = (self.clock)();
        let conn = self.lock()?;

        let row = {
            let mut stmt = conn.prepare(&format!(
                "SELECT value, updated_at FROM {} WHERE key = ?",
                self.table
            ))?;
            let mut rows = stmt.query(duckdb::params![key])?;
            let row = match rows.next()? {
                Some(row) => Some((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                None => None,
            };
            row
        };

        let Some((value, updated_at)) = row else {
            log::trace!("Cache miss: {key}");
            return Ok(None);
        };

        if self.is_expired(updated_at, now) {
            log::debug!("Cache entry expired: {key}");
            if let Err(e) = conn.execute(
                &format!("DELETE FROM {} WHERE key = ?", self.table),
                duckdb::params![key],
            ) {
                log::debug!("Failed to delete expired cache entry {key:?}: {e}");
            }
            return Ok(None);
        }

        log::trace!("Cache hit: {key}");
        Ok(Some(value))
    }

    /// Stores `value` under `key`, replacing any previous entry and
    /// resetting its age.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if serialization or the upsert fails.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let json = serde_json::to_string(value)?;
        let now = (self.clock)();
        let conn = self.lock()?;

        conn.execute(
            &format!(
                "INSERT INTO {} (key, value, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT (key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at",
                self.table
            ),
            duckdb::params![key, json, now],
        )?;

        Ok(())
    }

    /// Physically deletes every expired row. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the delete fails.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        if self.ttl_seconds == 0 {
            return Ok(0);
        }

        let cutoff = (self.clock)().saturating_sub(self.ttl_seconds);
        let conn = self.lock()?;
        let removed = conn.execute(
            &format!("DELETE FROM {} WHERE updated_at < ?", self.table),
            duckdb::params![cutoff],
        )?;

        log::info!("Purged {removed} expired cache entries");
        Ok(removed)
    }

    /// Number of rows in the table, expired ones included.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the count query fails.
    pub fn len(&self) -> Result<usize, CacheError> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| {
                row.get(0)
            })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Returns `true` if the table has no rows.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the count query fails.
    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}
