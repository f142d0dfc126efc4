//! Raw rows of the `cache` table. TTL policy lives in [`crate::cache`].

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{from_millis, to_millis, Store, StoreError};

/// One stored cache row. `data` is the JSON text of the cached value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRow {
    pub key: String,
    pub data: String,
    pub timestamp: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Store {
    pub fn get_cache_entry(&self, key: &str) -> Result<Option<CacheRow>, StoreError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT key, data, timestamp, expires_at FROM cache WHERE key = ?1",
                    [key],
                    |row| {
                        Ok(CacheRow {
                            key: row.get(0)?,
                            data: row.get(1)?,
                            timestamp: from_millis(row.get(2)?),
                            expires_at: from_millis(row.get(3)?),
                        })
                    },
                )
                .optional()?)
        })
    }

    pub fn put_cache_entry(
        &self,
        key: &str,
        data: &str,
        timestamp: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO cache (key, data, timestamp, expires_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                    data = excluded.data, timestamp = excluded.timestamp,
                    expires_at = excluded.expires_at",
                params![key, data, to_millis(timestamp), to_millis(expires_at)],
            )?;
            Ok(())
        })
    }

    pub fn delete_cache_entry(&self, key: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM cache WHERE key = ?1", [key])? > 0))
    }

    /// Delete every entry whose key starts with `prefix`; `None` empties the table.
    pub fn clear_cache_prefix(&self, prefix: Option<&str>) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let removed = match prefix {
                Some(prefix) => conn.execute(
                    "DELETE FROM cache WHERE substr(key, 1, length(?1)) = ?1",
                    [prefix],
                )?,
                None => conn.execute("DELETE FROM cache", [])?,
            };
            Ok(removed)
        })
    }

    /// Delete entries with `expires_at` at or before `now`.
    pub fn delete_expired_cache(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM cache WHERE expires_at <= ?1", [to_millis(now)])?)
        })
    }

    pub fn cache_entry_count(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }
}
