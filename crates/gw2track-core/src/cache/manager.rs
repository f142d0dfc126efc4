use std::time::Duration;

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::{keys, CacheEntry};
use crate::store::{CacheRow, Store};

/// Longest lifetime a caller can request.
const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// TTL policy over the store's cache table.
///
/// Values are stored as JSON text and decoded to the caller's type on read.
/// Storage failures never reach the caller: reads degrade to a miss and
/// writes or deletes become no-ops, each with a warning.
#[derive(Clone)]
pub struct CacheManager {
    store: Store,
}

impl CacheManager {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Fetch the live row for `key`, lazily deleting it when expired.
    fn live_row(&self, key: &str) -> Option<CacheRow> {
        let row = match self.store.get_cache_entry(key) {
            Ok(row) => row?,
            Err(e) => {
                warn!(key = keys::redacted(key), error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        if row.expires_at <= Utc::now() {
            debug!(key = keys::redacted(key), "Cache entry expired");
            self.delete(key);
            return None;
        }
        Some(row)
    }

    pub fn get_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let row = self.live_row(key)?;
        match serde_json::from_str(&row.data) {
            Ok(data) => Some(CacheEntry {
                key: row.key,
                data,
                timestamp: row.timestamp,
                expires_at: row.expires_at,
            }),
            Err(e) => {
                warn!(key = keys::redacted(key), error = %e, "Discarding undecodable cache entry");
                self.delete(key);
                None
            }
        }
    }

    /// The cached value, if present, unexpired and decodable as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_entry(key).map(|entry| entry.data)
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        let data = match serde_json::to_string(value) {
            Ok(data) => data,
            Err(e) => {
                warn!(key = keys::redacted(key), error = %e, "Failed to encode cache value");
                return;
            }
        };
        let ttl = chrono::Duration::from_std(ttl.min(MAX_TTL))
            .unwrap_or_else(|_| chrono::Duration::zero());
        let now = Utc::now();
        if let Err(e) = self.store.put_cache_entry(key, &data, now, now + ttl) {
            warn!(key = keys::redacted(key), error = %e, "Cache write failed");
        } else {
            debug!(key = keys::redacted(key), ttl_secs = ttl.num_seconds(), "Cached");
        }
    }

    pub fn delete(&self, key: &str) {
        if let Err(e) = self.store.delete_cache_entry(key) {
            warn!(key = keys::redacted(key), error = %e, "Cache delete failed");
        }
    }

    /// Remove entries whose key starts with `prefix`, or everything.
    pub fn clear(&self, prefix: Option<&str>) -> usize {
        match self.store.clear_cache_prefix(prefix) {
            Ok(removed) => removed,
            Err(e) => {
                warn!(prefix = ?prefix, error = %e, "Cache clear failed");
                0
            }
        }
    }

    /// Purge every expired entry.
    pub fn sweep_expired(&self) -> usize {
        match self.store.delete_expired_cache(Utc::now()) {
            Ok(removed) => {
                if removed > 0 {
                    debug!(removed, "Swept expired cache entries");
                }
                removed
            }
            Err(e) => {
                warn!(error = %e, "Cache sweep failed");
                0
            }
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.live_row(key).is_some()
    }

    /// How long ago the live entry was written.
    pub fn age(&self, key: &str) -> Option<Duration> {
        self.live_row(key)
            .map(|row| (Utc::now() - row.timestamp).to_std().unwrap_or_default())
    }

    /// True when the entry is absent or within the last 10% of its TTL.
    pub fn is_stale(&self, key: &str) -> bool {
        match self.live_row(key) {
            Some(row) => super::is_stale(row.timestamp, row.expires_at, Utc::now()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use serde::Deserialize;

    fn manager() -> CacheManager {
        CacheManager::new(Store::open_in_memory().expect("store"))
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Ids {
        ids: Vec<u32>,
    }

    #[test]
    fn test_set_then_get_typed_value() {
        let cache = manager();
        cache.set("maps:ids", &Ids { ids: vec![1, 2, 3] }, Duration::from_secs(60));

        assert_eq!(cache.get::<Ids>("maps:ids"), Some(Ids { ids: vec![1, 2, 3] }));
        assert!(cache.has("maps:ids"));
        assert!(!cache.is_stale("maps:ids"));
        assert!(cache.age("maps:ids").expect("age") < Duration::from_secs(5));
    }

    #[test]
    fn test_expired_entry_is_absent_and_lazily_deleted() {
        let cache = manager();
        let now = Utc::now();
        cache
            .store
            .put_cache_entry("old", "[1]", now - ChronoDuration::minutes(10), now)
            .expect("put");

        assert_eq!(cache.get::<Vec<u32>>("old"), None);
        assert!(cache.store.get_cache_entry("old").expect("row").is_none());
        assert!(cache.is_stale("old"));
        assert!(cache.age("old").is_none());
    }

    #[test]
    fn test_undecodable_entry_is_dropped() {
        let cache = manager();
        cache.set("k", &"not a list", Duration::from_secs(60));

        assert_eq!(cache.get::<Vec<u32>>("k"), None);
        assert!(!cache.has("k"));
    }

    #[test]
    fn test_is_stale_near_expiry() {
        let cache = manager();
        let now = Utc::now();
        cache
            .store
            .put_cache_entry(
                "near",
                "1",
                now - ChronoDuration::minutes(95),
                now + ChronoDuration::minutes(5),
            )
            .expect("put");
        assert!(cache.has("near"));
        assert!(cache.is_stale("near"));
        assert!(cache.is_stale("absent"));
    }

    #[test]
    fn test_clear_and_sweep() {
        let cache = manager();
        cache.set("achievements:ids", &[1], Duration::from_secs(60));
        cache.set("achievements:user:u1", &[1], Duration::from_secs(60));
        cache.set("maps:ids", &[1], Duration::from_secs(60));
        let now = Utc::now();
        cache
            .store
            .put_cache_entry("gone", "1", now - ChronoDuration::hours(2), now - ChronoDuration::hours(1))
            .expect("put");

        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.clear(Some("achievements:")), 2);
        assert!(cache.has("maps:ids"));
        assert_eq!(cache.clear(None), 1);
    }

    #[test]
    fn test_storage_failure_degrades_to_miss() {
        let store = Store::open_in_memory().expect("store");
        let cache = CacheManager::new(store.clone());
        cache.set("k", &1, Duration::from_secs(60));
        store.close().expect("close");

        assert_eq!(cache.get::<u32>("k"), None);
        cache.set("k", &2, Duration::from_secs(60));
        cache.delete("k");
        assert_eq!(cache.sweep_expired(), 0);
    }
}
