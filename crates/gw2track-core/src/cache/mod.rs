//! TTL cache over the store's `cache` table.

mod manager;

use std::time::Duration;

use chrono::{DateTime, Utc};

pub use manager::CacheManager;

use crate::utils::format_age;

/// Cache lifetimes per resource.
pub mod ttl {
    use std::time::Duration;

    /// Catalog id lists and catalog-derived data (waypoints).
    pub const CATALOG: Duration = Duration::from_secs(24 * 60 * 60);
    pub const USER_ACHIEVEMENTS: Duration = Duration::from_secs(5 * 60);
    pub const USER_MASTERIES: Duration = Duration::from_secs(15 * 60);
    pub const ACCOUNT: Duration = Duration::from_secs(30 * 60);
    pub const TOKEN_INFO: Duration = Duration::from_secs(60 * 60);
}

/// Cache key layout. Per-user keys embed the user id or the API key so that
/// removing a user can find them.
pub mod keys {
    pub const ACHIEVEMENT_IDS: &str = "achievements:ids";
    pub const ACHIEVEMENT_CATEGORY_IDS: &str = "achievements:categories:ids";
    pub const MASTERY_IDS: &str = "masteries:ids";
    pub const MAP_IDS: &str = "maps:ids";

    pub fn user_achievements(user_id: &str) -> String {
        format!("achievements:user:{}", user_id)
    }

    pub fn user_masteries(user_id: &str) -> String {
        format!("masteries:user:{}", user_id)
    }

    pub fn token_info(api_key: &str) -> String {
        format!("tokeninfo:{}", api_key)
    }

    pub fn account(api_key: &str) -> String {
        format!("account:{}", api_key)
    }

    pub fn waypoints(continent: u32, floor: i32) -> String {
        format!("waypoints:{}:{}", continent, floor)
    }

    /// `key` with any embedded API key cut off, for logging.
    pub(crate) fn redacted(key: &str) -> &str {
        ["tokeninfo:", "account:"]
            .into_iter()
            .find(|prefix| key.starts_with(prefix))
            .map_or(key, |prefix| &key[..prefix.len() - 1])
    }
}

/// A decoded cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub key: String,
    pub data: T,
    pub timestamp: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    /// The lifetime the entry was written with.
    pub fn ttl(&self) -> chrono::Duration {
        self.expires_at - self.timestamp
    }

    /// Time left before expiry; negative once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.expires_at - now
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Within the last 10% of its lifetime (or past it).
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        is_stale(self.timestamp, self.expires_at, now)
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).to_std().unwrap_or_default()
    }

    pub fn age_display(&self) -> String {
        format_age(self.timestamp, Utc::now())
    }
}

pub(crate) fn is_stale(timestamp: DateTime<Utc>, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let remaining_ms = (expires_at - now).num_milliseconds();
    let ttl_ms = (expires_at - timestamp).num_milliseconds();
    remaining_ms.saturating_mul(10) < ttl_ms
}
