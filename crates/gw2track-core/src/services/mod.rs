//! Domain services: fetch from upstream, transform, persist, and fan out
//! per-user syncs.
//!
//! Each service owns a cheap clone of the [`ApiClient`] and the [`Store`].
//! Catalog fetches follow the same shape everywhere: an id list, then the
//! entities in chunks of at most [`MAX_IDS_PER_REQUEST`] ids, all chunks
//! requested concurrently.

pub mod account;
pub mod achievements;
pub mod maps;
pub mod masteries;

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{join_all, try_join_all};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

pub use account::AccountService;
pub use achievements::AchievementService;
pub use maps::MapService;
pub use masteries::MasteryService;

use crate::api::{ApiClient, ApiError, RequestOptions};
use crate::models::User;

/// Upstream ceiling on ids per `?ids=` request.
pub const MAX_IDS_PER_REQUEST: usize = 200;

/// Drop repeated ids, keeping first occurrences in order.
pub(crate) fn dedup_ids(ids: &[u32]) -> Vec<u32> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Fetch `path?ids=...` for every id, chunked and concurrent.
pub(crate) async fn fetch_by_ids<T: DeserializeOwned>(
    api: &ApiClient,
    path: &str,
    ids: &[u32],
) -> Result<Vec<T>, ApiError> {
    let ids = dedup_ids(ids);
    let requests = ids.chunks(MAX_IDS_PER_REQUEST).map(|chunk| {
        let joined = chunk
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        api.get::<Vec<T>>(path, RequestOptions::new().query("ids", joined).deduplicate())
    });

    let chunks = try_join_all(requests).await?;
    Ok(chunks.into_iter().flatten().collect())
}

/// True when the newest row is younger than `ttl`.
pub(crate) fn is_fresh(
    last_updated: impl Iterator<Item = DateTime<Utc>>,
    ttl: Duration,
    now: DateTime<Utc>,
) -> bool {
    match last_updated.max() {
        Some(latest) => (now - latest)
            .to_std()
            .map(|age| age < ttl)
            // Newer than now (clock skew) counts as fresh
            .unwrap_or(true),
        None => false,
    }
}

// ===== Multi-user sync =====

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub user_id: String,
    pub user_name: String,
    pub error: String,
}

/// Outcome of one domain's sync across every user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn has_failed(&self, user_id: &str) -> bool {
        self.failed.iter().any(|f| f.user_id == user_id)
    }
}

/// Run `sync` for every user concurrently. A failing user is logged and
/// recorded; the others are unaffected.
pub(crate) async fn sync_users<F, Fut, T>(domain: &str, users: Vec<User>, sync: F) -> SyncReport
where
    F: Fn(User) -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let sync = &sync;
    let outcomes = join_all(users.into_iter().map(|user| async move {
        let result = sync(user.clone()).await;
        (user, result)
    }))
    .await;

    let mut report = SyncReport::default();
    for (user, result) in outcomes {
        match result {
            Ok(_) => report.succeeded.push(user.id),
            Err(e) => {
                warn!(domain = domain, user = %user.name, error = %e, "Sync failed for user");
                report.failed.push(SyncFailure {
                    user_id: user.id,
                    user_name: user.name,
                    error: e.to_string(),
                });
            }
        }
    }
    info!(
        domain = domain,
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "Sync finished"
    );
    report
}
