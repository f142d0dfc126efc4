use chrono::Utc;
use tracing::{debug, info, warn};

use super::{fetch_by_ids, is_fresh, sync_users, SyncReport};
use crate::api::{ApiClient, RequestOptions};
use crate::cache::{keys, ttl};
use crate::models::{self, AccountMasteryResponse, Mastery, MasteryRegion, MasteryResponse, UserMastery};
use crate::store::Store;
use crate::Result;

#[derive(Clone)]
pub struct MasteryService {
    api: ApiClient,
    store: Store,
}

impl MasteryService {
    pub fn new(api: ApiClient, store: Store) -> Self {
        Self { api, store }
    }

    pub async fn get_all(&self, force: bool) -> Result<Vec<Mastery>> {
        if !force {
            match self.store.mastery_count() {
                Ok(count) if count > 0 => return Ok(self.store.masteries()?),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Failed to read mastery catalog, refetching"),
            }
        }

        let ids: Vec<u32> = self
            .api
            .get(
                "/masteries",
                RequestOptions::new()
                    .cache(keys::MASTERY_IDS, ttl::CATALOG)
                    .deduplicate(),
            )
            .await?;

        let masteries: Vec<Mastery> = fetch_by_ids::<MasteryResponse>(&self.api, "/masteries", &ids)
            .await?
            .into_iter()
            .map(Mastery::from_api)
            .collect();

        self.store.upsert_masteries(&masteries)?;
        info!(count = masteries.len(), "Refreshed mastery catalog");
        Ok(masteries)
    }

    /// One user's unlocked masteries. Upstream levels are 0-indexed and are
    /// stored 1-indexed; masteries without an upstream record stay absent.
    pub async fn get_user_progress(
        &self,
        user_id: &str,
        api_key: &str,
        force: bool,
    ) -> Result<Vec<UserMastery>> {
        if !force {
            match self.store.user_masteries(user_id) {
                Ok(rows) if is_fresh(rows.iter().map(|r| r.last_updated), ttl::USER_MASTERIES, Utc::now()) => {
                    debug!(user_id = user_id, rows = rows.len(), "Mastery progress is fresh");
                    return Ok(rows);
                }
                Ok(_) => {}
                Err(e) => warn!(user_id = user_id, error = %e, "Failed to read mastery progress"),
            }
        }

        let progress: Vec<AccountMasteryResponse> = self
            .api
            .get(
                "/account/masteries",
                RequestOptions::new()
                    .credential(api_key)
                    .cache(keys::user_masteries(user_id), ttl::USER_MASTERIES),
            )
            .await?;

        let now = models::now();
        let rows: Vec<UserMastery> = progress
            .iter()
            .map(|response| UserMastery::from_api(user_id, response, now))
            .collect();
        self.store.upsert_user_masteries(&rows)?;
        debug!(user_id = user_id, rows = rows.len(), "Stored mastery progress");
        Ok(rows)
    }

    pub async fn sync_all_users(&self) -> Result<SyncReport> {
        let users = self.store.list_users()?;
        Ok(sync_users("masteries", users, |user| {
            let service = self.clone();
            async move {
                service
                    .get_user_progress(&user.id, &user.api_key, true)
                    .await
            }
        })
        .await)
    }

    pub fn by_region(&self, region: MasteryRegion) -> Result<Vec<Mastery>> {
        Ok(self.store.masteries_by_region(region)?)
    }

    pub fn unlocked(&self, user_id: &str) -> Result<Vec<UserMastery>> {
        Ok(self.store.user_masteries(user_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{mastery_json, mock_client_with_store, ok_json, sample_user, status, MockTransport};
    use serde_json::json;

    #[tokio::test]
    async fn test_get_all_and_by_region() {
        let store = Store::open_in_memory().expect("store");
        let transport = MockTransport::new(|request| match request.query_value("ids") {
            None => ok_json(json!([1, 2, 1])),
            Some(ids) => {
                // Duplicate ids are dropped before chunking
                assert_eq!(ids, "1,2");
                ok_json(json!([mastery_json(1, "Maguuma"), mastery_json(2, "Underworld")]))
            }
        });
        let service = MasteryService::new(mock_client_with_store(transport.clone(), store.clone()), store);

        let masteries = service.get_all(false).await.expect("catalog");
        assert_eq!(masteries.len(), 2);
        assert_eq!(masteries[1].region, MasteryRegion::Unknown);
        assert_eq!(service.by_region(MasteryRegion::Maguuma).expect("region")[0].id, 1);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_refreshed_progress_matches_stored_rows() {
        let store = Store::open_in_memory().expect("store");
        let user = sample_user("Alice", "KEY-A");
        store.insert_user(&user).expect("user");
        let transport = MockTransport::new(|_| ok_json(json!([{"id": 1, "level": 2}, {"id": 3, "level": 0}])));
        let service = MasteryService::new(mock_client_with_store(transport.clone(), store.clone()), store.clone());

        let fetched = service.get_user_progress(&user.id, &user.api_key, true).await.expect("progress");
        assert_eq!(transport.calls(), 1);
        assert_eq!(store.user_masteries(&user.id).expect("rows"), fetched);

        let reused = service.get_user_progress(&user.id, &user.api_key, false).await.expect("progress");
        assert_eq!(reused, fetched);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_levels_are_stored_one_indexed() {
        let store = Store::open_in_memory().expect("store");
        let user = sample_user("Alice", "KEY-A");
        store.insert_user(&user).expect("user");
        let transport = MockTransport::new(|_| ok_json(json!([{"id": 1, "level": 2}, {"id": 5, "level": 0}])));
        let service = MasteryService::new(mock_client_with_store(transport, store.clone()), store);

        service.get_user_progress(&user.id, &user.api_key, true).await.expect("progress");
        let unlocked = service.unlocked(&user.id).expect("rows");
        assert_eq!(
            unlocked.iter().map(|m| (m.mastery_id, m.level)).collect::<Vec<_>>(),
            vec![(1, 3), (5, 1)]
        );
        // No upstream record, no row
        assert!(unlocked.iter().all(|m| m.mastery_id != 2));
    }

    #[tokio::test]
    async fn test_sync_reports_failed_users() {
        let store = Store::open_in_memory().expect("store");
        let good = sample_user("Good", "KEY-G");
        let bad = sample_user("Bad", "KEY-X");
        store.insert_user(&good).expect("user");
        store.insert_user(&bad).expect("user");
        let transport = MockTransport::new(|request| match request.credential.as_deref() {
            Some("KEY-X") => status(403, "forbidden"),
            _ => ok_json(json!([{"id": 1, "level": 0}])),
        });
        let service = MasteryService::new(mock_client_with_store(transport, store.clone()), store);

        let report = service.sync_all_users().await.expect("sync");
        assert_eq!(report.succeeded, vec![good.id.clone()]);
        assert!(report.has_failed(&bad.id));
        assert_eq!(service.unlocked(&good.id).expect("rows").len(), 1);
        assert!(service.unlocked(&bad.id).expect("rows").is_empty());
    }
}
