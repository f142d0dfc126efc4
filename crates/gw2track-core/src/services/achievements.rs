use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{fetch_by_ids, is_fresh, sync_users, SyncReport};
use crate::api::{ApiClient, ApiError, RequestOptions};
use crate::cache::{keys, ttl};
use crate::models::{
    self, AccountAchievementResponse, Achievement, AchievementCategory, AchievementCategoryResponse,
    AchievementResponse, UserAchievement,
};
use crate::store::Store;
use crate::Result;

#[derive(Clone)]
pub struct AchievementService {
    api: ApiClient,
    store: Store,
}

impl AchievementService {
    pub fn new(api: ApiClient, store: Store) -> Self {
        Self { api, store }
    }

    /// The achievement catalog. Served from the store unless it is empty or
    /// `force` is set; a refresh also refreshes categories.
    pub async fn get_all(&self, force: bool) -> Result<Vec<Achievement>> {
        if !force {
            match self.store.achievement_count() {
                Ok(count) if count > 0 => return Ok(self.store.achievements()?),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Failed to read achievement catalog, refetching"),
            }
        }

        let ids: Vec<u32> = self
            .api
            .get(
                "/achievements",
                RequestOptions::new()
                    .cache(keys::ACHIEVEMENT_IDS, ttl::CATALOG)
                    .deduplicate(),
            )
            .await?;

        let (responses, categories) = tokio::join!(
            fetch_by_ids::<AchievementResponse>(&self.api, "/achievements", &ids),
            self.fetch_categories(),
        );
        let responses = responses?;
        // Categories only annotate the catalog; losing them is not fatal
        let categories = categories.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to fetch achievement categories");
            Vec::new()
        });

        let mut membership: HashMap<u32, Vec<u32>> = HashMap::new();
        for category in &categories {
            for achievement_id in &category.achievements {
                membership.entry(*achievement_id).or_default().push(category.id);
            }
        }

        let achievements: Vec<Achievement> = responses
            .into_iter()
            .map(|response| {
                let categories = membership.remove(&response.id).unwrap_or_default();
                Achievement::from_api(response, categories)
            })
            .collect();

        if !categories.is_empty() {
            self.store.upsert_achievement_categories(&categories)?;
        }
        self.store.upsert_achievements(&achievements)?;
        info!(
            achievements = achievements.len(),
            categories = categories.len(),
            "Refreshed achievement catalog"
        );
        Ok(achievements)
    }

    async fn fetch_categories(&self) -> std::result::Result<Vec<AchievementCategory>, ApiError> {
        let ids: Vec<u32> = self
            .api
            .get(
                "/achievements/categories",
                RequestOptions::new()
                    .cache(keys::ACHIEVEMENT_CATEGORY_IDS, ttl::CATALOG)
                    .deduplicate(),
            )
            .await?;
        let mut categories: Vec<AchievementCategory> =
            fetch_by_ids::<AchievementCategoryResponse>(&self.api, "/achievements/categories", &ids)
                .await?
                .into_iter()
                .map(AchievementCategory::from_api)
                .collect();
        categories.sort_by_key(|c| (c.order, c.id));
        Ok(categories)
    }

    /// One user's progress. Rows younger than the progress TTL are served from
    /// the store; otherwise upstream is asked and every row is overwritten.
    pub async fn get_user_progress(
        &self,
        user_id: &str,
        api_key: &str,
        force: bool,
    ) -> Result<Vec<UserAchievement>> {
        if !force {
            match self.store.user_achievements(user_id) {
                Ok(rows) if is_fresh(rows.iter().map(|r| r.last_updated), ttl::USER_ACHIEVEMENTS, Utc::now()) => {
                    debug!(user_id = user_id, rows = rows.len(), "Achievement progress is fresh");
                    return Ok(rows);
                }
                Ok(_) => {}
                Err(e) => warn!(user_id = user_id, error = %e, "Failed to read achievement progress"),
            }
        }

        let progress: Vec<AccountAchievementResponse> = self
            .api
            .get(
                "/account/achievements",
                RequestOptions::new()
                    .credential(api_key)
                    .cache(keys::user_achievements(user_id), ttl::USER_ACHIEVEMENTS),
            )
            .await?;

        let now = models::now();
        let rows: Vec<UserAchievement> = progress
            .into_iter()
            .map(|response| UserAchievement::from_api(user_id, response, now))
            .collect();
        self.store.upsert_user_achievements(&rows)?;
        debug!(user_id = user_id, rows = rows.len(), "Stored achievement progress");
        Ok(rows)
    }

    /// Force-refresh every user's progress; one failure never stops the rest.
    pub async fn sync_all_users(&self) -> Result<SyncReport> {
        let users = self.store.list_users()?;
        Ok(sync_users("achievements", users, |user| {
            let service = self.clone();
            async move {
                service
                    .get_user_progress(&user.id, &user.api_key, true)
                    .await
            }
        })
        .await)
    }

    // ===== Local reads =====

    pub fn achievement(&self, id: u32) -> Result<Option<Achievement>> {
        Ok(self.store.achievement(id)?)
    }

    pub fn in_category(&self, category_id: u32) -> Result<Vec<Achievement>> {
        Ok(self.store.achievements_in_category(category_id)?)
    }

    pub fn categories(&self) -> Result<Vec<AchievementCategory>> {
        Ok(self.store.achievement_categories()?)
    }

    pub fn completed(&self, user_id: &str) -> Result<Vec<UserAchievement>> {
        Ok(self.store.user_achievements_by_done(user_id, true)?)
    }

    pub fn incomplete(&self, user_id: &str) -> Result<Vec<UserAchievement>> {
        Ok(self.store.user_achievements_by_done(user_id, false)?)
    }

    pub fn user_progress_for(&self, user_id: &str, achievement_id: u32) -> Result<Option<UserAchievement>> {
        Ok(self.store.user_achievement(user_id, achievement_id)?)
    }

    /// Catalog entries that none of `user_ids` has completed. A missing
    /// progress row counts as not done.
    pub fn common_incomplete(&self, user_ids: &[String]) -> Result<Vec<Achievement>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut done: HashSet<u32> = HashSet::new();
        for user_id in user_ids {
            done.extend(
                self.store
                    .user_achievements_by_done(user_id, true)?
                    .into_iter()
                    .map(|row| row.achievement_id),
            );
        }
        Ok(self
            .store
            .achievements()?
            .into_iter()
            .filter(|achievement| !done.contains(&achievement.id))
            .collect())
    }
}
