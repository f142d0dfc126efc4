//! Application state consumed by front ends.
//!
//! [`Tracker`] wires the store, client and services together and keeps every
//! catalog and per-user progress list in a [`Resource`], so a front end can
//! render a previous value while a refresh is running or after one failed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError, HttpTransport, RateLimiter};
use crate::cache::CacheManager;
use crate::config::Config;
use crate::models::{self, Achievement, Map, Mastery, User, UserAchievement, UserMastery};
use crate::services::{
    AccountService, AchievementService, MapService, MasteryService, SyncFailure, SyncReport,
};
use crate::store::{RemovalSummary, Store, StoreError, MAX_USERS};
use crate::Result;

/// Load state of one catalog or progress list.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource<T> {
    Empty,
    Fetching { previous: Option<T> },
    /// `stale` is set when the latest refresh failed and this is the prior value.
    Populated { value: T, stale: bool },
}

impl<T> Default for Resource<T> {
    fn default() -> Self {
        Resource::Empty
    }
}

impl<T> Resource<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Resource::Empty => None,
            Resource::Fetching { previous } => previous.as_ref(),
            Resource::Populated { value, .. } => Some(value),
        }
    }

    pub fn is_fetching(&self) -> bool {
        matches!(self, Resource::Fetching { .. })
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Resource::Populated { stale: true, .. })
    }

    fn take_value(&mut self) -> Option<T> {
        match std::mem::take(self) {
            Resource::Empty => None,
            Resource::Fetching { previous } => previous,
            Resource::Populated { value, .. } => Some(value),
        }
    }

    pub fn begin_fetch(&mut self) {
        let previous = self.take_value();
        *self = Resource::Fetching { previous };
    }

    pub fn succeed(&mut self, value: T) {
        *self = Resource::Populated { value, stale: false };
    }

    /// Keep the prior value marked stale, or fall back to `Empty`.
    pub fn fail(&mut self) {
        *self = match self.take_value() {
            Some(value) => Resource::Populated { value, stale: true },
            None => Resource::Empty,
        };
    }

    /// Apply the outcome of a fetch and hand the error back.
    pub fn settle(&mut self, result: Result<T>) -> Result<()> {
        match result {
            Ok(value) => {
                self.succeed(value);
                Ok(())
            }
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }
}

/// Outcome of [`Tracker::sync_all_users`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub achievements: SyncReport,
    pub masteries: SyncReport,
    /// Users that succeeded in every domain; only these get `last_synced` stamped.
    pub fully_synced: Vec<String>,
}

impl SyncSummary {
    pub fn is_complete(&self) -> bool {
        self.achievements.is_complete() && self.masteries.is_complete()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&'static str, &SyncFailure)> {
        self.achievements
            .failed
            .iter()
            .map(|f| ("achievements", f))
            .chain(self.masteries.failed.iter().map(|f| ("masteries", f)))
    }
}

pub struct Tracker {
    store: Store,
    api: ApiClient,
    achievements: AchievementService,
    masteries: MasteryService,
    maps: MapService,
    account: AccountService,

    users: Vec<User>,
    achievement_catalog: Resource<Vec<Achievement>>,
    mastery_catalog: Resource<Vec<Mastery>>,
    map_catalog: Resource<Vec<Map>>,
    user_achievements: HashMap<String, Resource<Vec<UserAchievement>>>,
    user_masteries: HashMap<String, Resource<Vec<UserMastery>>>,
    last_error: Option<String>,
}

impl Tracker {
    /// Open the configured database, sweep expired cache entries and build the
    /// HTTP stack.
    pub fn open(config: &Config) -> anyhow::Result<Self> {
        let path = config.database_path()?;
        let store = Store::open(&path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;

        let cache = CacheManager::new(store.clone());
        let swept = cache.sweep_expired();
        if swept > 0 {
            info!(swept, "Removed expired cache entries");
        }

        let transport = HttpTransport::new(config.endpoint(), config.timeout())?;
        let limiter = RateLimiter::new(config.rate_limit_capacity, config.rate_limit_window());
        let api = ApiClient::new(Arc::new(transport), limiter, cache, config.max_retries);

        Ok(Self::new(store, api)?)
    }

    pub fn new(store: Store, api: ApiClient) -> Result<Self> {
        let users = store.list_users()?;
        Ok(Self {
            achievements: AchievementService::new(api.clone(), store.clone()),
            masteries: MasteryService::new(api.clone(), store.clone()),
            maps: MapService::new(api.clone(), store.clone()),
            account: AccountService::new(api.clone()),
            store,
            api,
            users,
            achievement_catalog: Resource::Empty,
            mastery_catalog: Resource::Empty,
            map_catalog: Resource::Empty,
            user_achievements: HashMap::new(),
            user_masteries: HashMap::new(),
            last_error: None,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn achievements(&self) -> &AchievementService {
        &self.achievements
    }

    pub fn masteries(&self) -> &MasteryService {
        &self.masteries
    }

    pub fn maps(&self) -> &MapService {
        &self.maps
    }

    pub fn account(&self) -> &AccountService {
        &self.account
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn achievement_catalog(&self) -> &Resource<Vec<Achievement>> {
        &self.achievement_catalog
    }

    pub fn mastery_catalog(&self) -> &Resource<Vec<Mastery>> {
        &self.mastery_catalog
    }

    pub fn map_catalog(&self) -> &Resource<Vec<Map>> {
        &self.map_catalog
    }

    pub fn user_achievements(&self, user_id: &str) -> Option<&Resource<Vec<UserAchievement>>> {
        self.user_achievements.get(user_id)
    }

    pub fn user_masteries(&self, user_id: &str) -> Option<&Resource<Vec<UserMastery>>> {
        self.user_masteries.get(user_id)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.last_error = None;
                Ok(value)
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn reload_users(&mut self) -> Result<()> {
        self.users = self.store.list_users()?;
        Ok(())
    }

    // ===== Users =====

    /// Validate `api_key` upstream and create a profile for it.
    ///
    /// The user limit and duplicate keys are checked locally before any
    /// request is made; the store enforces both again on insert.
    pub async fn add_user(&mut self, name: &str, api_key: &str) -> Result<User> {
        let result = self.try_add_user(name, api_key).await;
        self.record(result)
    }

    async fn try_add_user(&mut self, name: &str, api_key: &str) -> Result<User> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(ApiError::InvalidCredential("API key is empty".to_string()).into());
        }
        if self.store.user_count()? >= MAX_USERS {
            return Err(StoreError::UserLimitReached(MAX_USERS).into());
        }
        if self.store.find_user_by_api_key(api_key)?.is_some() {
            return Err(StoreError::DuplicateCredential.into());
        }

        let (account, token) = self.account.account_with_token_info(api_key).await?;
        let user = User::new(name, api_key, &account, &token);
        self.store.insert_user(&user)?;
        self.reload_users()?;
        info!(user = %user.name, account = %account.name, "Added user");
        Ok(user)
    }

    /// Delete a user together with its progress and cached responses.
    pub fn remove_user(&mut self, id: &str) -> Result<RemovalSummary> {
        let result = self.store.remove_user(id).map_err(Into::into);
        let summary = self.record(result)?;
        self.user_achievements.remove(id);
        self.user_masteries.remove(id);
        self.reload_users()?;
        info!(
            user_id = id,
            achievements = summary.achievements,
            masteries = summary.masteries,
            maps = summary.maps,
            cache_entries = summary.cache_entries,
            "Removed user"
        );
        Ok(summary)
    }

    pub fn rename_user(&mut self, id: &str, name: &str) -> Result<User> {
        let result = self.try_rename_user(id, name);
        self.record(result)
    }

    fn try_rename_user(&mut self, id: &str, name: &str) -> Result<User> {
        let mut user = self
            .store
            .get_user(id)?
            .ok_or_else(|| StoreError::UserNotFound(id.to_string()))?;
        user.name = name.trim().to_string();
        self.store.update_user(&user)?;
        self.reload_users()?;
        Ok(user)
    }

    // ===== Loading =====

    /// Load all three catalogs concurrently. Every catalog is settled even
    /// when another fails; the first error is returned.
    pub async fn load_catalogs(&mut self, force: bool) -> Result<()> {
        self.achievement_catalog.begin_fetch();
        self.mastery_catalog.begin_fetch();
        self.map_catalog.begin_fetch();

        let (achievements, masteries, maps) = tokio::join!(
            self.achievements.get_all(force),
            self.masteries.get_all(force),
            self.maps.get_all(force),
        );

        let outcomes = [
            self.achievement_catalog.settle(achievements),
            self.mastery_catalog.settle(masteries),
            self.map_catalog.settle(maps),
        ];
        let result = outcomes.into_iter().collect::<Result<Vec<()>>>().map(|_| ());
        self.record(result)
    }

    /// Load achievement and mastery progress for one user.
    pub async fn load_user_progress(&mut self, user_id: &str, force: bool) -> Result<()> {
        let api_key = match self.user(user_id) {
            Some(user) => user.api_key.clone(),
            None => {
                let result: Result<()> = Err(StoreError::UserNotFound(user_id.to_string()).into());
                return self.record(result);
            }
        };

        self.user_achievements
            .entry(user_id.to_string())
            .or_default()
            .begin_fetch();
        self.user_masteries
            .entry(user_id.to_string())
            .or_default()
            .begin_fetch();

        let (achievements, masteries) = tokio::join!(
            self.achievements.get_user_progress(user_id, &api_key, force),
            self.masteries.get_user_progress(user_id, &api_key, force),
        );

        let achievements = self
            .user_achievements
            .entry(user_id.to_string())
            .or_default()
            .settle(achievements);
        let masteries = self
            .user_masteries
            .entry(user_id.to_string())
            .or_default()
            .settle(masteries);
        self.record(achievements.and(masteries))
    }

    // ===== Sync =====

    /// Refresh achievement and mastery progress for every user.
    ///
    /// One user's failure never affects another's. `last_synced` is stamped
    /// only for users that succeeded in both domains, then progress is
    /// reloaded from the store.
    pub async fn sync_all_users(&mut self) -> Result<SyncSummary> {
        let (achievements, masteries) = tokio::join!(
            self.achievements.sync_all_users(),
            self.masteries.sync_all_users(),
        );
        let result = achievements.and_then(|a| masteries.map(|m| (a, m)));
        let (achievements, masteries) = self.record(result)?;

        let mastered: HashSet<&String> = masteries.succeeded.iter().collect();
        let fully_synced: Vec<String> = achievements
            .succeeded
            .iter()
            .filter(|id| mastered.contains(id))
            .cloned()
            .collect();

        let summary = SyncSummary {
            achievements,
            masteries,
            fully_synced,
        };
        let result = self.apply_sync(&summary);
        self.record(result)?;

        if !summary.is_complete() {
            let failed: Vec<String> = summary
                .failures()
                .map(|(domain, f)| format!("{} ({})", f.user_name, domain))
                .collect();
            warn!(failed = failed.len(), "Sync incomplete");
            self.last_error = Some(format!("Sync failed for {}", failed.join(", ")));
        }
        Ok(summary)
    }

    fn apply_sync(&mut self, summary: &SyncSummary) -> Result<()> {
        self.store.touch_last_synced(&summary.fully_synced, models::now())?;
        self.reload_users()?;

        let user_ids: Vec<String> = self.users.iter().map(|u| u.id.clone()).collect();
        for user_id in user_ids {
            let achievements = self.user_achievements.entry(user_id.clone()).or_default();
            if summary.achievements.has_failed(&user_id) {
                achievements.fail();
            } else {
                achievements.succeed(self.store.user_achievements(&user_id)?);
            }

            let masteries = self.user_masteries.entry(user_id.clone()).or_default();
            if summary.masteries.has_failed(&user_id) {
                masteries.fail();
            } else {
                masteries.succeed(self.store.user_masteries(&user_id)?);
            }
        }
        Ok(())
    }

    /// Close the underlying store.
    pub fn close(self) -> Result<()> {
        Ok(self.store.close()?)
    }
}
