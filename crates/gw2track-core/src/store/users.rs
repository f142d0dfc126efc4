use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use super::{from_millis, to_millis, Store, StoreError};
use crate::cache::keys;
use crate::models::User;

/// Maximum number of tracked users.
pub const MAX_USERS: usize = 10;

/// Rows removed alongside a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalSummary {
    pub achievements: usize,
    pub masteries: usize,
    pub maps: usize,
    pub cache_entries: usize,
}

const USER_COLUMNS: &str =
    "id, name, api_key, account_name, account_id, permissions, created_at, last_synced";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let permissions: String = row.get(5)?;
    let permissions = serde_json::from_str(&permissions)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        api_key: row.get(2)?,
        account_name: row.get(3)?,
        account_id: row.get(4)?,
        permissions,
        created_at: from_millis(row.get(6)?),
        last_synced: row.get::<_, Option<i64>>(7)?.map(from_millis),
    })
}

fn count_users(conn: &Connection) -> Result<usize, StoreError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    Ok(count as usize)
}

impl Store {
    /// Insert a new user. The user ceiling and key uniqueness are checked in
    /// the same transaction as the insert.
    pub fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let permissions = serde_json::to_string(&user.permissions)?;
        self.with_tx(|tx| {
            if count_users(tx)? >= MAX_USERS {
                return Err(StoreError::UserLimitReached(MAX_USERS));
            }
            let taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE api_key = ?1)",
                [&user.api_key],
                |row| row.get(0),
            )?;
            if taken {
                return Err(StoreError::DuplicateCredential);
            }

            tx.execute(
                &format!("INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)", USER_COLUMNS),
                params![
                    user.id,
                    user.name,
                    user.api_key,
                    user.account_name,
                    user.account_id,
                    permissions,
                    to_millis(user.created_at),
                    user.last_synced.map(to_millis),
                ],
            )?;
            Ok(())
        })?;
        info!(user_id = %user.id, name = %user.name, "Added user");
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                    [id],
                    user_from_row,
                )
                .optional()?)
        })
    }

    pub fn find_user_by_api_key(&self, api_key: &str) -> Result<Option<User>, StoreError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE api_key = ?1", USER_COLUMNS),
                    [api_key],
                    user_from_row,
                )
                .optional()?)
        })
    }

    /// All users in creation order.
    pub fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users ORDER BY created_at, rowid",
                USER_COLUMNS
            ))?;
            let users = stmt
                .query_map([], user_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(users)
        })
    }

    pub fn user_count(&self) -> Result<usize, StoreError> {
        self.with_conn(count_users)
    }

    /// Overwrite the mutable fields of an existing user.
    pub fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let permissions = serde_json::to_string(&user.permissions)?;
        let changed = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE users SET name = ?2, account_name = ?3, account_id = ?4,
                    permissions = ?5, last_synced = ?6
                 WHERE id = ?1",
                params![
                    user.id,
                    user.name,
                    user.account_name,
                    user.account_id,
                    permissions,
                    user.last_synced.map(to_millis),
                ],
            )?)
        })?;
        if changed == 0 {
            return Err(StoreError::UserNotFound(user.id.clone()));
        }
        Ok(())
    }

    /// Stamp `last_synced` for the given users. Unknown ids are skipped.
    pub fn touch_last_synced(&self, user_ids: &[String], at: DateTime<Utc>) -> Result<usize, StoreError> {
        self.with_tx(|tx| {
            let mut stmt = tx.prepare("UPDATE users SET last_synced = ?2 WHERE id = ?1")?;
            let mut touched = 0;
            for id in user_ids {
                touched += stmt.execute(params![id, to_millis(at)])?;
            }
            Ok(touched)
        })
    }

    /// Delete a user, all of their progress and the cache entries keyed by
    /// their API key or id, atomically. Cache keys are matched exactly.
    pub fn remove_user(&self, id: &str) -> Result<RemovalSummary, StoreError> {
        let summary = self.with_tx(|tx| {
            let api_key: String = tx
                .query_row("SELECT api_key FROM users WHERE id = ?1", [id], |row| row.get(0))
                .optional()?
                .ok_or_else(|| StoreError::UserNotFound(id.to_string()))?;

            let mut cache_entries = 0;
            for key in [
                keys::token_info(&api_key),
                keys::account(&api_key),
                keys::user_achievements(id),
                keys::user_masteries(id),
            ] {
                cache_entries += tx.execute("DELETE FROM cache WHERE key = ?1", [&key])?;
            }

            let summary = RemovalSummary {
                achievements: tx.execute("DELETE FROM user_achievements WHERE user_id = ?1", [id])?,
                masteries: tx.execute("DELETE FROM user_masteries WHERE user_id = ?1", [id])?,
                maps: tx.execute("DELETE FROM user_map_progress WHERE user_id = ?1", [id])?,
                cache_entries,
            };
            tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(summary)
        })?;
        info!(
            user_id = %id,
            achievements = summary.achievements,
            masteries = summary.masteries,
            maps = summary.maps,
            cache_entries = summary.cache_entries,
            "Removed user"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{UserAchievement, UserMapProgress, UserMastery};
    use crate::testing::{
        account_progress, mastery_progress, sample_achievement, sample_map, sample_mastery, sample_user,
    };
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_insert_and_read_back() {
        let store = Store::open_in_memory().expect("store");
        let user = sample_user("Alice", "KEY-A");
        store.insert_user(&user).expect("insert");

        let loaded = store.get_user(&user.id).expect("get").expect("present");
        // Millisecond precision survives the round trip
        assert_eq!(loaded.created_at.timestamp_millis(), user.created_at.timestamp_millis());
        assert_eq!(loaded.permissions, user.permissions);
        assert_eq!(loaded.account_name, user.account_name);
        assert_eq!(
            store.find_user_by_api_key("KEY-A").expect("find").map(|u| u.id),
            Some(user.id)
        );
        assert!(store.get_user("missing").expect("get").is_none());
    }

    #[test]
    fn test_user_limit_is_enforced() {
        let store = Store::open_in_memory().expect("store");
        for i in 0..MAX_USERS {
            store
                .insert_user(&sample_user(&format!("user{}", i), &format!("KEY-{}", i)))
                .expect("insert");
        }
        let err = store
            .insert_user(&sample_user("eleventh", "KEY-11"))
            .expect_err("limit");
        assert!(matches!(err, StoreError::UserLimitReached(MAX_USERS)));
        assert_eq!(store.user_count().expect("count"), MAX_USERS);
    }

    #[test]
    fn test_duplicate_api_key_is_rejected() {
        let store = Store::open_in_memory().expect("store");
        store.insert_user(&sample_user("Alice", "KEY-A")).expect("insert");
        let err = store
            .insert_user(&sample_user("Alias", "KEY-A"))
            .expect_err("duplicate");
        assert!(matches!(err, StoreError::DuplicateCredential));
        assert_eq!(store.list_users().expect("list").len(), 1);
    }

    #[test]
    fn test_update_and_touch_last_synced() {
        let store = Store::open_in_memory().expect("store");
        let mut user = sample_user("Alice", "KEY-A");
        store.insert_user(&user).expect("insert");

        user.name = "Alicia".to_string();
        store.update_user(&user).expect("update");
        assert_eq!(store.get_user(&user.id).expect("get").expect("user").name, "Alicia");

        let at = Utc::now();
        let touched = store
            .touch_last_synced(&[user.id.clone(), "ghost".to_string()], at)
            .expect("touch");
        assert_eq!(touched, 1);
        let synced = store.get_user(&user.id).expect("get").expect("user").last_synced;
        assert_eq!(synced.map(|t| t.timestamp_millis()), Some(at.timestamp_millis()));

        let ghost = sample_user("Ghost", "KEY-G");
        assert!(matches!(store.update_user(&ghost), Err(StoreError::UserNotFound(_))));
    }

    #[test]
    fn test_remove_user_cascades_progress_and_cache() {
        let store = Store::open_in_memory().expect("store");
        let alice = sample_user("Alice", "KEY-A");
        let bob = sample_user("Bob", "KEY-B");
        store.insert_user(&alice).expect("insert");
        store.insert_user(&bob).expect("insert");

        store.upsert_achievements(&[sample_achievement(1), sample_achievement(2)]).expect("catalog");
        store.upsert_masteries(&[sample_mastery(1, 2)]).expect("catalog");
        store.upsert_maps(&[sample_map(15)]).expect("catalog");

        let now = Utc::now();
        for user in [&alice, &bob] {
            let achievements: Vec<UserAchievement> = (1..=3)
                .map(|id| UserAchievement::from_api(&user.id, account_progress(id, id == 1), now))
                .collect();
            store.upsert_user_achievements(&achievements).expect("achievements");
            store
                .upsert_user_masteries(&[UserMastery::from_api(&user.id, &mastery_progress(1, 0), now)])
                .expect("masteries");
            store
                .upsert_user_map_progress(&UserMapProgress::new(&user.id, 15, true))
                .expect("maps");
        }

        let expires = now + Duration::hours(1);
        for key in [
            "tokeninfo:KEY-A".to_string(),
            "account:KEY-A".to_string(),
            format!("achievements:user:{}", alice.id),
            "tokeninfo:KEY-B".to_string(),
            format!("masteries:user:{}", bob.id),
            "achievements:ids".to_string(),
        ] {
            store.put_cache_entry(&key, "[]", now, expires).expect("cache");
        }

        let summary = store.remove_user(&alice.id).expect("remove");
        assert_eq!(
            summary,
            RemovalSummary {
                achievements: 3,
                masteries: 1,
                maps: 1,
                cache_entries: 3,
            }
        );

        assert!(store.get_user(&alice.id).expect("get").is_none());
        assert!(store.user_achievements(&alice.id).expect("rows").is_empty());
        assert!(store.user_masteries(&alice.id).expect("rows").is_empty());
        assert!(store.user_map_progress(&alice.id).expect("rows").is_empty());
        assert!(store.get_cache_entry("tokeninfo:KEY-A").expect("cache").is_none());

        // Bob and shared entries are untouched
        assert_eq!(store.user_achievements(&bob.id).expect("rows").len(), 3);
        assert_eq!(store.user_masteries(&bob.id).expect("rows").len(), 1);
        assert!(store.get_cache_entry("tokeninfo:KEY-B").expect("cache").is_some());
        assert!(store.get_cache_entry("achievements:ids").expect("cache").is_some());

        // Catalogs are shared and survive
        assert_eq!(store.achievement_count().expect("count"), 2);
        assert_eq!(store.mastery_count().expect("count"), 1);
        assert_eq!(store.map_count().expect("count"), 1);

        assert!(matches!(store.remove_user(&alice.id), Err(StoreError::UserNotFound(_))));
    }

    #[test]
    fn test_remove_user_keeps_cache_of_overlapping_key() {
        let store = Store::open_in_memory().expect("store");
        let short = sample_user("Short", "KEY-1");
        let long = sample_user("Long", "KEY-10");
        store.insert_user(&short).expect("insert");
        store.insert_user(&long).expect("insert");

        let now = Utc::now();
        let expires = now + Duration::hours(1);
        for key in [
            keys::token_info("KEY-1"),
            keys::account("KEY-1"),
            keys::token_info("KEY-10"),
            keys::account("KEY-10"),
            keys::user_achievements(&long.id),
        ] {
            store.put_cache_entry(&key, "{}", now, expires).expect("cache");
        }

        let summary = store.remove_user(&short.id).expect("remove");
        assert_eq!(summary.cache_entries, 2);
        assert!(store.get_cache_entry("tokeninfo:KEY-1").expect("cache").is_none());
        assert!(store.get_cache_entry("tokeninfo:KEY-10").expect("cache").is_some());
        assert!(store.get_cache_entry("account:KEY-10").expect("cache").is_some());
        assert!(store
            .get_cache_entry(&keys::user_achievements(&long.id))
            .expect("cache")
            .is_some());
    }

    #[test]
    fn test_progress_requires_existing_user() {
        let store = Store::open_in_memory().expect("store");
        let orphan = UserAchievement::from_api("nobody", account_progress(1, true), Utc::now());
        assert!(matches!(
            store.upsert_user_achievements(&[orphan]),
            Err(StoreError::Sqlite(_))
        ));
    }
}
