//! Per-user progress tables. Every row references an existing user.

use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};

use super::{from_millis, to_millis, Store, StoreError};
use crate::models::{UserAchievement, UserMapProgress, UserMastery};

const ACHIEVEMENT_COLUMNS: &str =
    "id, user_id, achievement_id, done, current, max, bits, repeated, unlocked, last_updated";

fn achievement_from_row(row: &Row<'_>) -> rusqlite::Result<UserAchievement> {
    let bits = row
        .get::<_, Option<String>>(6)?
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;
    Ok(UserAchievement {
        id: row.get(0)?,
        user_id: row.get(1)?,
        achievement_id: row.get(2)?,
        done: row.get(3)?,
        current: row.get(4)?,
        max: row.get(5)?,
        bits,
        repeated: row.get(7)?,
        unlocked: row.get(8)?,
        last_updated: from_millis(row.get(9)?),
    })
}

fn mastery_from_row(row: &Row<'_>) -> rusqlite::Result<UserMastery> {
    Ok(UserMastery {
        id: row.get(0)?,
        user_id: row.get(1)?,
        mastery_id: row.get(2)?,
        level: row.get(3)?,
        last_updated: from_millis(row.get(4)?),
    })
}

fn map_progress_from_row(row: &Row<'_>) -> rusqlite::Result<UserMapProgress> {
    Ok(UserMapProgress {
        id: row.get(0)?,
        user_id: row.get(1)?,
        map_id: row.get(2)?,
        completed: row.get(3)?,
        last_updated: from_millis(row.get(4)?),
    })
}

impl Store {
    // ===== Achievements =====

    pub fn upsert_user_achievements(&self, rows: &[UserAchievement]) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            let mut upsert = tx.prepare(&format!(
                "INSERT INTO user_achievements ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                    done = excluded.done, current = excluded.current, max = excluded.max,
                    bits = excluded.bits, repeated = excluded.repeated,
                    unlocked = excluded.unlocked, last_updated = excluded.last_updated",
                ACHIEVEMENT_COLUMNS
            ))?;
            for row in rows {
                let bits = row.bits.as_ref().map(serde_json::to_string).transpose()?;
                upsert.execute(params![
                    row.id,
                    row.user_id,
                    row.achievement_id,
                    row.done,
                    row.current,
                    row.max,
                    bits,
                    row.repeated,
                    row.unlocked,
                    to_millis(row.last_updated),
                ])?;
            }
            Ok(())
        })
    }

    pub fn user_achievements(&self, user_id: &str) -> Result<Vec<UserAchievement>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM user_achievements WHERE user_id = ?1 ORDER BY achievement_id",
                ACHIEVEMENT_COLUMNS
            ))?;
            let rows = stmt
                .query_map([user_id], achievement_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// A user's rows filtered on `done`, served by the `(user_id, done)` index.
    pub fn user_achievements_by_done(
        &self,
        user_id: &str,
        done: bool,
    ) -> Result<Vec<UserAchievement>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM user_achievements WHERE user_id = ?1 AND done = ?2
                 ORDER BY achievement_id",
                ACHIEVEMENT_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![user_id, done], achievement_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn user_achievement(
        &self,
        user_id: &str,
        achievement_id: u32,
    ) -> Result<Option<UserAchievement>, StoreError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {} FROM user_achievements WHERE user_id = ?1 AND achievement_id = ?2",
                        ACHIEVEMENT_COLUMNS
                    ),
                    params![user_id, achievement_id],
                    achievement_from_row,
                )
                .optional()?)
        })
    }

    // ===== Masteries =====

    pub fn upsert_user_masteries(&self, rows: &[UserMastery]) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            let mut upsert = tx.prepare(
                "INSERT INTO user_masteries (id, user_id, mastery_id, level, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    level = excluded.level, last_updated = excluded.last_updated",
            )?;
            for row in rows {
                upsert.execute(params![
                    row.id,
                    row.user_id,
                    row.mastery_id,
                    row.level,
                    to_millis(row.last_updated),
                ])?;
            }
            Ok(())
        })
    }

    pub fn user_masteries(&self, user_id: &str) -> Result<Vec<UserMastery>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, mastery_id, level, last_updated FROM user_masteries
                 WHERE user_id = ?1 ORDER BY mastery_id",
            )?;
            let rows = stmt
                .query_map([user_id], mastery_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    // ===== Maps =====

    pub fn upsert_user_map_progress(&self, row: &UserMapProgress) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_map_progress (id, user_id, map_id, completed, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    completed = excluded.completed, last_updated = excluded.last_updated",
                params![
                    row.id,
                    row.user_id,
                    row.map_id,
                    row.completed,
                    to_millis(row.last_updated),
                ],
            )?;
            Ok(())
        })
    }

    pub fn user_map_progress(&self, user_id: &str) -> Result<Vec<UserMapProgress>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, map_id, completed, last_updated FROM user_map_progress
                 WHERE user_id = ?1 ORDER BY map_id",
            )?;
            let rows = stmt
                .query_map([user_id], map_progress_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}
