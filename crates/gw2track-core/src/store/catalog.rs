//! Catalog tables: achievements (with category membership), achievement
//! categories, masteries and maps. Rows are replaced wholesale on refresh.

use rusqlite::{params, Connection};

use super::{query_json, Store, StoreError};
use crate::models::{Achievement, AchievementCategory, Map, Mastery, MasteryRegion};

fn count_rows(conn: &Connection, table: &str) -> Result<usize, StoreError> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;
    Ok(count as usize)
}

impl Store {
    // ===== Achievements =====

    pub fn upsert_achievements(&self, achievements: &[Achievement]) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            let mut upsert = tx.prepare(
                "INSERT INTO achievements (id, name, type, data) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name, type = excluded.type, data = excluded.data",
            )?;
            let mut clear_members =
                tx.prepare("DELETE FROM achievement_category_members WHERE achievement_id = ?1")?;
            let mut add_member = tx.prepare(
                "INSERT OR IGNORE INTO achievement_category_members (achievement_id, category_id)
                 VALUES (?1, ?2)",
            )?;

            for achievement in achievements {
                let data = serde_json::to_string(achievement)?;
                upsert.execute(params![achievement.id, achievement.name, achievement.kind, data])?;
                clear_members.execute([achievement.id])?;
                for category_id in &achievement.categories {
                    add_member.execute(params![achievement.id, category_id])?;
                }
            }
            Ok(())
        })
    }

    pub fn achievements(&self) -> Result<Vec<Achievement>, StoreError> {
        self.with_conn(|conn| query_json(conn, "SELECT data FROM achievements ORDER BY id", []))
    }

    pub fn achievement(&self, id: u32) -> Result<Option<Achievement>, StoreError> {
        self.with_conn(|conn| {
            Ok(query_json(conn, "SELECT data FROM achievements WHERE id = ?1", [id])?
                .into_iter()
                .next())
        })
    }

    pub fn achievements_in_category(&self, category_id: u32) -> Result<Vec<Achievement>, StoreError> {
        self.with_conn(|conn| {
            query_json(
                conn,
                "SELECT a.data FROM achievements a
                 JOIN achievement_category_members m ON m.achievement_id = a.id
                 WHERE m.category_id = ?1
                 ORDER BY a.id",
                [category_id],
            )
        })
    }

    pub fn achievement_count(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| count_rows(conn, "achievements"))
    }

    pub fn upsert_achievement_categories(
        &self,
        categories: &[AchievementCategory],
    ) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            let mut upsert = tx.prepare(
                "INSERT INTO achievement_categories (id, name, sort_order, data) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name, sort_order = excluded.sort_order, data = excluded.data",
            )?;
            for category in categories {
                let data = serde_json::to_string(category)?;
                upsert.execute(params![category.id, category.name, category.order, data])?;
            }
            Ok(())
        })
    }

    /// Categories in display order.
    pub fn achievement_categories(&self) -> Result<Vec<AchievementCategory>, StoreError> {
        self.with_conn(|conn| {
            query_json(
                conn,
                "SELECT data FROM achievement_categories ORDER BY sort_order, id",
                [],
            )
        })
    }

    // ===== Masteries =====

    pub fn upsert_masteries(&self, masteries: &[Mastery]) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            let mut upsert = tx.prepare(
                "INSERT INTO masteries (id, region, sort_order, data) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    region = excluded.region, sort_order = excluded.sort_order, data = excluded.data",
            )?;
            for mastery in masteries {
                let data = serde_json::to_string(mastery)?;
                upsert.execute(params![mastery.id, mastery.region.as_str(), mastery.order, data])?;
            }
            Ok(())
        })
    }

    pub fn masteries(&self) -> Result<Vec<Mastery>, StoreError> {
        self.with_conn(|conn| query_json(conn, "SELECT data FROM masteries ORDER BY id", []))
    }

    pub fn masteries_by_region(&self, region: MasteryRegion) -> Result<Vec<Mastery>, StoreError> {
        self.with_conn(|conn| {
            query_json(
                conn,
                "SELECT data FROM masteries WHERE region = ?1 ORDER BY sort_order, id",
                [region.as_str()],
            )
        })
    }

    pub fn mastery_count(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| count_rows(conn, "masteries"))
    }

    // ===== Maps =====

    pub fn upsert_maps(&self, maps: &[Map]) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            let mut upsert = tx.prepare(
                "INSERT INTO maps (id, name, type, region_id, continent_id, data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name, type = excluded.type, region_id = excluded.region_id,
                    continent_id = excluded.continent_id, data = excluded.data",
            )?;
            for map in maps {
                let data = serde_json::to_string(map)?;
                upsert.execute(params![
                    map.id,
                    map.name,
                    map.kind,
                    map.region_id,
                    map.continent_id,
                    data
                ])?;
            }
            Ok(())
        })
    }

    pub fn maps(&self) -> Result<Vec<Map>, StoreError> {
        self.with_conn(|conn| query_json(conn, "SELECT data FROM maps ORDER BY id", []))
    }

    pub fn map(&self, id: u32) -> Result<Option<Map>, StoreError> {
        self.with_conn(|conn| {
            Ok(query_json(conn, "SELECT data FROM maps WHERE id = ?1", [id])?
                .into_iter()
                .next())
        })
    }

    pub fn maps_by_type(&self, kind: &str) -> Result<Vec<Map>, StoreError> {
        self.with_conn(|conn| {
            query_json(conn, "SELECT data FROM maps WHERE type = ?1 ORDER BY id", [kind])
        })
    }

    pub fn maps_by_region(&self, region_id: u32) -> Result<Vec<Map>, StoreError> {
        self.with_conn(|conn| {
            query_json(conn, "SELECT data FROM maps WHERE region_id = ?1 ORDER BY id", [region_id])
        })
    }

    pub fn maps_by_continent(&self, continent_id: u32) -> Result<Vec<Map>, StoreError> {
        self.with_conn(|conn| {
            query_json(
                conn,
                "SELECT data FROM maps WHERE continent_id = ?1 ORDER BY id",
                [continent_id],
            )
        })
    }

    pub fn map_count(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| count_rows(conn, "maps"))
    }
}
