//! Local persistent store backed by SQLite.
//!
//! One database file holds every table: users, the three catalogs, per-user
//! progress for each catalog, and the generic TTL cache. Catalog rows keep their
//! indexed columns alongside the full entity as JSON; progress rows are fully
//! columnar so the `(user_id, done)` style lookups stay index-only.
//!
//! Location: `~/.local/share/gw2track/gw2track.db` unless configured.

mod cache;
mod catalog;
mod progress;
mod users;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Params, Transaction};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

pub use cache::CacheRow;
pub use users::{RemovalSummary, MAX_USERS};

/// Bump when the table layout changes.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to encode stored value: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),

    #[error("Maximum of {0} users allowed")]
    UserLimitReached(usize),

    #[error("This API key is already added")]
    DuplicateCredential,

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Store is closed")]
    Closed,
}

/// Handle to the database. Clones share one connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Option<Connection>>>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open or create the store at a specific path
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened store");
        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    /// Open a private in-memory store
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Close the connection. Every clone sees the store as closed afterwards.
    pub fn close(&self) -> Result<(), StoreError> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
            debug!("Closed store");
        }
        Ok(())
    }

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        f(conn)
    }

    /// Run `f` inside one transaction; any error rolls everything back.
    pub(crate) fn with_tx<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = guard.as_mut().ok_or(StoreError::Closed)?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            api_key TEXT NOT NULL UNIQUE,
            account_name TEXT,
            account_id TEXT,
            permissions TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            last_synced INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_users_name ON users(name);
        CREATE INDEX IF NOT EXISTS idx_users_account_id ON users(account_id);

        CREATE TABLE IF NOT EXISTS achievements (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            type TEXT NOT NULL,
            data TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_achievements_name ON achievements(name);
        CREATE INDEX IF NOT EXISTS idx_achievements_type ON achievements(type);

        CREATE TABLE IF NOT EXISTS achievement_category_members (
            achievement_id INTEGER NOT NULL,
            category_id INTEGER NOT NULL,
            PRIMARY KEY (achievement_id, category_id)
        );
        CREATE INDEX IF NOT EXISTS idx_category_members_category
            ON achievement_category_members(category_id);

        CREATE TABLE IF NOT EXISTS achievement_categories (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            data TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_achievements (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            achievement_id INTEGER NOT NULL,
            done INTEGER NOT NULL,
            current INTEGER,
            max INTEGER,
            bits TEXT,
            repeated INTEGER,
            unlocked INTEGER,
            last_updated INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_user_achievements_user ON user_achievements(user_id);
        CREATE INDEX IF NOT EXISTS idx_user_achievements_achievement
            ON user_achievements(achievement_id);
        CREATE INDEX IF NOT EXISTS idx_user_achievements_user_done
            ON user_achievements(user_id, done);

        CREATE TABLE IF NOT EXISTS masteries (
            id INTEGER PRIMARY KEY,
            region TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            data TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_masteries_region ON masteries(region);

        CREATE TABLE IF NOT EXISTS user_masteries (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            mastery_id INTEGER NOT NULL,
            level INTEGER NOT NULL,
            last_updated INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_user_masteries_user ON user_masteries(user_id);
        CREATE INDEX IF NOT EXISTS idx_user_masteries_mastery ON user_masteries(mastery_id);

        CREATE TABLE IF NOT EXISTS maps (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            type TEXT NOT NULL,
            region_id INTEGER,
            continent_id INTEGER,
            data TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_maps_name ON maps(name);
        CREATE INDEX IF NOT EXISTS idx_maps_type ON maps(type);
        CREATE INDEX IF NOT EXISTS idx_maps_region ON maps(region_id);
        CREATE INDEX IF NOT EXISTS idx_maps_continent ON maps(continent_id);

        CREATE TABLE IF NOT EXISTS user_map_progress (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            map_id INTEGER NOT NULL,
            completed INTEGER NOT NULL,
            last_updated INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_user_map_progress_user ON user_map_progress(user_id);
        CREATE INDEX IF NOT EXISTS idx_user_map_progress_map ON user_map_progress(map_id);
        CREATE INDEX IF NOT EXISTS idx_user_map_progress_completed
            ON user_map_progress(completed);

        CREATE TABLE IF NOT EXISTS cache (
            key TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_cache_expires_at ON cache(expires_at);
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

// ===== Row helpers =====

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Run a query whose first column is a JSON document and decode each row.
pub(crate) fn query_json<T: DeserializeOwned, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<T>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
    rows.map(|row| Ok(serde_json::from_str(&row?)?)).collect()
}
