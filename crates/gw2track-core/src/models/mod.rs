//! Data models for Guild Wars 2 entities.
//!
//! Each domain file holds two layers:
//!
//! - `*Response` types: the upstream wire schema (snake_case), validated by serde
//!   at the ingest boundary
//! - local types: what the store persists and front ends consume (camelCase JSON)
//!
//! - `User`: a tracked account profile
//! - `Achievement`, `AchievementCategory`, `UserAchievement`
//! - `Mastery`, `UserMastery`
//! - `Map`, `UserMapProgress`, `Waypoint`
//! - `TokenInfo`, `AccountInfo`

use chrono::{DateTime, SubsecRound, Utc};

pub mod account;
pub mod achievement;
pub mod map;
pub mod mastery;
pub mod user;

pub use account::{AccountInfo, TokenInfo};
pub use achievement::{
    AccountAchievementResponse, Achievement, AchievementBit, AchievementCategory,
    AchievementCategoryResponse, AchievementResponse, AchievementReward, AchievementTier,
    ProgressStatus, UserAchievement,
};
pub use map::{ContinentFloorResponse, Map, MapResponse, UserMapProgress, Waypoint};
pub use mastery::{
    AccountMasteryResponse, Mastery, MasteryLevel, MasteryRegion, MasteryResponse, UserMastery,
};
pub use user::User;

/// Current time truncated to the milliseconds the store keeps, so a value
/// read back equals the value that was written.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Composite primary key for per-user progress rows.
pub fn progress_key(user_id: &str, entity_id: u32) -> String {
    format!("{}-{}", user_id, entity_id)
}
