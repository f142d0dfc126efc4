use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::progress_key;

// ===== Wire schema =====

/// `/achievements?ids=...` item.
#[derive(Debug, Clone, Deserialize)]
pub struct AchievementResponse {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirement: String,
    #[serde(default)]
    pub locked_text: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub tiers: Vec<AchievementTier>,
    #[serde(default)]
    pub prerequisites: Vec<u32>,
    #[serde(default)]
    pub rewards: Vec<AchievementReward>,
    #[serde(default)]
    pub bits: Vec<AchievementBit>,
    #[serde(default)]
    pub point_cap: Option<i32>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// `/achievements/categories?ids=...` item.
#[derive(Debug, Clone, Deserialize)]
pub struct AchievementCategoryResponse {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub achievements: Vec<u32>,
}

/// `/account/achievements` item.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountAchievementResponse {
    pub id: u32,
    #[serde(default)]
    pub bits: Option<Vec<u32>>,
    #[serde(default)]
    pub current: Option<u32>,
    #[serde(default)]
    pub max: Option<u32>,
    pub done: bool,
    #[serde(default)]
    pub repeated: Option<u32>,
    #[serde(default)]
    pub unlocked: Option<bool>,
}

// ===== Shared pieces =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AchievementTier {
    pub count: u32,
    pub points: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum AchievementReward {
    Coins { count: u32 },
    Item { id: u32, count: u32 },
    Mastery { id: u32, region: String },
    Title { id: u32 },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum AchievementBit {
    Text {
        #[serde(default)]
        text: String,
    },
    Item { id: u32 },
    Minipet { id: u32 },
    Skin { id: u32 },
    #[serde(other)]
    Unknown,
}

// ===== Local schema =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Achievement {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub requirement: String,
    pub locked_text: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub flags: Vec<String>,
    pub tiers: Vec<AchievementTier>,
    pub prerequisites: Vec<u32>,
    pub rewards: Vec<AchievementReward>,
    pub bits: Vec<AchievementBit>,
    pub point_cap: Option<i32>,
    pub icon: Option<String>,
    pub categories: Vec<u32>,
}

impl Achievement {
    pub fn from_api(response: AchievementResponse, categories: Vec<u32>) -> Self {
        Self {
            id: response.id,
            name: response.name,
            description: response.description,
            requirement: response.requirement,
            locked_text: response.locked_text.filter(|s| !s.is_empty()),
            kind: response.kind,
            flags: response.flags,
            tiers: response.tiers,
            prerequisites: response.prerequisites,
            rewards: response.rewards,
            bits: response.bits,
            point_cap: response.point_cap,
            icon: response.icon,
            categories,
        }
    }

    /// Sum of tier points.
    pub fn total_points(&self) -> u32 {
        self.tiers.iter().map(|t| t.points).sum()
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AchievementCategory {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub order: i32,
    pub icon: Option<String>,
    pub achievements: Vec<u32>,
}

impl AchievementCategory {
    pub fn from_api(response: AchievementCategoryResponse) -> Self {
        Self {
            id: response.id,
            name: response.name,
            description: response.description,
            order: response.order,
            icon: response.icon,
            achievements: response.achievements,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UserAchievement {
    pub id: String,
    pub user_id: String,
    pub achievement_id: u32,
    pub done: bool,
    pub current: Option<u32>,
    pub max: Option<u32>,
    pub bits: Option<Vec<u32>>,
    pub repeated: Option<u32>,
    pub unlocked: Option<bool>,
    pub last_updated: DateTime<Utc>,
}

impl UserAchievement {
    pub fn from_api(user_id: &str, response: AccountAchievementResponse, now: DateTime<Utc>) -> Self {
        Self {
            id: progress_key(user_id, response.id),
            user_id: user_id.to_string(),
            achievement_id: response.id,
            done: response.done,
            current: response.current,
            max: response.max,
            bits: response.bits,
            repeated: response.repeated,
            unlocked: response.unlocked,
            last_updated: now,
        }
    }

    pub fn status(&self) -> ProgressStatus {
        if self.done {
            ProgressStatus::Completed
        } else if self.current.unwrap_or(0) > 0 {
            ProgressStatus::InProgress
        } else {
            ProgressStatus::NotStarted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_achievement_response() {
        let json = r#"{
            "id": 1,
            "name": "Centaur Slayer",
            "description": "",
            "requirement": "Kill  centaurs.",
            "locked_text": "",
            "type": "Default",
            "flags": ["Pvp", "CategoryDisplay"],
            "tiers": [{"count": 100, "points": 1}, {"count": 500, "points": 5}, {"count": 1000, "points": 10}],
            "rewards": [
                {"type": "Coins", "count": 200},
                {"type": "Item", "id": 68392, "count": 1},
                {"type": "Mastery", "id": 29, "region": "Tyria"},
                {"type": "Title", "id": 12},
                {"type": "Unlock", "id": 7}
            ],
            "bits": [{"type": "Text", "text": "Slay a veteran"}, {"type": "Skin", "id": 5}],
            "point_cap": -1
        }"#;

        let response: AchievementResponse = serde_json::from_str(json).expect("achievement");
        let achievement = Achievement::from_api(response, vec![3]);

        assert_eq!(achievement.kind, "Default");
        assert_eq!(achievement.locked_text, None);
        assert_eq!(
            achievement.tiers,
            vec![
                AchievementTier { count: 100, points: 1 },
                AchievementTier { count: 500, points: 5 },
                AchievementTier { count: 1000, points: 10 },
            ]
        );
        assert_eq!(achievement.total_points(), 16);
        assert_eq!(achievement.rewards[2], AchievementReward::Mastery { id: 29, region: "Tyria".into() });
        assert_eq!(achievement.rewards[4], AchievementReward::Unknown);
        assert_eq!(achievement.bits[1], AchievementBit::Skin { id: 5 });
        assert!(achievement.has_flag("Pvp"));
        assert_eq!(achievement.categories, vec![3]);
    }

    #[test]
    fn test_achievement_missing_required_field_is_rejected() {
        let json = r#"{"id": 1, "name": "No type"}"#;
        assert!(serde_json::from_str::<AchievementResponse>(json).is_err());
    }

    #[test]
    fn test_local_schema_is_camel_case() {
        let json = serde_json::to_value(UserAchievement::from_api(
            "u1",
            AccountAchievementResponse {
                id: 7,
                bits: None,
                current: Some(3),
                max: Some(10),
                done: false,
                repeated: None,
                unlocked: Some(true),
            },
            Utc::now(),
        ))
        .expect("serialize");
        assert_eq!(json["achievementId"], 7);
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["id"], "u1-7");
        assert!(json.get("lastUpdated").is_some());
    }

    #[test]
    fn test_progress_status() {
        let mut progress = UserAchievement::from_api(
            "u1",
            AccountAchievementResponse {
                id: 1,
                bits: Some(vec![0, 2]),
                current: Some(0),
                max: Some(5),
                done: false,
                repeated: None,
                unlocked: None,
            },
            Utc::now(),
        );
        assert_eq!(progress.status(), ProgressStatus::NotStarted);
        progress.current = Some(2);
        assert_eq!(progress.status(), ProgressStatus::InProgress);
        progress.done = true;
        assert_eq!(progress.status(), ProgressStatus::Completed);
    }
}
