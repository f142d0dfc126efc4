use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::progress_key;

/// Mastery regions as reported upstream. Unrecognized names land in `Unknown`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum MasteryRegion {
    Tyria,
    Maguuma,
    Desert,
    Tundra,
    Jade,
    Sky,
    Wild,
    Magic,
    #[serde(other)]
    Unknown,
}

impl MasteryRegion {
    pub const ALL: [MasteryRegion; 8] = [
        MasteryRegion::Tyria,
        MasteryRegion::Maguuma,
        MasteryRegion::Desert,
        MasteryRegion::Tundra,
        MasteryRegion::Jade,
        MasteryRegion::Sky,
        MasteryRegion::Wild,
        MasteryRegion::Magic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MasteryRegion::Tyria => "Tyria",
            MasteryRegion::Maguuma => "Maguuma",
            MasteryRegion::Desert => "Desert",
            MasteryRegion::Tundra => "Tundra",
            MasteryRegion::Jade => "Jade",
            MasteryRegion::Sky => "Sky",
            MasteryRegion::Wild => "Wild",
            MasteryRegion::Magic => "Magic",
            MasteryRegion::Unknown => "Unknown",
        }
    }

    /// Expansion-facing name for display.
    pub fn display_name(&self) -> &'static str {
        match self {
            MasteryRegion::Tyria => "Central Tyria",
            MasteryRegion::Maguuma => "Heart of Thorns",
            MasteryRegion::Desert => "Path of Fire",
            MasteryRegion::Tundra => "Icebrood Saga",
            MasteryRegion::Jade => "End of Dragons",
            MasteryRegion::Sky => "Secrets of the Obscure",
            MasteryRegion::Wild => "Janthir Wilds",
            MasteryRegion::Magic => "Visions of Eternity",
            MasteryRegion::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for MasteryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MasteryRegion {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::ALL
            .into_iter()
            .find(|region| region.as_str().eq_ignore_ascii_case(s))
            .unwrap_or(MasteryRegion::Unknown))
    }
}

// ===== Wire schema =====

#[derive(Debug, Clone, Deserialize)]
pub struct MasteryResponse {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub requirement: String,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub background: String,
    pub region: MasteryRegion,
    pub levels: Vec<MasteryLevelResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MasteryLevelResponse {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub icon: String,
    pub point_cost: u32,
    pub exp_cost: u64,
}

/// `/account/masteries` item. `level` is 0-indexed.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountMasteryResponse {
    pub id: u32,
    pub level: u32,
}

// ===== Local schema =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Mastery {
    pub id: u32,
    pub name: String,
    pub requirement: String,
    pub order: i32,
    pub background: String,
    pub region: MasteryRegion,
    pub levels: Vec<MasteryLevel>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct MasteryLevel {
    pub name: String,
    pub description: String,
    pub instruction: String,
    pub icon: String,
    pub point_cost: u32,
    pub exp_cost: u64,
}

impl Mastery {
    pub fn from_api(response: MasteryResponse) -> Self {
        Self {
            id: response.id,
            name: response.name,
            requirement: response.requirement,
            order: response.order,
            background: response.background,
            region: response.region,
            levels: response
                .levels
                .into_iter()
                .map(|level| MasteryLevel {
                    name: level.name,
                    description: level.description,
                    instruction: level.instruction,
                    icon: level.icon,
                    point_cost: level.point_cost,
                    exp_cost: level.exp_cost,
                })
                .collect(),
        }
    }

    /// Mastery points needed to unlock every level.
    pub fn total_point_cost(&self) -> u32 {
        self.levels.iter().map(|l| l.point_cost).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UserMastery {
    pub id: String,
    pub user_id: String,
    pub mastery_id: u32,
    /// 1-indexed count of unlocked levels.
    pub level: u32,
    pub last_updated: DateTime<Utc>,
}

impl UserMastery {
    pub fn from_api(user_id: &str, response: &AccountMasteryResponse, now: DateTime<Utc>) -> Self {
        Self {
            id: progress_key(user_id, response.id),
            user_id: user_id.to_string(),
            mastery_id: response.id,
            level: response.level.saturating_add(1),
            last_updated: now,
        }
    }

    pub fn is_complete(&self, mastery: &Mastery) -> bool {
        self.level as usize >= mastery.levels.len()
    }
}
