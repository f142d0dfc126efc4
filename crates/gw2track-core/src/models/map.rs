use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::progress_key;

/// Point-of-interest type tag marking a waypoint.
pub const WAYPOINT_POI_TYPE: &str = "waypoint";

// ===== Wire schema =====

#[derive(Debug, Clone, Deserialize)]
pub struct MapResponse {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub min_level: u32,
    #[serde(default)]
    pub max_level: u32,
    #[serde(default)]
    pub default_floor: i32,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub floors: Vec<i32>,
    #[serde(default)]
    pub region_id: Option<u32>,
    #[serde(default)]
    pub region_name: Option<String>,
    #[serde(default)]
    pub continent_id: Option<u32>,
    #[serde(default)]
    pub continent_name: Option<String>,
    #[serde(default)]
    pub map_rect: Option<[[f64; 2]; 2]>,
    #[serde(default)]
    pub continent_rect: Option<[[f64; 2]; 2]>,
}

/// `/continents/{continent}/floors/{floor}`, trimmed to what waypoint extraction reads.
#[derive(Debug, Clone, Deserialize)]
pub struct ContinentFloorResponse {
    #[serde(default)]
    pub regions: BTreeMap<String, FloorRegion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FloorRegion {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub maps: BTreeMap<String, FloorMap>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FloorMap {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub points_of_interest: PointsOfInterest,
}

/// Upstream has served POIs both as a list and as an object keyed by id.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PointsOfInterest {
    List(Vec<PointOfInterest>),
    Keyed(BTreeMap<String, PointOfInterest>),
}

impl Default for PointsOfInterest {
    fn default() -> Self {
        PointsOfInterest::List(Vec::new())
    }
}

impl PointsOfInterest {
    pub fn iter(&self) -> Box<dyn Iterator<Item = &PointOfInterest> + '_> {
        match self {
            PointsOfInterest::List(points) => Box::new(points.iter()),
            PointsOfInterest::Keyed(points) => Box::new(points.values()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PointOfInterest {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub floor: i32,
    pub coord: [f64; 2],
}

impl ContinentFloorResponse {
    /// Flatten every waypoint on the floor, ordered by map id then waypoint id.
    pub fn waypoints(&self) -> Vec<Waypoint> {
        let mut waypoints: Vec<Waypoint> = self
            .regions
            .values()
            .flat_map(|region| region.maps.iter())
            .filter_map(|(map_id, map)| map_id.parse::<u32>().ok().map(|id| (id, map)))
            .flat_map(|(map_id, map)| {
                map.points_of_interest
                    .iter()
                    .filter(|poi| poi.kind == WAYPOINT_POI_TYPE)
                    .map(move |poi| Waypoint {
                        id: poi.id,
                        name: poi.name.clone(),
                        coord: poi.coord,
                        map_id,
                        map_name: map.name.clone(),
                        floor: poi.floor,
                    })
            })
            .collect();
        waypoints.sort_by_key(|wp| (wp.map_id, wp.id));
        waypoints
    }
}

// ===== Local schema =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Map {
    pub id: u32,
    pub name: String,
    pub min_level: u32,
    pub max_level: u32,
    pub default_floor: i32,
    #[serde(rename = "type")]
    pub kind: String,
    pub floors: Vec<i32>,
    pub region_id: Option<u32>,
    pub region_name: Option<String>,
    pub continent_id: Option<u32>,
    pub continent_name: Option<String>,
    pub map_rect: Option<[[f64; 2]; 2]>,
    pub continent_rect: Option<[[f64; 2]; 2]>,
}

impl Map {
    pub fn from_api(response: MapResponse) -> Self {
        Self {
            id: response.id,
            name: response.name,
            min_level: response.min_level,
            max_level: response.max_level,
            default_floor: response.default_floor,
            kind: response.kind,
            floors: response.floors,
            region_id: response.region_id,
            region_name: response.region_name,
            continent_id: response.continent_id,
            continent_name: response.continent_name,
            map_rect: response.map_rect,
            continent_rect: response.continent_rect,
        }
    }

    pub fn level_range(&self) -> String {
        if self.min_level == self.max_level {
            self.min_level.to_string()
        } else {
            format!("{}-{}", self.min_level, self.max_level)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UserMapProgress {
    pub id: String,
    pub user_id: String,
    pub map_id: u32,
    pub completed: bool,
    pub last_updated: DateTime<Utc>,
}

impl UserMapProgress {
    pub fn new(user_id: &str, map_id: u32, completed: bool) -> Self {
        Self {
            id: progress_key(user_id, map_id),
            user_id: user_id.to_string(),
            map_id,
            completed,
            last_updated: super::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Waypoint {
    pub id: u32,
    pub name: String,
    pub coord: [f64; 2],
    pub map_id: u32,
    pub map_name: String,
    pub floor: i32,
}

impl Waypoint {
    pub fn coord_display(&self) -> String {
        format!("({:.0}, {:.0})", self.coord[0], self.coord[1])
    }
}
