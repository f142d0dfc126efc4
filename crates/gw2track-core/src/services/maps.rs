use tracing::{debug, info, warn};

use super::fetch_by_ids;
use crate::api::{ApiClient, RequestOptions};
use crate::cache::{keys, ttl};
use crate::models::{ContinentFloorResponse, Map, MapResponse, UserMapProgress, Waypoint};
use crate::store::Store;
use crate::utils::contains_ignore_case;
use crate::Result;

/// Continent and floor the waypoint views default to (Tyria, surface).
pub const DEFAULT_CONTINENT: u32 = 1;
pub const DEFAULT_FLOOR: i32 = 1;

/// Map catalog, derived waypoints and locally tracked map completion.
///
/// Map completion has no upstream endpoint, so there is no per-user sync here;
/// progress is whatever the user marked.
#[derive(Clone)]
pub struct MapService {
    api: ApiClient,
    store: Store,
}

impl MapService {
    pub fn new(api: ApiClient, store: Store) -> Self {
        Self { api, store }
    }

    pub async fn get_all(&self, force: bool) -> Result<Vec<Map>> {
        if !force {
            match self.store.map_count() {
                Ok(count) if count > 0 => return Ok(self.store.maps()?),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Failed to read map catalog, refetching"),
            }
        }

        let ids: Vec<u32> = self
            .api
            .get(
                "/maps",
                RequestOptions::new().cache(keys::MAP_IDS, ttl::CATALOG).deduplicate(),
            )
            .await?;

        let maps: Vec<Map> = fetch_by_ids::<MapResponse>(&self.api, "/maps", &ids)
            .await?
            .into_iter()
            .map(Map::from_api)
            .collect();

        self.store.upsert_maps(&maps)?;
        info!(count = maps.len(), "Refreshed map catalog");
        Ok(maps)
    }

    /// Every waypoint on a continent floor, cached per floor for the catalog TTL.
    pub async fn get_waypoints(&self, continent: u32, floor: i32) -> Result<Vec<Waypoint>> {
        let key = keys::waypoints(continent, floor);
        if let Some(waypoints) = self.api.cache().get::<Vec<Waypoint>>(&key) {
            debug!(continent, floor, count = waypoints.len(), "Waypoints cache hit");
            return Ok(waypoints);
        }

        let floor_data: ContinentFloorResponse = self
            .api
            .get(
                &format!("/continents/{}/floors/{}", continent, floor),
                RequestOptions::new().deduplicate(),
            )
            .await?;

        let waypoints = floor_data.waypoints();
        self.api.cache().set(&key, &waypoints, ttl::CATALOG);
        debug!(continent, floor, count = waypoints.len(), "Extracted waypoints");
        Ok(waypoints)
    }

    /// Waypoints whose name or map name contains `query`, ignoring case.
    /// A blank query matches everything.
    pub async fn search_waypoints(&self, query: &str, continent: u32, floor: i32) -> Result<Vec<Waypoint>> {
        let waypoints = self.get_waypoints(continent, floor).await?;
        let query = query.trim();
        if query.is_empty() {
            return Ok(waypoints);
        }
        Ok(waypoints
            .into_iter()
            .filter(|wp| contains_ignore_case(&wp.name, query) || contains_ignore_case(&wp.map_name, query))
            .collect())
    }

    pub fn map(&self, id: u32) -> Result<Option<Map>> {
        Ok(self.store.map(id)?)
    }

    pub fn by_type(&self, kind: &str) -> Result<Vec<Map>> {
        Ok(self.store.maps_by_type(kind)?)
    }

    pub fn by_region(&self, region_id: u32) -> Result<Vec<Map>> {
        Ok(self.store.maps_by_region(region_id)?)
    }

    pub fn by_continent(&self, continent_id: u32) -> Result<Vec<Map>> {
        Ok(self.store.maps_by_continent(continent_id)?)
    }

    pub fn get_user_progress(&self, user_id: &str) -> Result<Vec<UserMapProgress>> {
        Ok(self.store.user_map_progress(user_id)?)
    }

    pub fn set_map_completed(&self, user_id: &str, map_id: u32, completed: bool) -> Result<UserMapProgress> {
        let row = UserMapProgress::new(user_id, map_id, completed);
        self.store.upsert_user_map_progress(&row)?;
        debug!(user_id = user_id, map_id, completed, "Updated map completion");
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{map_json, mock_client_with_store, ok_json, requested_ids, sample_user, status, MockTransport};
    use serde_json::{json, Value};

    fn floor_json() -> Value {
        json!({
            "regions": {
                "4": {
                    "name": "Kryta",
                    "maps": {
                        "15": {
                            "name": "Queensdale",
                            "points_of_interest": [
                                {"id": 1, "name": "Shaemoor Waypoint", "type": "waypoint", "floor": 1, "coord": [1.0, 2.0]},
                                {"id": 2, "name": "Beetletun", "type": "landmark", "floor": 1, "coord": [3.0, 4.0]}
                            ]
                        },
                        "18": {
                            "name": "Divinity's Reach",
                            "points_of_interest": [
                                {"id": 5, "name": "Ossan Waypoint", "type": "waypoint", "floor": 1, "coord": [5.0, 6.0]}
                            ]
                        }
                    }
                }
            }
        })
    }

    #[tokio::test]
    async fn test_get_all_and_lookups() {
        let store = Store::open_in_memory().expect("store");
        let transport = MockTransport::new(|request| match request.query_value("ids") {
            None => ok_json(json!([15, 18])),
            Some(_) => ok_json(Value::Array(requested_ids(request).into_iter().map(map_json).collect())),
        });
        let service = MapService::new(mock_client_with_store(transport, store.clone()), store);

        assert_eq!(service.get_all(false).await.expect("maps").len(), 2);
        assert_eq!(service.by_type("Public").expect("type").len(), 2);
        assert_eq!(service.by_region(4).expect("region").len(), 2);
        assert_eq!(service.by_continent(2).expect("continent").len(), 0);
        assert_eq!(service.map(18).expect("map").map(|m| m.name), Some("Map 18".to_string()));
    }

    #[tokio::test]
    async fn test_waypoints_are_extracted_and_cached() {
        let store = Store::open_in_memory().expect("store");
        let transport = MockTransport::new(|request| {
            if request.path == "/continents/1/floors/1" {
                ok_json(floor_json())
            } else {
                status(404, "")
            }
        });
        let service = MapService::new(mock_client_with_store(transport.clone(), store.clone()), store);

        let waypoints = service.get_waypoints(DEFAULT_CONTINENT, DEFAULT_FLOOR).await.expect("waypoints");
        assert_eq!(
            waypoints.iter().map(|wp| wp.name.as_str()).collect::<Vec<_>>(),
            vec!["Shaemoor Waypoint", "Ossan Waypoint"]
        );
        assert_eq!(waypoints[1].map_name, "Divinity's Reach");

        let again = service.get_waypoints(1, 1).await.expect("cached");
        assert_eq!(again, waypoints);
        assert_eq!(transport.calls(), 1);

        let err = service.get_waypoints(1, 99).await.expect_err("missing floor");
        assert!(matches!(err, crate::Error::Api(crate::api::ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_search_waypoints() {
        let store = Store::open_in_memory().expect("store");
        let transport = MockTransport::new(|_| ok_json(floor_json()));
        let service = MapService::new(mock_client_with_store(transport, store.clone()), store);

        let by_name = service.search_waypoints("OSSAN", 1, 1).await.expect("search");
        assert_eq!(by_name.len(), 1);
        let by_map = service.search_waypoints("queens", 1, 1).await.expect("search");
        assert_eq!(by_map[0].id, 1);
        assert_eq!(service.search_waypoints("  ", 1, 1).await.expect("search").len(), 2);
    }

    #[tokio::test]
    async fn test_map_completion_is_local() {
        let store = Store::open_in_memory().expect("store");
        let user = sample_user("Alice", "KEY-A");
        store.insert_user(&user).expect("user");
        let transport = MockTransport::new(|_| status(500, ""));
        let service = MapService::new(mock_client_with_store(transport.clone(), store.clone()), store);

        service.set_map_completed(&user.id, 15, true).expect("set");
        service.set_map_completed(&user.id, 18, false).expect("set");
        let progress = service.get_user_progress(&user.id).expect("progress");
        assert_eq!(progress.len(), 2);
        assert!(progress[0].completed);
        assert_eq!(progress[0].id, format!("{}-15", user.id));
        assert_eq!(transport.calls(), 0);
    }
}
