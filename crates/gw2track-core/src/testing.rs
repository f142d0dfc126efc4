//! Test doubles and fixtures shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::api::{ApiClient, ApiRequest, RateLimiter, Transport, TransportError, TransportResponse};
use crate::cache::CacheManager;
use crate::models::{
    AccountAchievementResponse, AccountInfo, AccountMasteryResponse, Achievement, AchievementTier,
    Map, Mastery, MasteryLevel, MasteryRegion, TokenInfo, User,
};
use crate::store::Store;

type Handler = dyn Fn(&ApiRequest) -> Result<TransportResponse, TransportError> + Send + Sync;

/// Scripted transport that records every request it sees.
pub(crate) struct MockTransport {
    handler: Box<Handler>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new(
        handler: impl Fn(&ApiRequest) -> Result<TransportResponse, TransportError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Like `new`, but every response arrives after `delay`.
    pub fn with_delay(
        handler: impl Fn(&ApiRequest) -> Result<TransportResponse, TransportError> + Send + Sync + 'static,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, request: &ApiRequest) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(request)
    }
}

pub(crate) fn ok_json(body: Value) -> Result<TransportResponse, TransportError> {
    Ok(TransportResponse {
        status: 200,
        body: body.to_string(),
    })
}

pub(crate) fn status(code: u16, body: &str) -> Result<TransportResponse, TransportError> {
    Ok(TransportResponse {
        status: code,
        body: body.to_string(),
    })
}

/// Requested ids parsed from an `ids=1,2,3` query.
pub(crate) fn requested_ids(request: &ApiRequest) -> Vec<u32> {
    request
        .query_value("ids")
        .map(|ids| ids.split(',').filter_map(|id| id.parse().ok()).collect())
        .unwrap_or_default()
}

/// Client over a fresh in-memory store with a bucket large enough to never wait.
pub(crate) fn mock_client(transport: Arc<MockTransport>) -> ApiClient {
    mock_client_with_store(transport, Store::open_in_memory().expect("store"))
}

pub(crate) fn mock_client_with_store(transport: Arc<MockTransport>, store: Store) -> ApiClient {
    ApiClient::new(
        transport,
        RateLimiter::new(10_000, Duration::from_secs(1)),
        CacheManager::new(store),
        crate::api::DEFAULT_MAX_RETRIES,
    )
}

// ===== Fixtures =====

pub(crate) fn sample_user(name: &str, api_key: &str) -> User {
    let account = AccountInfo {
        id: format!("account-{}", name),
        name: format!("{}.1234", name),
        world: None,
        created: None,
        access: vec!["GuildWars2".to_string()],
    };
    let token = TokenInfo {
        id: format!("token-{}", name),
        name: "tracker".to_string(),
        permissions: vec!["account".to_string(), "progression".to_string()],
    };
    User::new(name, api_key, &account, &token)
}

pub(crate) fn sample_achievement(id: u32) -> Achievement {
    Achievement {
        id,
        name: format!("Achievement {}", id),
        description: String::new(),
        requirement: "Do the thing.".to_string(),
        locked_text: None,
        kind: "Default".to_string(),
        flags: vec!["Permanent".to_string()],
        tiers: vec![
            AchievementTier { count: 1, points: 5 },
            AchievementTier { count: 5, points: 10 },
        ],
        prerequisites: Vec::new(),
        rewards: Vec::new(),
        bits: Vec::new(),
        point_cap: None,
        icon: None,
        categories: Vec::new(),
    }
}

pub(crate) fn sample_mastery(id: u32, levels: usize) -> Mastery {
    Mastery {
        id,
        name: format!("Mastery {}", id),
        requirement: String::new(),
        order: id as i32,
        background: String::new(),
        region: MasteryRegion::Maguuma,
        levels: (0..levels)
            .map(|i| MasteryLevel {
                name: format!("Level {}", i + 1),
                description: String::new(),
                instruction: String::new(),
                icon: String::new(),
                point_cost: 1,
                exp_cost: 254_000,
            })
            .collect(),
    }
}

pub(crate) fn sample_map(id: u32) -> Map {
    Map {
        id,
        name: format!("Map {}", id),
        min_level: 1,
        max_level: 15,
        default_floor: 1,
        kind: "Public".to_string(),
        floors: vec![0, 1],
        region_id: Some(4),
        region_name: Some("Kryta".to_string()),
        continent_id: Some(1),
        continent_name: Some("Tyria".to_string()),
        map_rect: None,
        continent_rect: None,
    }
}

pub(crate) fn account_progress(id: u32, done: bool) -> AccountAchievementResponse {
    AccountAchievementResponse {
        id,
        bits: None,
        current: Some(if done { 5 } else { 0 }),
        max: Some(5),
        done,
        repeated: None,
        unlocked: None,
    }
}

pub(crate) fn mastery_progress(id: u32, level: u32) -> AccountMasteryResponse {
    AccountMasteryResponse { id, level }
}

/// Upstream JSON for an achievement with the given id.
pub(crate) fn achievement_json(id: u32) -> Value {
    serde_json::json!({
        "id": id,
        "name": format!("Achievement {}", id),
        "description": "",
        "requirement": "Do the thing.",
        "locked_text": "",
        "type": "Default",
        "flags": ["Permanent"],
        "tiers": [{"count": 1, "points": 5}, {"count": 5, "points": 10}]
    })
}

pub(crate) fn mastery_json(id: u32, region: &str) -> Value {
    serde_json::json!({
        "id": id,
        "name": format!("Mastery {}", id),
        "requirement": "",
        "order": id,
        "background": "",
        "region": region,
        "levels": [
            {"name": "One", "description": "", "instruction": "", "icon": "", "point_cost": 1, "exp_cost": 254000},
            {"name": "Two", "description": "", "instruction": "", "icon": "", "point_cost": 2, "exp_cost": 508000}
        ]
    })
}

pub(crate) fn map_json(id: u32) -> Value {
    serde_json::json!({
        "id": id,
        "name": format!("Map {}", id),
        "min_level": 1,
        "max_level": 80,
        "default_floor": 1,
        "type": "Public",
        "floors": [1],
        "region_id": 4,
        "region_name": "Kryta",
        "continent_id": 1,
        "continent_name": "Tyria"
    })
}
