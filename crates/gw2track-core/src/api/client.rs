//! Client for the Guild Wars 2 v2 REST API.
//!
//! Every call goes cache first, then through the rate limiter to the
//! transport, retrying 429s and lost responses with exponential backoff.
//! Callers that opt into deduplication share one upstream call per request
//! signature while it is in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{ApiError, ApiRequest, RateLimiter, Transport};
use crate::cache::CacheManager;

// ============================================================================
// Constants
// ============================================================================

/// Retries after the first attempt for 429s and lost responses.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

type SharedResponse = Shared<BoxFuture<'static, Result<Value, ApiError>>>;

/// Write-through cache target for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSpec {
    pub key: String,
    pub ttl: Duration,
}

/// Per-call options for [`ApiClient::get`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub credential: Option<String>,
    pub query: Vec<(String, String)>,
    pub cache: Option<CacheSpec>,
    pub deduplicate: bool,
    /// Falls back to the client default when unset.
    pub max_retries: Option<u32>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn cache(mut self, key: impl Into<String>, ttl: Duration) -> Self {
        self.cache = Some(CacheSpec {
            key: key.into(),
            ttl,
        });
        self
    }

    pub fn deduplicate(mut self) -> Self {
        self.deduplicate = true;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }
}

/// Dedup signature: path, sorted query and the credential. Two users asking
/// for the same path never share a response.
fn request_key(path: &str, query: &[(String, String)], credential: Option<&str>) -> String {
    let mut query: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    query.sort();
    format!("{}?{}#{}", path, query.join("&"), credential.unwrap_or(""))
}

fn parse_body(path: &str, body: &str) -> Result<Value, ApiError> {
    serde_json::from_str(body)
        .map_err(|e| ApiError::Validation(format!("{} returned malformed JSON: {}", path, e)))
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    limiter: RateLimiter,
    cache: CacheManager,
    in_flight: Mutex<HashMap<String, SharedResponse>>,
    max_retries: u32,
}

impl ClientInner {
    /// One logical call: rate-limited attempts until success, a final error,
    /// or the retry budget runs out.
    async fn execute(&self, request: &ApiRequest, max_retries: u32) -> Result<Value, ApiError> {
        let mut attempt = 0;
        loop {
            self.limiter.acquire().await;

            let error = match self.transport.get(request).await {
                Ok(response) if response.is_success() => {
                    return parse_body(&request.path, &response.body);
                }
                Ok(response) => ApiError::from_status(response.status, &request.path, &response.body),
                Err(e) => ApiError::Network(e.0),
            };

            if !error.is_retryable() {
                debug!(path = %request.path, error = %error, "Request failed");
                return Err(error);
            }
            if attempt >= max_retries {
                warn!(path = %request.path, attempts = attempt + 1, error = %error, "Retries exhausted");
                return Err(error);
            }

            let backoff_ms = RateLimiter::backoff_delay(attempt).as_millis() as u64;
            match error {
                ApiError::RateLimited => warn!(
                    path = %request.path,
                    retry = attempt + 1,
                    backoff_ms = backoff_ms,
                    "Rate limited, backing off"
                ),
                _ => warn!(
                    path = %request.path,
                    retry = attempt + 1,
                    backoff_ms = backoff_ms,
                    error = %error,
                    "No response, backing off"
                ),
            }
            self.limiter.backoff(attempt).await;
            attempt += 1;
        }
    }
}

/// Upstream API client.
/// Clone is cheap - clones share the limiter, cache and in-flight registry.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        limiter: RateLimiter,
        cache: CacheManager,
        max_retries: u32,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                limiter,
                cache,
                in_flight: Mutex::new(HashMap::new()),
                max_retries,
            }),
        }
    }

    pub fn cache(&self) -> &CacheManager {
        &self.inner.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    /// Number of deduplicated requests currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// GET `path` and decode the JSON body as `T`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        if let Some(target) = &options.cache {
            if let Some(value) = self.inner.cache.get::<T>(&target.key) {
                debug!(path = path, "Cache hit");
                return Ok(value);
            }
        }

        let value = if options.deduplicate {
            self.shared_request(path, &options).await?
        } else {
            let request = ApiRequest {
                path: path.to_string(),
                query: options.query.clone(),
                credential: options.credential.clone(),
            };
            let max_retries = options.max_retries.unwrap_or(self.inner.max_retries);
            self.inner.execute(&request, max_retries).await?
        };

        let decoded = <T as Deserialize>::deserialize(&value)
            .map_err(|e| ApiError::Validation(format!("{} returned an unexpected shape: {}", path, e)))?;

        if let Some(target) = &options.cache {
            self.inner.cache.set(&target.key, &value, target.ttl);
        }
        Ok(decoded)
    }

    /// Join the in-flight call for this signature or start one.
    ///
    /// The call runs as its own task so it settles even if every waiter is
    /// dropped; the task removes its registry entry when it settles.
    fn shared_request(&self, path: &str, options: &RequestOptions) -> SharedResponse {
        let key = request_key(path, &options.query, options.credential.as_deref());
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = in_flight.get(&key) {
            debug!(path = path, "Joining in-flight request");
            return existing.clone();
        }

        let request = ApiRequest {
            path: path.to_string(),
            query: options.query.clone(),
            credential: options.credential.clone(),
        };
        let max_retries = options.max_retries.unwrap_or(self.inner.max_retries);
        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();

        // The registry lock is held until the entry is inserted, so the task
        // cannot remove it first.
        let handle = tokio::spawn(async move {
            let result = inner.execute(&request, max_retries).await;
            inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&task_key);
            result
        });

        let shared = async move {
            handle
                .await
                .unwrap_or_else(|e| Err(ApiError::Network(format!("Request task failed: {}", e))))
        }
        .boxed()
        .shared();

        in_flight.insert(key, shared.clone());
        shared
    }
}
