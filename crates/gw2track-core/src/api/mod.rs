//! Upstream API access.
//!
//! - [`RateLimiter`]: token bucket shared by every request
//! - [`Transport`] / [`HttpTransport`]: a single GET over reqwest, direct or via proxy
//! - [`ApiClient`]: cache, dedup and retry policy on top of the transport

pub mod client;
pub mod error;
pub mod rate_limit;
pub mod transport;

pub use client::{ApiClient, CacheSpec, RequestOptions, DEFAULT_MAX_RETRIES};
pub use error::ApiError;
pub use rate_limit::RateLimiter;
pub use transport::{
    ApiRequest, Endpoint, HttpTransport, Transport, TransportError, TransportResponse,
};
