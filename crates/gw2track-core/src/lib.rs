//! Core library for gw2track.
//!
//! Tracks progress of up to ten Guild Wars 2 accounts against the shared
//! achievement, mastery and map catalogs. The pieces, leaf first:
//!
//! - [`api::RateLimiter`]: token-bucket admission and exponential backoff
//! - [`store::Store`]: SQLite tables for users, catalogs, progress and cache entries
//! - [`cache::CacheManager`]: TTL policy over the store's cache table
//! - [`api::ApiClient`]: rate-limited, retrying, deduplicating GET client
//! - [`services`]: per-domain fetch/transform/persist and multi-user sync
//! - [`tracker::Tracker`]: application state consumed by front ends

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod tracker;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
