//! Fixed-TTL cache for upstream API responses.
//!
//! Entries are keyed by endpoint plus a normalized parameter set and expire
//! a fixed duration after they were stored. Expired entries are evicted
//! lazily on lookup; there is no background sweep.

pub mod memory;

pub use memory::ResponseCache;

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Cache error types
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Point-in-time counters for the response cache.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub ttl_seconds: i64,
}

/// Build a deterministic cache key from an endpoint and its parameters.
/// Parameters are sorted so equal sets produce equal keys regardless of
/// insertion order.
pub fn cache_key(endpoint: &str, params: Option<&HashMap<String, String>>) -> String {
    let sorted: BTreeMap<&str, &str> = params
        .map(|p| p.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect())
        .unwrap_or_default();
    format!(
        "{}:{}",
        endpoint,
        serde_json::to_string(&sorted).unwrap_or_default()
    )
}
