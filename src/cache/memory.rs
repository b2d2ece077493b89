use super::{CacheError, CacheResult, CacheStats};
use crate::health::{HealthCheckResult, HealthChecker};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Cache entry with its storage timestamp
#[derive(Clone, Debug)]
struct CacheEntry {
    data: String,
    stored_at: DateTime<Utc>,
}

impl CacheEntry {
    fn new(data: String) -> Self {
        Self {
            data,
            stored_at: Utc::now(),
        }
    }

    fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.stored_at >= ttl
    }
}

/// In-memory response cache with a fixed TTL for every entry
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }

    /// Look up a key, lazily evicting it if it has gone stale.
    pub async fn get<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        let store = self.store.read().await;

        if let Some(entry) = store.get(key) {
            if entry.is_expired(self.ttl, Utc::now()) {
                drop(store);
                let mut store = self.store.write().await;
                store.remove(key);
                return Ok(None);
            }

            let value = serde_json::from_str(&entry.data)
                .map_err(|e| CacheError::Serialization(e.to_string()))?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    /// Store a value under a key, overwriting any previous entry.
    pub async fn set<T>(&self, key: &str, value: &T) -> CacheResult<()>
    where
        T: serde::Serialize + Send + Sync,
    {
        let data =
            serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))?;

        let entry = CacheEntry::new(data);

        let mut store = self.store.write().await;
        store.insert(key.to_string(), entry);

        Ok(())
    }

    pub async fn stats(&self) -> CacheStats {
        let store = self.store.read().await;
        let now = Utc::now();
        let expired = store
            .values()
            .filter(|e| e.is_expired(self.ttl, now))
            .count();
        CacheStats {
            total_entries: store.len(),
            valid_entries: store.len() - expired,
            expired_entries: expired,
            ttl_seconds: self.ttl.num_seconds(),
        }
    }

    /// Drop every entry, returning how many were removed.
    pub async fn clear(&self) -> usize {
        let mut store = self.store.write().await;
        let cleared = store.len();
        store.clear();
        cleared
    }

    pub fn health_checker(&self) -> Arc<dyn HealthChecker> {
        Arc::new(ResponseCacheHealthChecker {
            cache: self.clone(),
        })
    }
}

struct ResponseCacheHealthChecker {
    cache: ResponseCache,
}

#[async_trait::async_trait]
impl HealthChecker for ResponseCacheHealthChecker {
    fn name(&self) -> &str {
        "response_cache"
    }

    async fn check(&self) -> HealthCheckResult {
        let stats = self.cache.stats().await;
        HealthCheckResult::healthy_with_details(json!({
            "total_entries": stats.total_entries,
            "valid_entries": stats.valid_entries,
            "expired_entries": stats.expired_entries,
            "ttl_seconds": stats.ttl_seconds,
        }))
    }
}
