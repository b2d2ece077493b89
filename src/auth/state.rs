use chrono::{DateTime, Duration, Utc};
use rand::{Rng, distr::Alphanumeric};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// 43 alphanumeric characters carry just under 256 bits of entropy.
const TOKEN_LENGTH: usize = 43;

struct Entry<T> {
    value: T,
    created_at: DateTime<Utc>,
}

/// Store that maps a fresh random token to a value and hands the value
/// back exactly once. Entries silently expire after the configured TTL;
/// an expired or already-consumed token behaves like one that never
/// existed, which is what blocks authorization-code replay.
pub struct OneTimeStore<T> {
    entries: RwLock<HashMap<String, Entry<T>>>,
    ttl: Duration,
}

impl<T> OneTimeStore<T> {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }

    /// Store a value and return the token that can consume it.
    pub async fn insert(&self, value: T) -> String {
        let token = generate_token(TOKEN_LENGTH);
        let mut entries = self.entries.write().await;
        entries.insert(
            token.clone(),
            Entry {
                value,
                created_at: Utc::now(),
            },
        );
        token
    }

    /// Remove and return the value for a token. Expired entries are swept
    /// while the write lock is held, so abandoned flows cannot accumulate
    /// past one TTL window.
    pub async fn consume(&self, token: &str) -> Option<T> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| now - entry.created_at < self.ttl);
        entries.remove(token).map(|entry| entry.value)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn generate_token(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
