//! In-process response cache
//!
//! Provides:
//! - Generic get/set operations with TTL
//! - Prefix-based invalidation for write paths
//!
//! The deployment is single-process with a single database, so the cache is
//! an in-memory map owned by the application state and passed into handlers
//! rather than a process-wide singleton.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

struct Entry {
    expires_at: Instant,
    value: serde_json::Value,
}

/// TTL response cache keyed by namespaced strings (e.g. `finance:<user>:…`)
pub struct ResponseCache {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
}

impl ResponseCache {
    /// Create a cache with the given entry TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Fetch a cached value, if present and not expired
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        serde_json::from_value(entry.value.clone()).ok()
    }

    /// Store a value under the key for the configured TTL
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                debug!(key, error = %e, "Skipping cache store for unserializable value");
                return;
            }
        };
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| e.expires_at > Instant::now());
        entries.insert(
            key.to_string(),
            Entry {
                expires_at: Instant::now() + self.ttl,
                value,
            },
        );
    }

    /// Drop every entry whose key starts with the prefix
    pub async fn invalidate_prefix(&self, prefix: &str) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        let dropped = before - entries.len();
        if dropped > 0 {
            debug!(prefix, dropped, "Cache entries invalidated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.set("finance:u1:all", &42i64).await;

        let hit: Option<i64> = cache.get("finance:u1:all").await;
        assert_eq!(hit, Some(42));

        let miss: Option<i64> = cache.get("finance:u2:all").await;
        assert_eq!(miss, None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = ResponseCache::new(Duration::from_millis(0));
        cache.set("k", &1i64).await;

        let hit: Option<i64> = cache.get("k").await;
        assert_eq!(hit, None);
    }

    #[tokio::test]
    async fn test_invalidate_prefix() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.set("finance:u1:all", &1i64).await;
        cache.set("finance:u1:2024", &2i64).await;
        cache.set("finance:u2:all", &3i64).await;

        cache.invalidate_prefix("finance:u1").await;

        assert_eq!(cache.get::<i64>("finance:u1:all").await, None);
        assert_eq!(cache.get::<i64>("finance:u1:2024").await, None);
        assert_eq!(cache.get::<i64>("finance:u2:all").await, Some(3));
    }
}
