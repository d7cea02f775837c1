//! Generic per-field TTL cache (§3 "Cache entry") shared by the Network
//! Status Aggregator (C10) and the Block Pipeline Orchestrator (C11).
//!
//! Read-mostly locking (§5): readers take the lock only long enough to
//! clone the stored value; writers swap in a whole new
//! `{value, inserted_at, ttl}` record so a reader never observes a
//! partial write (§8 invariant).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

#[derive(Clone)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V> Entry<V> {
    fn is_fresh(&self) -> bool {
        self.inserted_at.elapsed() < self.ttl
    }
}

/// A map of independently-expiring values, keyed by `K`, each with its own
/// `ttl` supplied at insert time (so one cache instance can back fields
/// with different TTLs, e.g. §3's nodes=5min/performance=1min/version=1h).
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
}

impl<K, V> Default for TtlCache<K, V>
where
    K: std::hash::Hash + Eq,
{
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value if present and not yet past its TTL.
    /// A stale entry is not evicted here — callers that want the stale
    /// value as a fallback (§4.10 "fall back to the stale cached value")
    /// use [`Self::get_even_if_stale`] instead.
    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.is_fresh())
            .map(|entry| entry.value.clone())
    }

    pub async fn insert(&self, key: K, value: V, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Returns the cached value regardless of freshness, for the
    /// degrade-gracefully fallback path (§4.10).
    pub async fn get_even_if_stale(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries.get(key).map(|entry| entry.value.clone())
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_entry_is_returned() {
        let cache: TtlCache<&str, u32> = TtlCache::new();
        cache.insert("a", 1, Duration::from_secs(60)).await;
        assert_eq!(cache.get(&"a").await, Some(1));
    }

    #[tokio::test]
    async fn expired_entry_is_not_returned_by_get_but_is_by_get_even_if_stale() {
        let cache: TtlCache<&str, u32> = TtlCache::new();
        cache.insert("a", 1, Duration::from_millis(1)).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(cache.get(&"a").await, None);
        assert_eq!(cache.get_even_if_stale(&"a").await, Some(1));
    }

    #[tokio::test]
    async fn missing_key_is_none_on_both_paths() {
        let cache: TtlCache<&str, u32> = TtlCache::new();
        assert_eq!(cache.get(&"missing").await, None);
        assert_eq!(cache.get_even_if_stale(&"missing").await, None);
    }
}
