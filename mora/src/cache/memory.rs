//! In-process response store with per-entry expiry

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::Instant;

use super::key::CacheKey;
use super::ResponseStore;
use crate::Result;

/// Longest lifetime an entry can get; larger TTLs are clamped to it
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn expiry(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(MAX_TTL))
        .unwrap_or(now)
}

#[derive(Clone, Debug)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// Bounded key→answer map. Expired entries read as absent and are purged on
/// write; when full, the entries closest to expiry are evicted first.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<CacheKey, MemoryEntry>>>,
    max_entries: usize,
}

impl MemoryStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            max_entries: max_entries.max(1),
        }
    }

    pub fn lookup(&self, key: &CacheKey) -> Option<String> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone())
    }

    pub fn insert(&self, key: &CacheKey, value: &str, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.write();

        entries.retain(|_, e| e.expires_at > now);

        if !entries.contains_key(key) {
            while entries.len() >= self.max_entries {
                let victim = entries
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at)
                    .map(|(k, _)| k.clone());
                match victim {
                    Some(k) => {
                        entries.remove(&k);
                        metrics::counter!("mora_response_cache_evictions_total").increment(1);
                    }
                    None => break,
                }
            }
        }

        entries.insert(
            key.clone(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: expiry(now, ttl),
            },
        );
    }

    /// Number of stored entries, including ones that expired but were not purged yet
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[async_trait]
impl ResponseStore for MemoryStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>> {
        Ok(self.lookup(key))
    }

    async fn set(&self, key: &CacheKey, value: &str, ttl: Duration) -> Result<()> {
        self.insert(key, value, ttl);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::derive_key;

    #[test]
    fn test_new_store_is_empty() {
        let store = MemoryStore::new(10);
        assert!(store.is_empty());
        assert!(store.lookup(&derive_key("s", "q")).is_none());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = MemoryStore::new(10);
        let key = derive_key("s1", "hello");
        store
            .set(&key, "Hi there", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("Hi there"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires() {
        let store = MemoryStore::new(10);
        let key = derive_key("s1", "hello");
        store.insert(&key, "Hi", Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(store.lookup(&key).as_deref(), Some("Hi"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.lookup(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_purged_on_write() {
        let store = MemoryStore::new(10);
        store.insert(&derive_key("s1", "a"), "A", Duration::from_secs(1));
        store.insert(&derive_key("s1", "b"), "B", Duration::from_secs(1));
        assert_eq!(store.len(), 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        store.insert(&derive_key("s1", "c"), "C", Duration::from_secs(60));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_soonest_expiry() {
        let store = MemoryStore::new(2);
        let short = derive_key("s1", "short");
        let long = derive_key("s1", "long");
        let newest = derive_key("s1", "newest");

        store.insert(&short, "1", Duration::from_secs(10));
        store.insert(&long, "2", Duration::from_secs(100));
        store.insert(&newest, "3", Duration::from_secs(50));

        assert_eq!(store.len(), 2);
        assert!(store.lookup(&short).is_none());
        assert!(store.lookup(&long).is_some());
        assert!(store.lookup(&newest).is_some());
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let store = MemoryStore::new(1);
        let key = derive_key("s1", "q");
        store.insert(&key, "old", Duration::from_secs(60));
        store.insert(&key, "new", Duration::from_secs(60));
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup(&key).as_deref(), Some("new"));
    }

    #[test]
    fn test_huge_ttl_is_clamped() {
        let store = MemoryStore::new(10);
        let key = derive_key("s1", "forever");
        store.insert(&key, "kept", Duration::from_secs(u64::MAX));
        assert_eq!(store.lookup(&key).as_deref(), Some("kept"));
    }
}
