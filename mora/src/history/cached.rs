//! Read-through cache in front of a history store

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::Instant;

use super::{HistoryStore, NewTurn, Turn};
use crate::Result;

struct CachedTurns {
    turns: Vec<Turn>,
    /// Limit the turns were fetched with; a larger request must go to the store
    limit: usize,
    fetched_at: Instant,
}

/// Caches `fetch` results per session for a short TTL and drops a session's
/// entry whenever turns are appended through it.
pub struct CachedHistory {
    inner: Arc<dyn HistoryStore>,
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedTurns>>,
    /// Bumped on every invalidation; a fetch that raced an append is not cached
    epoch: AtomicU64,
}

impl CachedHistory {
    pub fn new(inner: Arc<dyn HistoryStore>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn invalidate(&self, session: &str) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.entries.write().remove(session);
    }

    pub fn inner(&self) -> &Arc<dyn HistoryStore> {
        &self.inner
    }

    fn cached(&self, session: &str, limit: usize) -> Option<Vec<Turn>> {
        let entries = self.entries.read();
        let entry = entries.get(session)?;
        if entry.fetched_at.elapsed() >= self.ttl || entry.limit < limit {
            return None;
        }
        let start = entry.turns.len().saturating_sub(limit);
        Some(entry.turns[start..].to_vec())
    }
}

#[async_trait]
impl HistoryStore for CachedHistory {
    async fn append(&self, session: &str, turns: &[NewTurn]) -> Result<()> {
        let res = self.inner.append(session, turns).await;
        self.invalidate(session);
        res
    }

    async fn fetch(&self, session: &str, limit: usize) -> Result<Vec<Turn>> {
        if let Some(turns) = self.cached(session, limit) {
            metrics::counter!("mora_history_cache_hits_total").increment(1);
            return Ok(turns);
        }
        metrics::counter!("mora_history_cache_misses_total").increment(1);

        let epoch = self.epoch.load(Ordering::SeqCst);
        let turns = self.inner.fetch(session, limit).await?;

        let mut entries = self.entries.write();
        if self.epoch.load(Ordering::SeqCst) == epoch {
            let now = Instant::now();
            entries.retain(|_, e| now.duration_since(e.fetched_at) < self.ttl);
            entries.insert(
                session.to_string(),
                CachedTurns {
                    turns: turns.clone(),
                    limit,
                    fetched_at: now,
                },
            );
        }
        Ok(turns)
    }

    async fn prune(&self, session: &str, keep: usize) -> Result<usize> {
        let removed = self.inner.prune(session, keep).await;
        self.invalidate(session);
        removed
    }

    async fn sessions(&self) -> Result<Vec<String>> {
        self.inner.sessions().await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistoryStore;
    use std::sync::atomic::AtomicUsize;

    struct CountingStore {
        inner: MemoryHistoryStore,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl HistoryStore for CountingStore {
        async fn append(&self, session: &str, turns: &[NewTurn]) -> Result<()> {
            self.inner.append(session, turns).await
        }

        async fn fetch(&self, session: &str, limit: usize) -> Result<Vec<Turn>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch(session, limit).await
        }

        async fn prune(&self, session: &str, keep: usize) -> Result<usize> {
            self.inner.prune(session, keep).await
        }

        async fn sessions(&self) -> Result<Vec<String>> {
            self.inner.sessions().await
        }

        fn backend_name(&self) -> &'static str {
            "counting"
        }
    }

    fn counting() -> Arc<CountingStore> {
        Arc::new(CountingStore {
            inner: MemoryHistoryStore::new(),
            fetches: AtomicUsize::new(0),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_fetch_served_from_cache() {
        let store = counting();
        let cached = CachedHistory::new(store.clone(), Duration::from_secs(30));

        cached.fetch("s1", 10).await.unwrap();
        cached.fetch("s1", 10).await.unwrap();
        cached.fetch("s1", 5).await.unwrap();
        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        cached.fetch("s1", 10).await.unwrap();
        assert_eq!(store.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_larger_limit_bypasses_cache() {
        let store = counting();
        let cached = CachedHistory::new(store.clone(), Duration::from_secs(30));

        cached.fetch("s1", 2).await.unwrap();
        cached.fetch("s1", 10).await.unwrap();
        assert_eq!(store.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_append_invalidates() {
        let store = counting();
        let cached = CachedHistory::new(store.clone(), Duration::from_secs(30));

        assert!(cached.fetch("s1", 10).await.unwrap().is_empty());
        cached
            .append("s1", &[NewTurn::human("hi"), NewTurn::ai("hello")])
            .await
            .unwrap();

        let turns = cached.fetch("s1", 10).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(store.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cached_slice_is_most_recent() {
        let store = counting();
        let cached = CachedHistory::new(store.clone(), Duration::from_secs(30));
        for i in 0..4 {
            store
                .append("s1", &[NewTurn::human(i.to_string())])
                .await
                .unwrap();
        }

        cached.fetch("s1", 4).await.unwrap();
        let last_two = cached.fetch("s1", 2).await.unwrap();
        let messages: Vec<_> = last_two.iter().map(|t| t.message.as_str()).collect();
        assert_eq!(messages, vec!["2", "3"]);
    }
}
