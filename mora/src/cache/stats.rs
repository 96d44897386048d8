//! Response cache statistics

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Hit/miss/fallback counters for the response cache
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    fallbacks: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`]
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub fallbacks: u64,
    pub hit_rate: f64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self, layer: &'static str) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("mora_response_cache_hits_total", "layer" => layer).increment(1);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("mora_response_cache_misses_total").increment(1);
    }

    /// The networked store failed and the in-process store served the call
    pub fn fallback(&self, op: &'static str) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("mora_response_cache_fallbacks_total", "op" => op).increment(1);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn fallbacks(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            fallbacks: self.fallbacks(),
            hit_rate: self.hit_rate(),
        }
    }
}
