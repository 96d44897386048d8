//! Cache key derivation

use std::fmt;

use sha2::{Digest, Sha256};

/// Opaque response cache key: 64 lowercase hex characters of a SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase and trim. Internal whitespace and punctuation are kept, so
/// "hello  there" and "hello there" are different queries.
pub fn normalize(utterance: &str) -> String {
    utterance.trim().to_lowercase()
}

/// Derive the cache slot for an utterance within a session.
pub fn derive_key(session: &str, utterance: &str) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(session.as_bytes());
    hasher.update(b":");
    hasher.update(normalize(utterance).as_bytes());
    CacheKey(hex::encode(hasher.finalize()))
}

/// Slot for answers produced by the fast path. Brief answers are kept apart
/// so a later full request still runs retrieval.
pub fn derive_brief_key(session: &str, utterance: &str) -> CacheKey {
    let mut hasher = Sha256::new();
    // 0xFF never starts a UTF-8 session id, so brief and full inputs never coincide
    hasher.update([0xFF]);
    hasher.update(b"brief:");
    hasher.update(session.as_bytes());
    hasher.update(b":");
    hasher.update(normalize(utterance).as_bytes());
    CacheKey(hex::encode(hasher.finalize()))
}
