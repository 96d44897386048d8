//! Core storage trait definitions.
//!
//! Objects are addressed by `/`-separated string keys such as
//! `images/2024-05-01T10:00:00.000000_breast_scan.png`. Every backend maps
//! those keys onto its own namespace.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, StorageError};

/// Metadata about a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    /// Size in bytes as stored (ciphertext size for encrypted storage)
    pub size: u64,
    /// Last modified timestamp (Unix epoch seconds)
    pub last_modified: Option<i64>,
}

/// Unified object storage trait.
///
/// All implementations must be `Send + Sync` to allow concurrent access
/// from multiple async tasks.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Write `data` under `key`, replacing any existing object.
    ///
    /// `content_type` is recorded where the backend supports object
    /// attributes and ignored elsewhere.
    async fn put(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<()>;

    /// Read the object under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the key does not exist.
    async fn get(&self, key: &str) -> Result<Bytes>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Delete the object under `key`. No-op if it does not exist.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List objects whose key starts with `prefix`, sorted by key.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;

    /// Address a client can use to fetch the object, for logging and
    /// API responses. Access control is the bucket's concern.
    fn public_url(&self, key: &str) -> String;

    /// Get a human-readable name for this storage backend.
    fn backend_name(&self) -> &'static str;
}

/// Reject keys that are empty, absolute, or escape the namespace.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("empty key".to_string()));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    if key
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("images/scan.png").is_ok());
        assert!(validate_key("images/2024-05-01T10:00:00.123456_scan.png").is_ok());
        assert!(validate_key("scan.png.enc").is_ok());

        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("images/../../secret").is_err());
        assert!(validate_key("images//scan.png").is_err());
        assert!(validate_key("images\\scan.png").is_err());
    }
}
