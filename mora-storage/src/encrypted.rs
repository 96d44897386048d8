//! Encrypted storage wrapper.
//!
//! Wraps any `ObjectStorage` and applies the [`PayloadCipher`] on write and
//! read, so objects at rest are in the IV-prefixed AES-256-CBC format.
//!
//! ```ignore
//! use mora_storage::{EncryptedStorage, EncryptionConfig, LocalStorage};
//! use std::sync::Arc;
//!
//! let inner = Arc::new(LocalStorage::new("./scans"));
//! let config = EncryptionConfig::from_env("ENCRYPTION_KEY")?;
//! let storage = EncryptedStorage::new(inner, &config);
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::cipher::{EncryptionConfig, PayloadCipher};
use crate::error::Result;
use crate::traits::{ObjectMeta, ObjectStorage};

const CIPHERTEXT_CONTENT_TYPE: &str = "application/octet-stream";

pub struct EncryptedStorage {
    inner: Arc<dyn ObjectStorage>,
    cipher: PayloadCipher,
    key_id: String,
}

impl EncryptedStorage {
    pub fn new(inner: Arc<dyn ObjectStorage>, config: &EncryptionConfig) -> Self {
        Self {
            inner,
            cipher: PayloadCipher::new(config),
            key_id: config.key_id().to_string(),
        }
    }

    pub fn inner(&self) -> &Arc<dyn ObjectStorage> {
        &self.inner
    }
}

impl std::fmt::Debug for EncryptedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedStorage")
            .field("inner", &self.inner.backend_name())
            .field("key_id", &self.key_id)
            .field("algorithm", &"AES-256-CBC")
            .finish()
    }
}

#[async_trait]
impl ObjectStorage for EncryptedStorage {
    // The plaintext content type is not recorded: the stored object is ciphertext.
    #[instrument(
        skip(self, data, _content_type),
        fields(key = %key, size = data.len(), key_id = %self.key_id)
    )]
    async fn put(&self, key: &str, data: Bytes, _content_type: Option<&str>) -> Result<()> {
        let encrypted = self.cipher.encrypt(&data);
        debug!("Encrypted {} bytes -> {} bytes", data.len(), encrypted.len());
        self.inner
            .put(key, Bytes::from(encrypted), Some(CIPHERTEXT_CONTENT_TYPE))
            .await
    }

    #[instrument(skip(self), fields(key = %key, key_id = %self.key_id))]
    async fn get(&self, key: &str) -> Result<Bytes> {
        let data = self.inner.get(key).await?;
        let decrypted = self.cipher.decrypt(&data)?;
        debug!("Decrypted {} bytes -> {} bytes", data.len(), decrypted.len());
        Ok(Bytes::from(decrypted))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        self.inner.list(prefix).await
    }

    fn public_url(&self, key: &str) -> String {
        self.inner.public_url(key)
    }

    fn backend_name(&self) -> &'static str {
        "encrypted"
    }
}
