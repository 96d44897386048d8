//! Object storage abstraction for Mora scan uploads.
//!
//! The scan pipeline writes each captured image twice: an encrypted copy to
//! local storage and an upload to a bucket. Both sides go through the
//! [`ObjectStorage`] trait so backends can be swapped by configuration.
//!
//! ```text
//!            ┌──────────────────┐
//!            │  ObjectStorage   │
//!            └────────┬─────────┘
//!      ┌──────────────┼──────────────────┐
//!      ▼              ▼                  ▼
//! ┌──────────┐ ┌──────────────────┐ ┌─────────────────┐
//! │  Local   │ │ ObjectStore      │ │ EncryptedStorage│
//! │   (fs)   │ │ (gcs/s3/memory)  │ │  (wraps any)    │
//! └──────────┘ └──────────────────┘ └─────────────────┘
//! ```
//!
//! # Features
//!
//! - `gcs` - Google Cloud Storage backend
//! - `s3` - S3-compatible backend

mod cipher;
mod encrypted;
mod error;
mod local;
mod object;
mod traits;

pub use cipher::{EncryptionConfig, PayloadCipher, IV_SIZE, KEY_SIZE};
pub use encrypted::EncryptedStorage;
pub use error::{Result, StorageError};
pub use local::LocalStorage;
pub use object::{GcsConfig, ObjectStoreStorage, S3Config};
pub use traits::{ObjectMeta, ObjectStorage};

pub use bytes::Bytes;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage
    Local { path: PathBuf },
    /// Google Cloud Storage (requires `gcs` feature)
    Gcs(GcsConfig),
    /// S3-compatible object storage (requires `s3` feature)
    S3(S3Config),
    /// Process-local bucket
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Local {
            path: PathBuf::from("./data/uploads"),
        }
    }
}

/// Create a storage backend from configuration.
pub fn create_storage(config: &StorageConfig) -> Result<Arc<dyn ObjectStorage>> {
    match config {
        StorageConfig::Local { path } => Ok(Arc::new(LocalStorage::new(path))),
        #[cfg(feature = "gcs")]
        StorageConfig::Gcs(gcs) => Ok(Arc::new(ObjectStoreStorage::gcs(gcs)?)),
        #[cfg(not(feature = "gcs"))]
        StorageConfig::Gcs(_) => Err(StorageError::Config(
            "GCS storage requires 'gcs' feature".to_string(),
        )),
        #[cfg(feature = "s3")]
        StorageConfig::S3(s3) => Ok(Arc::new(ObjectStoreStorage::s3(s3)?)),
        #[cfg(not(feature = "s3"))]
        StorageConfig::S3(_) => Err(StorageError::Config(
            "S3 storage requires 's3' feature".to_string(),
        )),
        StorageConfig::Memory => Ok(Arc::new(ObjectStoreStorage::in_memory())),
    }
}
