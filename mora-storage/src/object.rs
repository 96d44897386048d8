//! Bucket storage over the `object_store` crate.
//!
//! # Configuration
//!
//! ```toml
//! [scan.storage]
//! type = "gcs"
//! bucket = "mora-scans"
//! # service_account_path = "/etc/mora/gcs-key.json"
//! ```
//!
//! ```toml
//! [scan.storage]
//! type = "s3"
//! bucket = "mora-scans"
//! region = "eu-north-1"
//! # endpoint = "http://localhost:9000"
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{Result, StorageError};
use crate::traits::{validate_key, ObjectMeta, ObjectStorage};

/// Google Cloud Storage bucket.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GcsConfig {
    pub bucket: String,
    /// Service account key file. When unset, `GOOGLE_SERVICE_ACCOUNT` /
    /// `GOOGLE_APPLICATION_CREDENTIALS` and instance metadata are used.
    #[serde(default)]
    pub service_account_path: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
}

/// S3 or S3-compatible bucket.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint (MinIO and friends); implies path-style requests
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
    #[serde(default)]
    pub prefix: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Clone)]
enum UrlStyle {
    Gcs { bucket: String },
    S3 { bucket: String, region: String, endpoint: Option<String> },
    Memory,
}

/// Object storage backend over any `object_store::ObjectStore`.
#[derive(Clone)]
pub struct ObjectStoreStorage {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    url_style: UrlStyle,
    name: &'static str,
}

impl ObjectStoreStorage {
    /// Google Cloud Storage backend.
    #[cfg(feature = "gcs")]
    pub fn gcs(config: &GcsConfig) -> Result<Self> {
        use object_store::gcp::GoogleCloudStorageBuilder;

        let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(&config.bucket);
        if let Some(path) = &config.service_account_path {
            builder = builder.with_service_account_path(path);
        }
        let store = builder
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            store: Arc::new(store),
            prefix: config.prefix.clone().unwrap_or_default(),
            url_style: UrlStyle::Gcs {
                bucket: config.bucket.clone(),
            },
            name: "gcs",
        })
    }

    /// S3-compatible backend.
    #[cfg(feature = "s3")]
    pub fn s3(config: &S3Config) -> Result<Self> {
        use object_store::aws::AmazonS3Builder;

        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_allow_http(config.allow_http);

        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false);
        }

        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            builder = builder
                .with_access_key_id(key_id)
                .with_secret_access_key(secret);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            store: Arc::new(store),
            prefix: config.prefix.clone().unwrap_or_default(),
            url_style: UrlStyle::S3 {
                bucket: config.bucket.clone(),
                region: config.region.clone(),
                endpoint: config.endpoint.clone(),
            },
            name: "s3",
        })
    }

    /// Process-local bucket, for tests and dry runs.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            prefix: String::new(),
            url_style: UrlStyle::Memory,
            name: "memory",
        }
    }

    fn object_path(&self, key: &str) -> Result<ObjectPath> {
        validate_key(key)?;
        let full = if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), key)
        };
        ObjectPath::parse(&full).map_err(|e| StorageError::InvalidKey(e.to_string()))
    }

    fn key_for(&self, location: &ObjectPath) -> Option<String> {
        let full = location.as_ref();
        if self.prefix.is_empty() {
            return Some(full.to_string());
        }
        full.strip_prefix(self.prefix.trim_end_matches('/'))
            .map(|rest| rest.trim_start_matches('/').to_string())
    }

    /// The full object name inside the bucket, prefix included.
    fn full_name(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), key)
        }
    }
}

impl std::fmt::Debug for ObjectStoreStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreStorage")
            .field("backend", &self.name)
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[async_trait]
impl ObjectStorage for ObjectStoreStorage {
    #[instrument(skip(self, data), fields(key = %key, size = data.len(), backend = self.name))]
    async fn put(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        let path = self.object_path(key)?;
        debug!("Uploading {} bytes to {}", data.len(), path);

        let mut attributes = Attributes::new();
        if let Some(content_type) = content_type {
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
        }
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(&path, PutPayload::from(data), options)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key, backend = self.name))]
    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.object_path(key)?;
        match self.store.get(&path).await {
            Ok(result) => Ok(result.bytes().await?),
            Err(object_store::Error::NotFound { .. }) => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.object_path(key)?;
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        match self.store.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(prefix = %prefix, backend = self.name))]
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let root = if self.prefix.is_empty() {
            None
        } else {
            Some(ObjectPath::from(self.prefix.trim_end_matches('/')))
        };

        let mut results = Vec::new();
        let mut stream = self.store.list(root.as_ref());
        while let Some(meta) = stream.try_next().await? {
            let Some(key) = self.key_for(&meta.location) else {
                continue;
            };
            if key.starts_with(prefix) {
                results.push(ObjectMeta {
                    key,
                    size: meta.size as u64,
                    last_modified: Some(meta.last_modified.timestamp()),
                });
            }
        }

        results.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(results)
    }

    fn public_url(&self, key: &str) -> String {
        let name = self.full_name(key);
        match &self.url_style {
            UrlStyle::Gcs { bucket } => {
                format!("https://storage.googleapis.com/{}/{}", bucket, name)
            }
            UrlStyle::S3 {
                bucket,
                endpoint: Some(endpoint),
                ..
            } => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, name),
            UrlStyle::S3 { bucket, region, .. } => {
                format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, name)
            }
            UrlStyle::Memory => format!("memory:///{}", name),
        }
    }

    fn backend_name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        let storage = ObjectStoreStorage::in_memory();
        let key = "images/2024-05-01T10:00:00.123456_breast_scan.png";

        storage
            .put(key, Bytes::from_static(b"\x89PNG"), Some("image/png"))
            .await
            .unwrap();
        assert!(storage.exists(key).await.unwrap());
        assert_eq!(storage.get(key).await.unwrap(), Bytes::from_static(b"\x89PNG"));

        storage.delete(key).await.unwrap();
        assert!(!storage.exists(key).await.unwrap());
        assert!(storage.get(key).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_prefix() {
        let storage = ObjectStoreStorage::in_memory();
        for key in ["images/a.png", "images/b.png", "audit/log.json"] {
            storage.put(key, Bytes::from(key), None).await.unwrap();
        }

        let listed = storage.list("images/").await.unwrap();
        let keys: Vec<_> = listed.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec!["images/a.png", "images/b.png"]);
        assert_eq!(listed[0].size, "images/a.png".len() as u64);
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let storage = ObjectStoreStorage::in_memory();
        storage.delete("never-written.png").await.unwrap();
    }

    #[test]
    fn test_public_url_styles() {
        let memory = ObjectStoreStorage::in_memory();
        assert_eq!(memory.public_url("images/a.png"), "memory:///images/a.png");
    }

    #[cfg(feature = "gcs")]
    #[test]
    fn test_gcs_public_url() {
        let storage = ObjectStoreStorage {
            store: Arc::new(InMemory::new()),
            prefix: "scans".into(),
            url_style: UrlStyle::Gcs {
                bucket: "mora-bucket".into(),
            },
            name: "gcs",
        };
        assert_eq!(
            storage.public_url("images/a.png"),
            "https://storage.googleapis.com/mora-bucket/scans/images/a.png"
        );
    }

    #[cfg(feature = "s3")]
    #[test]
    fn test_s3_builder_with_endpoint() {
        let config = S3Config {
            bucket: "scans".into(),
            region: "us-east-1".into(),
            endpoint: Some("http://localhost:9000".into()),
            access_key_id: Some("minioadmin".into()),
            secret_access_key: Some("minioadmin".into()),
            allow_http: true,
            prefix: None,
        };
        let storage = ObjectStoreStorage::s3(&config).unwrap();
        assert_eq!(storage.backend_name(), "s3");
        assert_eq!(
            storage.public_url("images/a.png"),
            "http://localhost:9000/scans/images/a.png"
        );
    }

    #[tokio::test]
    async fn test_prefixed_keys_are_relative() {
        let storage = ObjectStoreStorage {
            store: Arc::new(InMemory::new()),
            prefix: "tenant-a/".into(),
            url_style: UrlStyle::Memory,
            name: "memory",
        };
        storage.put("images/a.png", Bytes::from("x"), None).await.unwrap();
        let listed = storage.list("").await.unwrap();
        assert_eq!(listed[0].key, "images/a.png");
    }
}
