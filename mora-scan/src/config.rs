//! `[scan]` configuration section

use mora_storage::{EncryptionConfig, StorageConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, ScanError};

/// What is sent to the bucket.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UploadPayload {
    /// The same IV-prefixed ciphertext that is written locally
    #[default]
    Encrypted,
    /// The unencrypted PNG; relies on bucket-side encryption at rest
    Plain,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScanConfig {
    /// Serve the scan API alongside the chat API
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Base64 32-byte key given inline
    #[serde(default)]
    pub encryption_key: Option<String>,
    /// Environment variable holding the base64 key
    #[serde(default = "default_key_env")]
    pub encryption_key_env: Option<String>,
    /// Where `{filename}.enc` copies are written
    #[serde(default = "default_output")]
    pub output: StorageConfig,
    /// Bucket receiving `images/{timestamp}_{filename}`
    #[serde(default)]
    pub upload: StorageConfig,
    #[serde(default)]
    pub upload_payload: UploadPayload,
    /// Accepted bearer tokens. Empty accepts any non-empty token.
    #[serde(default)]
    pub api_tokens: Vec<String>,
    /// Tracked processing jobs kept in memory
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,
    /// Still image used as the capture source for one-shot runs
    #[serde(default)]
    pub image_source: Option<PathBuf>,
    /// Request body limit; base64 images are large
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_key_env() -> Option<String> {
    Some("ENCRYPTION_KEY".to_string())
}

fn default_output() -> StorageConfig {
    StorageConfig::Local {
        path: PathBuf::from("./data/scans"),
    }
}

fn default_max_jobs() -> usize {
    1000
}

fn default_max_body_size() -> usize {
    20 * 1024 * 1024
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: default_bind_addr(),
            encryption_key: None,
            encryption_key_env: default_key_env(),
            output: default_output(),
            upload: StorageConfig::default(),
            upload_payload: UploadPayload::default(),
            api_tokens: Vec::new(),
            max_jobs: default_max_jobs(),
            image_source: None,
            max_body_size: default_max_body_size(),
        }
    }
}

impl ScanConfig {
    /// Resolve the payload key: inline value first, then the environment.
    pub fn encryption(&self) -> Result<EncryptionConfig> {
        if let Some(key) = self.encryption_key.as_deref().filter(|k| !k.is_empty()) {
            return Ok(EncryptionConfig::from_base64(key, "config")?);
        }
        match self.encryption_key_env.as_deref() {
            Some(var) => Ok(EncryptionConfig::from_env(var)?),
            None => Err(ScanError::Config(
                "no encryption_key or encryption_key_env configured".to_string(),
            )),
        }
    }
}
