//! Configuration management for mora
//!
//! Default config location: ./mora.toml (override with `--config`).

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Maximum request body size in bytes (default: 1MB)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    /// Send a one-word generation request on every GET /health
    #[serde(default)]
    pub health_llm_check: bool,
}

fn default_bind_addr() -> String {
    "127.0.0.1:5003".to_string()
}

fn default_max_body_size() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors: CorsConfig::default(),
            max_body_size: default_max_body_size(),
            health_llm_check: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    /// Enable CORS (default: true, the mobile and web clients run on other origins)
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Allowed origins. Use "*" for any origin, or list specific origins.
    #[serde(default = "default_cors_origins")]
    pub origins: Vec<String>,
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            origins: default_cors_origins(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: crate::llm::ChatProviderConfig,
    /// Per-call timeout for generation requests
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Output token budget for answers
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Retries for transient upstream failures (0 disables retrying)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_llm_timeout() -> u64 {
    30
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_output_tokens() -> u32 {
    150
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    250
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: crate::llm::ChatProviderConfig::default(),
            timeout_secs: default_llm_timeout(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: crate::embedding::ProviderConfig,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Number of chunks sent per embedding request during ingestion
    #[serde(default = "default_embed_batch")]
    pub batch_size: usize,
}

fn default_embed_batch() -> usize {
    32
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: crate::embedding::ProviderConfig::default(),
            timeout_secs: default_llm_timeout(),
            batch_size: default_embed_batch(),
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Directory holding the persisted vector index
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("./vector_index")
}

fn default_top_k() -> usize {
    3
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            index_dir: default_index_dir(),
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Redis URL. When unset or unreachable at startup, the in-process store is used.
    #[serde(default = "default_redis_url")]
    pub redis_url: Option<String>,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    /// Budget for the startup reachability check
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Budget for each get/set against the networked store
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_memory_max_entries")]
    pub memory_max_entries: usize,
}

fn default_redis_url() -> Option<String> {
    Some("redis://127.0.0.1:6379/0".to_string())
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_connect_timeout_ms() -> u64 {
    500
}

fn default_op_timeout_ms() -> u64 {
    250
}

fn default_key_prefix() -> String {
    "mora:resp:".to_string()
}

fn default_memory_max_entries() -> usize {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            ttl_secs: default_cache_ttl(),
            connect_timeout_ms: default_connect_timeout_ms(),
            op_timeout_ms: default_op_timeout_ms(),
            key_prefix: default_key_prefix(),
            memory_max_entries: default_memory_max_entries(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub backend: HistoryBackend,
    /// SQLite database path (sqlite backend only)
    #[serde(default = "default_history_path")]
    pub path: PathBuf,
    /// Number of prior turns fed into prompt construction
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
    #[serde(default = "default_read_cache_ttl")]
    pub read_cache_ttl_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Keep at most this many turns per session (0 = unlimited)
    #[serde(default)]
    pub max_turns_per_session: usize,
}

fn default_history_path() -> PathBuf {
    PathBuf::from("./data/history.db")
}

fn default_fetch_limit() -> usize {
    10
}

fn default_read_cache_ttl() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: HistoryBackend::default(),
            path: default_history_path(),
            fetch_limit: default_fetch_limit(),
            read_cache_ttl_secs: default_read_cache_ttl(),
            queue_capacity: default_queue_capacity(),
            max_turns_per_session: 0,
        }
    }
}

impl HistoryConfig {
    pub fn read_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.read_cache_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Utterances with fewer words than this take the fast path on /chat/fast
    #[serde(default = "default_fast_word_threshold")]
    pub fast_word_threshold: usize,
    /// Upper bound for one request's miss path
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_persona")]
    pub persona: String,
    #[serde(default = "default_rewrite_instruction")]
    pub rewrite_instruction: String,
}

fn default_fast_word_threshold() -> usize {
    10
}

fn default_request_timeout() -> u64 {
    60
}

fn default_persona() -> String {
    "You are Mora, a breast care health assistant. Use the context to answer briefly and \
     accurately. If you don't know the answer, say that you don't know. Keep responses under \
     100 words."
        .to_string()
}

fn default_rewrite_instruction() -> String {
    "Given the previous conversation and the user's new question, generate a standalone \
     question. Do not answer it. Keep it concise."
        .to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fast_word_threshold: default_fast_word_threshold(),
            request_timeout_secs: default_request_timeout(),
            persona: default_persona(),
            rewrite_instruction: default_rewrite_instruction(),
        }
    }
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log output format: "pretty" or "json"
    /// Override with LOG_FORMAT env var
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter string
    /// Override with RUST_LOG env var
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable Prometheus metrics at GET /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_level() -> String {
    "info,mora=debug".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            log_level: default_log_level(),
            metrics_enabled: true,
        }
    }
}

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))
    } else {
        Ok(path.to_path_buf())
    }
}

/// Resolve a secret given either inline or as an environment variable name.
pub fn resolve_secret(inline: Option<&str>, env_var: Option<&str>) -> Option<String> {
    if let Some(v) = inline.filter(|v| !v.is_empty()) {
        return Some(v.to_string());
    }
    env_var
        .and_then(|name| std::env::var(name).ok())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Parse a config from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.expand_paths()?;
        Ok(config)
    }

    /// Load config from file path, or create default
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            Self::from_toml(&content)
        } else {
            let config = Config::default();
            // Try to save default config
            if let Some(parent) = config_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let _ = config.save(config_path);
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Expand ~ in all paths
    fn expand_paths(&mut self) -> Result<()> {
        self.retrieval.index_dir = expand_tilde(&self.retrieval.index_dir)?;
        self.history.path = expand_tilde(&self.history.path)?;
        Ok(())
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        if self.history.backend == HistoryBackend::Sqlite {
            if let Some(parent) = self.history.path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
        }
        Ok(())
    }
}
