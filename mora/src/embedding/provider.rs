//! Embedding provider trait and implementations

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{resolve_secret, EmbeddingConfig};
use crate::{Error, Result};

/// Configuration for embedding providers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// Google Gemini embedding models
    Gemini {
        #[serde(default = "default_gemini_url")]
        url: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_gemini_key_env")]
        api_key_env: Option<String>,
        #[serde(default = "default_gemini_model")]
        model: String,
    },
    /// Ollama local embedding server
    Ollama { url: String, model: String },
    /// OpenAI-compatible API (works with OpenAI, Azure, Together, etc.)
    OpenAI {
        url: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        api_key_env: Option<String>,
        model: String,
        /// Required for models whose size is not known in advance
        #[serde(default)]
        dimensions: Option<usize>,
    },
}

fn default_gemini_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_key_env() -> Option<String> {
    Some("GOOGLE_API_KEY".to_string())
}

fn default_gemini_model() -> String {
    "embedding-001".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::Gemini {
            url: default_gemini_url(),
            api_key: None,
            api_key_env: default_gemini_key_env(),
            model: default_gemini_model(),
        }
    }
}

/// Trait for embedding providers
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        // Default implementation: call embed() for each text
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Get the model name (recorded in the index manifest)
    fn model_name(&self) -> &str;

    /// Get the embedding dimensions
    fn dimensions(&self) -> usize;
}

/// Create an embedding provider from configuration
pub async fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let timeout = config.timeout();
    match &config.provider {
        ProviderConfig::Gemini {
            url,
            api_key,
            api_key_env,
            model,
        } => {
            let key = resolve_secret(api_key.as_deref(), api_key_env.as_deref()).ok_or_else(
                || Error::Config("Gemini API key missing for embedding provider".to_string()),
            )?;
            let provider = super::gemini::GeminiEmbedder::new(url, &key, model, timeout)?;
            Ok(Arc::new(provider))
        }
        ProviderConfig::Ollama { url, model } => {
            let provider = super::ollama::OllamaProvider::new(url, model, timeout).await?;
            Ok(Arc::new(provider))
        }
        ProviderConfig::OpenAI {
            url,
            api_key,
            api_key_env,
            model,
            dimensions,
        } => {
            let key = resolve_secret(api_key.as_deref(), api_key_env.as_deref());
            let mut provider =
                super::openai::OpenAIProvider::new(url, key.as_deref(), model, timeout)?;
            if let Some(dims) = dimensions {
                provider = provider.with_dimensions(*dims);
            }
            Ok(Arc::new(provider))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openai_config() {
        let cfg: ProviderConfig = toml::from_str(
            r#"
            type = "openai"
            url = "https://api.openai.com/v1"
            api_key_env = "OPENAI_API_KEY"
            model = "text-embedding-3-small"
            "#,
        )
        .unwrap();
        match cfg {
            ProviderConfig::OpenAI {
                model, dimensions, ..
            } => {
                assert_eq!(model, "text-embedding-3-small");
                assert!(dimensions.is_none());
            }
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn test_default_gemini_fields() {
        let cfg: ProviderConfig = toml::from_str(r#"type = "gemini""#).unwrap();
        match cfg {
            ProviderConfig::Gemini {
                model, api_key_env, ..
            } => {
                assert_eq!(model, "embedding-001");
                assert_eq!(api_key_env.as_deref(), Some("GOOGLE_API_KEY"));
            }
            other => panic!("unexpected config {:?}", other),
        }
    }
}
