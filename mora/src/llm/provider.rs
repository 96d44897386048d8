//! Chat provider configuration and factory

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ChatModel, GeminiChat, OllamaChat, OpenAiChat, RetryingChat};
use crate::config::{resolve_secret, LlmConfig};
use crate::{Error, Result};

/// Configuration for generation providers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatProviderConfig {
    /// Google Gemini REST API
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
    /// OpenAI-compatible chat completions API
    OpenAI {
        url: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        api_key_env: Option<String>,
        model: String,
    },
    /// Ollama local server
    Ollama { url: String, model: String },
}

fn default_gemini_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_key_env() -> Option<String> {
    Some("GOOGLE_API_KEY".to_string())
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

impl Default for ChatProviderConfig {
    fn default() -> Self {
        Self::Gemini {
            url: default_gemini_url(),
            api_key: None,
            api_key_env: default_gemini_key_env(),
            model: default_gemini_model(),
        }
    }
}

/// Build the configured chat model, wrapped with retries when enabled.
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    let timeout = config.timeout();
    let model: Arc<dyn ChatModel> = match &config.provider {
        ChatProviderConfig::Gemini {
            url,
            api_key,
            api_key_env,
            model,
        } => {
            let key = resolve_secret(api_key.as_deref(), api_key_env.as_deref()).ok_or_else(
                || {
                    Error::Config(format!(
                        "Gemini API key missing (set llm.provider.api_key or ${})",
                        api_key_env.as_deref().unwrap_or("GOOGLE_API_KEY")
                    ))
                },
            )?;
            Arc::new(GeminiChat::new(url, &key, model, timeout)?)
        }
        ChatProviderConfig::OpenAI {
            url,
            api_key,
            api_key_env,
            model,
        } => {
            let key = resolve_secret(api_key.as_deref(), api_key_env.as_deref());
            Arc::new(OpenAiChat::new(url, key.as_deref(), model, timeout)?)
        }
        ChatProviderConfig::Ollama { url, model } => {
            Arc::new(OllamaChat::new(url, model, timeout)?)
        }
    };

    if config.max_retries == 0 {
        return Ok(model);
    }
    Ok(Arc::new(RetryingChat::new(
        model,
        config.max_retries,
        Duration::from_millis(config.retry_backoff_ms),
    )))
}

/// Stand-in used when the configured model cannot be built, so the server can
/// still start and report the problem on /health.
pub struct UnavailableChat {
    reason: String,
}

impl UnavailableChat {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[async_trait::async_trait]
impl ChatModel for UnavailableChat {
    async fn generate(
        &self,
        _messages: &[super::ChatMessage],
        _options: &super::GenerationOptions,
    ) -> Result<String> {
        Err(Error::Config(format!("LLM unavailable: {}", self.reason)))
    }

    fn model_name(&self) -> &str {
        "unavailable"
    }

    fn provider_name(&self) -> &'static str {
        "none"
    }
}
