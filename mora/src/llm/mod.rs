//! Generation model clients
//!
//! All providers implement [`ChatModel`]. The answer pipeline only sees the
//! trait, so tests substitute scripted models.

mod gemini;
mod ollama;
mod openai;
mod provider;
mod retry;

pub use gemini::GeminiChat;
pub use ollama::OllamaChat;
pub use openai::OpenAiChat;
pub use provider::{create_chat_model, ChatProviderConfig, UnavailableChat};
pub use retry::RetryingChat;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 150,
        }
    }
}

/// A hosted or local text generation model
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a completion for the conversation. System messages carry the
    /// instruction; the rest alternate user/assistant.
    async fn generate(&self, messages: &[ChatMessage], options: &GenerationOptions)
        -> Result<String>;

    fn model_name(&self) -> &str;

    fn provider_name(&self) -> &'static str;
}

/// Join all system messages into one instruction block
pub(crate) fn system_instruction(messages: &[ChatMessage]) -> Option<String> {
    let parts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == ChatRole::System)
        .map(|m| m.content.as_str())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}
