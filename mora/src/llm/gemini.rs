//! Gemini `generateContent` client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{system_instruction, ChatMessage, ChatModel, ChatRole, GenerationOptions};
use crate::error::check_response;
use crate::{Error, Result};

pub struct GeminiChat {
    client: Client,
    url: String,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for GeminiChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiChat")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiChat {
    pub fn new(url: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    fn build_body(messages: &[ChatMessage], options: &GenerationOptions) -> Value {
        let contents: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(|m| {
                let role = match m.role {
                    ChatRole::Assistant => "model",
                    _ => "user",
                };
                json!({ "role": role, "parts": [{ "text": &m.content }] })
            })
            .collect();

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": options.temperature,
                "maxOutputTokens": options.max_output_tokens,
            }
        });

        if let Some(system) = system_instruction(messages) {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        body
    }

    /// Concatenate the text parts of the first candidate, skipping thought parts
    fn extract_text(response: &Value) -> Option<String> {
        let parts = response["candidates"][0]["content"]["parts"].as_array()?;
        let text: Vec<&str> = parts
            .iter()
            .filter(|p| !p["thought"].as_bool().unwrap_or(false))
            .filter_map(|p| p["text"].as_str())
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text.join(""))
        }
    }
}

#[async_trait]
impl ChatModel for GeminiChat {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String> {
        let body = Self::build_body(messages, options);

        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.url, self.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;
        let response = check_response("gemini", response).await?;

        let json: Value = response.json().await?;
        Self::extract_text(&json).ok_or_else(|| {
            let reason = json["candidates"][0]["finishReason"]
                .as_str()
                .or_else(|| json["promptFeedback"]["blockReason"].as_str())
                .unwrap_or("no candidates");
            Error::Upstream(format!("Gemini returned no text ({})", reason))
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}
