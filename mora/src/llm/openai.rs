//! OpenAI-compatible chat completions client
//!
//! Works with OpenAI, Azure OpenAI, Together.ai, Groq, vLLM and other compatible APIs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, ChatModel, GenerationOptions};
use crate::error::check_response;
use crate::{Error, Result};

pub struct OpenAiChat {
    client: Client,
    url: String,
    model: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChat {
    pub fn new(url: &str, api_key: Option<&str>, model: &str, timeout: Duration) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(key) = api_key {
            let value = format!("Bearer {}", key)
                .parse()
                .map_err(|_| Error::Config("API key is not a valid header value".into()))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_output_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.url))
            .json(&request)
            .send()
            .await?;
        let response = check_response("openai", response).await?;

        let completion: CompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Upstream("OpenAI returned no choices".into()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatRole;

    #[test]
    fn test_request_shape() {
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let request = CompletionRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            temperature: 0.7,
            max_tokens: 150,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 150);
        assert_eq!(messages[1].role, ChatRole::User);
    }

    #[test]
    fn test_url_trailing_slash_trimmed() {
        let chat = OpenAiChat::new(
            "https://api.openai.com/v1/",
            Some("sk-test"),
            "gpt-4o-mini",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(chat.url, "https://api.openai.com/v1");
    }

    #[tokio::test]
    #[ignore = "requires OpenAI API key"]
    async fn test_openai_generate() {
        let api_key = std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY not set");
        let chat = OpenAiChat::new(
            "https://api.openai.com/v1",
            Some(&api_key),
            "gpt-4o-mini",
            Duration::from_secs(30),
        )
        .unwrap();
        let out = chat
            .generate(&[ChatMessage::user("Say hello")], &GenerationOptions::default())
            .await
            .unwrap();
        assert!(!out.is_empty());
    }
}
