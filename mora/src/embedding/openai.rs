//! `/embeddings` client for OpenAI and servers that mimic its API
//! (vLLM, LM Studio, Together).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::provider::EmbeddingProvider;
use crate::error::check_response;
use crate::{Error, Result};

pub struct OpenAIProvider {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    /// Sent as `dimensions` so text-embedding-3 models shorten their output
    requested_dimensions: Option<usize>,
}

#[derive(Serialize)]
struct EmbeddingsBody<'a> {
    model: &'a str,
    input: &'a [&'a str],
    encoding_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingsReply {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

fn default_dimensions(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-large" => Some(3072),
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        _ => None,
    }
}

impl OpenAIProvider {
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
            endpoint: format!("{}/embeddings", url.trim_end_matches('/')),
            model: model.to_string(),
            dimensions: default_dimensions(model).unwrap_or(1536),
            requested_dimensions: None,
        })
    }

    /// Vector size for models this client does not know, or a shortened
    /// size for text-embedding-3 models.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        if self.model.starts_with("text-embedding-3") {
            self.requested_dimensions = Some(dimensions);
        }
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Upstream("OpenAI returned no embeddings".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingsBody {
            model: &self.model,
            input: texts,
            encoding_format: "float",
            dimensions: self.requested_dimensions,
        };
        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        let mut reply: EmbeddingsReply = check_response("openai-embeddings", response)
            .await?
            .json()
            .await?;

        if reply.data.len() != texts.len() {
            return Err(Error::Upstream(format!(
                "embeddings endpoint returned {} vectors for {} inputs",
                reply.data.len(),
                texts.len()
            )));
        }
        // Items may arrive out of order
        reply.data.sort_unstable_by_key(|item| item.index);
        Ok(reply.data.into_iter().map(|item| item.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(model: &str) -> OpenAIProvider {
        OpenAIProvider::new("http://localhost:8000/v1/", None, model, Duration::from_secs(5))
            .unwrap()
    }

    #[test]
    fn test_default_dimensions() {
        assert_eq!(provider("text-embedding-3-large").dimensions(), 3072);
        assert_eq!(provider("text-embedding-ada-002").dimensions(), 1536);
        assert_eq!(default_dimensions("bge-small"), None);
        assert_eq!(provider("bge-small").endpoint, "http://localhost:8000/v1/embeddings");
    }

    #[test]
    fn test_dimension_override() {
        let local = provider("bge-small").with_dimensions(384);
        assert_eq!(local.dimensions(), 384);
        assert_eq!(local.requested_dimensions, None);

        let shortened = provider("text-embedding-3-small").with_dimensions(512);
        assert_eq!(shortened.requested_dimensions, Some(512));
    }

    #[test]
    fn test_body_omits_unset_dimensions() {
        let body = EmbeddingsBody {
            model: "m",
            input: &["a", "b"],
            encoding_format: "float",
            dimensions: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("dimensions").is_none());
        assert_eq!(json["input"][1], "b");
    }

    #[tokio::test]
    #[ignore = "requires OpenAI API key"]
    async fn test_openai_embed() {
        let api_key = std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY not set");
        let provider = OpenAIProvider::new(
            "https://api.openai.com/v1",
            Some(&api_key),
            "text-embedding-3-small",
            Duration::from_secs(30),
        )
        .unwrap();

        let embedding = provider.embed("Hello, world!").await.unwrap();
        assert_eq!(embedding.len(), 1536);
    }
}
