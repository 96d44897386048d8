//! Gemini embedding provider (`embedContent` / `batchEmbedContents`)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::provider::EmbeddingProvider;
use crate::error::check_response;
use crate::{Error, Result};

pub struct GeminiEmbedder {
    client: Client,
    url: String,
    api_key: String,
    /// Bare model id without the `models/` prefix
    model: String,
    dimensions: usize,
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    embeddings: Vec<Values>,
}

#[derive(Deserialize)]
struct Values {
    values: Vec<f32>,
}

fn known_dimensions(model: &str) -> usize {
    match model {
        "gemini-embedding-001" => 3072,
        _ => 768,
    }
}

impl GeminiEmbedder {
    pub fn new(url: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let model = model.trim_start_matches("models/").to_string();
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            dimensions: known_dimensions(&model),
            model,
        })
    }

    fn batch_body(&self, texts: &[&str]) -> serde_json::Value {
        let requests: Vec<_> = texts
            .iter()
            .map(|t| {
                json!({
                    "model": format!("models/{}", self.model),
                    "content": { "parts": [{ "text": t }] }
                })
            })
            .collect();
        json!({ "requests": requests })
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Upstream("Gemini returned no embeddings".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!(
                "{}/models/{}:batchEmbedContents",
                self.url, self.model
            ))
            .query(&[("key", self.api_key.as_str())])
            .json(&self.batch_body(texts))
            .send()
            .await?;
        let response = check_response("gemini-embeddings", response).await?;

        let batch: BatchResponse = response.json().await?;
        if batch.embeddings.len() != texts.len() {
            return Err(Error::Upstream(format!(
                "Gemini returned {} embeddings for {} texts",
                batch.embeddings.len(),
                texts.len()
            )));
        }
        Ok(batch.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
