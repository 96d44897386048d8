//! Ollama `/api/embed` client. The vector size is learned from a test
//! request when the provider is built.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::provider::EmbeddingProvider;
use crate::error::check_response;
use crate::{Error, Result};

pub struct OllamaProvider {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbedBody<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedReply {
    embeddings: Vec<Vec<f32>>,
}

async fn post_embed(
    client: &Client,
    endpoint: &str,
    model: &str,
    input: &[&str],
) -> Result<Vec<Vec<f32>>> {
    let response = client
        .post(endpoint)
        .json(&EmbedBody { model, input })
        .send()
        .await?;
    let reply: EmbedReply = check_response("ollama-embeddings", response)
        .await?
        .json()
        .await?;

    match reply.embeddings.len() {
        n if n == input.len() => Ok(reply.embeddings),
        n => Err(Error::Upstream(format!(
            "ollama returned {} vectors for {} inputs",
            n,
            input.len()
        ))),
    }
}

impl OllamaProvider {
    pub async fn new(url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let endpoint = format!("{}/api/embed", url.trim_end_matches('/'));

        let dimensions = post_embed(&client, &endpoint, model, &["dimension check"])
            .await?
            .pop()
            .map(|v| v.len())
            .filter(|&n| n > 0)
            .ok_or_else(|| Error::Upstream(format!("model '{}' produced an empty vector", model)))?;
        tracing::debug!(model, dimensions, "Ollama embedder ready");

        Ok(Self {
            client,
            endpoint,
            model: model.to_string(),
            dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = post_embed(&self.client, &self.endpoint, &self.model, &[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::Upstream("ollama returned no vectors".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        match texts {
            [] => Ok(Vec::new()),
            _ => post_embed(&self.client, &self.endpoint, &self.model, texts).await,
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
