//! Passage retrieval over the vector index

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use super::index::VectorIndex;
use crate::embedding::EmbeddingProvider;
use crate::{Error, Result};

/// A retrieved fragment of the corpus. Read-only evidence for one answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    pub text: String,
    pub source: String,
    pub score: f32,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// At most `k` passages, most relevant first
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>>;
}

pub struct VectorRetriever {
    index: VectorIndex,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl VectorRetriever {
    /// Fails when the embedder's vectors cannot be compared with the index.
    pub fn new(index: VectorIndex, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        if embedder.dimensions() != index.dimensions() {
            return Err(Error::Index(format!(
                "index has {} dimensions but embedding model '{}' produces {}",
                index.dimensions(),
                embedder.model_name(),
                embedder.dimensions()
            )));
        }
        if embedder.model_name() != index.model() {
            tracing::warn!(
                index_model = index.model(),
                query_model = embedder.model_name(),
                "Index was built with a different embedding model"
            );
        }
        Ok(Self { index, embedder })
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        if self.index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| Error::Retrieval(format!("query embedding failed: {}", e)))?;

        let hits = self.index.search(&vector, k)?;
        Ok(hits
            .into_iter()
            .map(|(chunk, score)| Passage {
                text: chunk.text.clone(),
                source: chunk.source.clone(),
                score,
            })
            .collect())
    }
}
