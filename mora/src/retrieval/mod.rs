//! Retrieval over the on-disk vector index

mod index;
mod ingest;
mod retriever;
mod splitter;

pub use index::{Manifest, StoredChunk, VectorIndex};
pub use ingest::{collect_documents, ingest, IngestReport};
pub use retriever::{Passage, Retriever, VectorRetriever};
pub use splitter::TextSplitter;

use std::sync::Arc;

use crate::config::Config;

/// Open the configured index. Any problem is logged and yields `None`; the
/// server then runs without retrieved context and reports it on /health.
pub async fn open_retriever(config: &Config) -> Option<Arc<dyn Retriever>> {
    if !config.retrieval.enabled {
        tracing::info!("Retrieval disabled");
        return None;
    }

    let dir = &config.retrieval.index_dir;
    if !VectorIndex::exists(dir) {
        tracing::warn!(path = %dir.display(), "Vector index not found, answering without context");
        return None;
    }

    let index = match VectorIndex::load(dir) {
        Ok(index) => index,
        Err(e) => {
            tracing::warn!(path = %dir.display(), error = %e, "Failed to load vector index");
            return None;
        }
    };

    let embedder = match crate::embedding::create_provider(&config.embedding).await {
        Ok(embedder) => embedder,
        Err(e) => {
            tracing::warn!(error = %e, "Embedding provider unavailable, retrieval disabled");
            return None;
        }
    };

    let chunks = index.len();
    match VectorRetriever::new(index, embedder) {
        Ok(retriever) => {
            tracing::info!(path = %dir.display(), chunks, "Vector index loaded");
            Some(Arc::new(retriever))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Vector index unusable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_index_yields_none() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.retrieval.index_dir = temp.path().join("vector_index");
        assert!(open_retriever(&config).await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_yields_none() {
        let mut config = Config::default();
        config.retrieval.enabled = false;
        assert!(open_retriever(&config).await.is_none());
    }
}
