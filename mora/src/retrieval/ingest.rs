//! Document ingestion into a vector index

use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use super::index::{StoredChunk, VectorIndex};
use super::splitter::TextSplitter;
use crate::embedding::EmbeddingProvider;
use crate::{Error, Result};

const TEXT_EXTENSIONS: [&str; 3] = ["txt", "md", "markdown"];

#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestReport {
    pub files: usize,
    pub chunks: usize,
    /// Files found but not in a supported text format
    pub skipped: Vec<PathBuf>,
}

fn is_text_document(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Expand files and directories into the sorted list of documents to ingest
pub fn collect_documents(paths: &[PathBuf]) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut docs = Vec::new();
    let mut skipped = Vec::new();

    for root in paths {
        if !root.exists() {
            return Err(Error::Validation(format!(
                "path does not exist: {}",
                root.display()
            )));
        }
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.map_err(|e| Error::Io(std::io::Error::other(e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();
            if is_text_document(&path) {
                docs.push(path);
            } else {
                skipped.push(path);
            }
        }
    }

    docs.sort();
    docs.dedup();
    Ok((docs, skipped))
}

/// Split, embed and index every supported document under `paths`.
pub async fn ingest(
    paths: &[PathBuf],
    splitter: &TextSplitter,
    embedder: &dyn EmbeddingProvider,
    batch_size: usize,
) -> Result<(VectorIndex, IngestReport)> {
    let (docs, skipped) = collect_documents(paths)?;
    for path in &skipped {
        tracing::warn!(path = %path.display(), "Skipping unsupported document");
    }

    let mut pending: Vec<StoredChunk> = Vec::new();
    for path in &docs {
        let text = std::fs::read_to_string(path)?;
        let source = path.display().to_string();
        let pieces = splitter.split(&text);
        tracing::info!(path = %source, chunks = pieces.len(), "Split document");
        pending.extend(pieces.into_iter().map(|text| StoredChunk {
            text,
            source: source.clone(),
        }));
    }

    let mut index = VectorIndex::new(embedder.model_name(), embedder.dimensions());
    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
        let vectors = embedder.embed_batch(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(Error::Upstream(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                batch.len()
            )));
        }
        for (chunk, vector) in batch.iter().cloned().zip(vectors) {
            index.add(chunk, vector)?;
        }
        tracing::debug!(indexed = index.len(), total = pending.len(), "Embedded batch");
    }

    let report = IngestReport {
        files: docs.len(),
        chunks: index.len(),
        skipped,
    };
    Ok((index, report))
}
