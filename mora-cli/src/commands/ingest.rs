//! Ingest command: build the vector index from text and Markdown documents.

use anyhow::{Context, Result};
use mora::config::Config;
use mora::retrieval::{ingest, TextSplitter};
use std::path::PathBuf;
use std::time::Instant;

pub async fn run_ingest(
    config: &Config,
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<()> {
    let output = output.unwrap_or_else(|| config.retrieval.index_dir.clone());
    let embedder = mora::embedding::create_provider(&config.embedding)
        .await
        .context("Failed to create embedding provider")?;
    let splitter = TextSplitter::new(chunk_size, chunk_overlap);

    println!(
        "Ingesting {} path(s) with {} ({} dims)...",
        inputs.len(),
        embedder.model_name(),
        embedder.dimensions()
    );
    let started = Instant::now();

    let (index, report) = ingest(
        &inputs,
        &splitter,
        embedder.as_ref(),
        config.embedding.batch_size,
    )
    .await?;
    index
        .save(&output)
        .with_context(|| format!("Failed to write index to {:?}", output))?;

    println!("Index written to {:?}", output);
    println!("  Documents: {}", report.files);
    println!("  Chunks:    {}", report.chunks);
    if !report.skipped.is_empty() {
        println!("  Skipped:   {} (unsupported format)", report.skipped.len());
    }
    println!("  Took:      {:.2}s", started.elapsed().as_secs_f64());

    Ok(())
}
