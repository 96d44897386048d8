//! One-shot scan: capture a still image, encrypt it, store and upload it.

use anyhow::{Context, Result};
use mora_scan::{ImageFileSource, ScanConfig, ScanPipeline};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
struct ScanSection {
    #[serde(default)]
    scan: Option<ScanConfig>,
}

/// The `[scan]` table of the config file, or defaults when absent.
pub fn load_scan_config(path: &Path) -> Result<ScanConfig> {
    if !path.exists() {
        return Ok(ScanConfig::default());
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let section: ScanSection =
        toml::from_str(&content).with_context(|| format!("Invalid [scan] section in {:?}", path))?;
    Ok(section.scan.unwrap_or_default())
}

pub async fn run_scan(
    config: ScanConfig,
    image: Option<PathBuf>,
    filename: Option<String>,
) -> Result<()> {
    let image = image.or_else(|| config.image_source.clone()).context(
        "No image given: pass --image or set scan.image_source in the config file",
    )?;
    let pipeline = ScanPipeline::from_config(&config).context("Failed to build scan pipeline")?;

    let outcome = pipeline
        .run_once(&ImageFileSource::new(image), filename)
        .await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
