//! Flat cosine-similarity index persisted as a directory
//!
//! Layout:
//! - `manifest.json`: model, dimensions, chunk count
//! - `chunks.jsonl`: one stored chunk per line, in vector order
//! - `vectors.bin`: `count * dimensions` little-endian f32, L2-normalized

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const MANIFEST_FILE: &str = "manifest.json";
const CHUNKS_FILE: &str = "chunks.jsonl";
const VECTORS_FILE: &str = "vectors.bin";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub version: u32,
    pub model: String,
    pub dimensions: usize,
    pub count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredChunk {
    pub text: String,
    /// Document the chunk was cut from
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    model: String,
    dimensions: usize,
    chunks: Vec<StoredChunk>,
    vectors: Vec<f32>,
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

impl VectorIndex {
    pub fn new(model: &str, dimensions: usize) -> Self {
        Self {
            model: model.to_string(),
            dimensions,
            chunks: Vec::new(),
            vectors: Vec::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn add(&mut self, chunk: StoredChunk, mut vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(Error::Index(format!(
                "vector has {} dimensions, index expects {}",
                vector.len(),
                self.dimensions
            )));
        }
        normalize(&mut vector);
        self.vectors.extend_from_slice(&vector);
        self.chunks.push(chunk);
        Ok(())
    }

    /// Top `k` chunks by cosine similarity, best first
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(&StoredChunk, f32)>> {
        if query.len() != self.dimensions {
            return Err(Error::Index(format!(
                "query has {} dimensions, index expects {}",
                query.len(),
                self.dimensions
            )));
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimensions)
            .enumerate()
            .map(|(i, v)| (i, v.iter().zip(&query).map(|(a, b)| a * b).sum()))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| (&self.chunks[i], score))
            .collect())
    }

    pub fn exists(dir: &Path) -> bool {
        dir.join(MANIFEST_FILE).is_file()
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;

        let manifest = Manifest {
            version: FORMAT_VERSION,
            model: self.model.clone(),
            dimensions: self.dimensions,
            count: self.chunks.len(),
            created_at: Utc::now(),
        };

        let mut chunks = BufWriter::new(File::create(dir.join(CHUNKS_FILE))?);
        for chunk in &self.chunks {
            serde_json::to_writer(&mut chunks, chunk)?;
            chunks.write_all(b"\n")?;
        }
        chunks.flush()?;

        let mut vectors = BufWriter::new(File::create(dir.join(VECTORS_FILE))?);
        for x in &self.vectors {
            vectors.write_all(&x.to_le_bytes())?;
        }
        vectors.flush()?;

        // Manifest last: a directory without one is not a loadable index
        fs::write(
            dir.join(MANIFEST_FILE),
            serde_json::to_vec_pretty(&manifest)?,
        )?;
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(Error::Index(format!(
                "no index manifest at {}",
                manifest_path.display()
            )));
        }
        let manifest: Manifest = serde_json::from_slice(&fs::read(&manifest_path)?)?;
        if manifest.version != FORMAT_VERSION {
            return Err(Error::Index(format!(
                "unsupported index version {}",
                manifest.version
            )));
        }

        if manifest.dimensions == 0 {
            return Err(Error::Index("manifest declares zero dimensions".into()));
        }
        let expected_values = manifest
            .count
            .checked_mul(manifest.dimensions)
            .ok_or_else(|| {
                Error::Index(format!(
                    "manifest size {} x {} overflows",
                    manifest.count, manifest.dimensions
                ))
            })?;

        let mut chunks = Vec::new();
        let reader = BufReader::new(File::open(dir.join(CHUNKS_FILE))?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            chunks.push(serde_json::from_str::<StoredChunk>(&line)?);
        }

        let bytes = fs::read(dir.join(VECTORS_FILE))?;
        if bytes.len() % 4 != 0 {
            return Err(Error::Index("vectors.bin is not a whole number of f32".into()));
        }
        let vectors: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        if chunks.len() != manifest.count || vectors.len() != expected_values {
            return Err(Error::Index(format!(
                "index is inconsistent: manifest says {} x {}, found {} chunks and {} values",
                manifest.count,
                manifest.dimensions,
                chunks.len(),
                vectors.len()
            )));
        }

        Ok(Self {
            model: manifest.model,
            dimensions: manifest.dimensions,
            chunks,
            vectors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(text: &str) -> StoredChunk {
        StoredChunk {
            text: text.to_string(),
            source: "test.md".to_string(),
        }
    }

    fn sample() -> VectorIndex {
        let mut index = VectorIndex::new("test-model", 3);
        index.add(chunk("x axis"), vec![1.0, 0.0, 0.0]).unwrap();
        index.add(chunk("y axis"), vec![0.0, 2.0, 0.0]).unwrap();
        index.add(chunk("xy"), vec![1.0, 1.0, 0.0]).unwrap();
        index
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let index = sample();
        let hits = index.search(&[0.0, 1.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.text, "y axis");
        assert_eq!(hits[1].0.text, "xy");
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn test_search_caps_at_k() {
        let index = sample();
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 10).unwrap().len(), 3);
        assert!(index.search(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = VectorIndex::new("m", 3);
        assert!(index.add(chunk("bad"), vec![1.0, 2.0]).is_err());
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("vector_index");
        let index = sample();
        index.save(&dir).unwrap();
        assert!(VectorIndex::exists(&dir));

        let loaded = VectorIndex::load(&dir).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.model(), "test-model");
        assert_eq!(loaded.dimensions(), 3);
        let hits = loaded.search(&[1.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].0.text, "x axis");
    }

    #[test]
    fn test_load_missing_dir() {
        let temp = TempDir::new().unwrap();
        let err = VectorIndex::load(&temp.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::Index(_)));
    }

    #[test]
    fn test_load_truncated_vectors() {
        let temp = TempDir::new().unwrap();
        let index = sample();
        index.save(temp.path()).unwrap();
        let path = temp.path().join(VECTORS_FILE);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

        assert!(VectorIndex::load(temp.path()).is_err());
    }

    fn write_manifest(dir: &Path, dimensions: usize, count: usize) {
        let manifest = serde_json::json!({
            "version": FORMAT_VERSION,
            "model": "m",
            "dimensions": dimensions,
            "count": count,
            "created_at": "2024-01-01T00:00:00Z",
        });
        fs::write(dir.join(MANIFEST_FILE), manifest.to_string()).unwrap();
        fs::write(dir.join(CHUNKS_FILE), b"").unwrap();
        fs::write(dir.join(VECTORS_FILE), b"").unwrap();
    }

    #[test]
    fn test_load_corrupt_manifest_count() {
        let temp = TempDir::new().unwrap();

        write_manifest(temp.path(), 3, 1 << 62);
        assert!(matches!(
            VectorIndex::load(temp.path()).unwrap_err(),
            Error::Index(_)
        ));

        write_manifest(temp.path(), usize::MAX, 2);
        assert!(matches!(
            VectorIndex::load(temp.path()).unwrap_err(),
            Error::Index(_)
        ));
    }

    #[test]
    fn test_load_zero_dimensions() {
        let temp = TempDir::new().unwrap();
        write_manifest(temp.path(), 0, 0);
        assert!(matches!(
            VectorIndex::load(temp.path()).unwrap_err(),
            Error::Index(_)
        ));
    }
}
