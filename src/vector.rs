//! Vector backend: chunk content scored by embedding cosine similarity.
//!
//! No vectors are persisted. The artifact stores chunk text only; at query
//! time the injected embedder runs once for the query and once per chunk,
//! both vectors are L2-normalized, and the score is their dot product. The
//! artifact is a single JSON file; `commit` writes it through a temp file
//! and rename so readers never observe a partial artifact.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::{
    backend::{BackendKind, IndexBackend, ScoredResult},
    chunk::Chunk,
    embedder::Embedder,
    error::{Error, Result},
    executor::{CancellationToken, rank, score_parallel},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    id: u64,
    file: PathBuf,
    page: u32,
    lower: Option<usize>,
    upper: Option<usize>,
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Artifact {
    kind: BackendKind,
    entries: Vec<Entry>,
}

pub struct VectorBackend {
    path: PathBuf,
    embedder: Arc<dyn Embedder>,
    entries: Vec<Entry>,
}

impl VectorBackend {
    pub fn create(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            embedder,
            entries: Vec::new(),
        })
    }

    pub fn open(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|_| Error::NotFound {
            kind: "index",
            name: path.display().to_string(),
        })?;
        let artifact: Artifact = serde_json::from_str(&raw)?;

        if artifact.kind != BackendKind::Vector {
            return Err(Error::Config(format!(
                "expected a vector index at {}, found {}",
                path.display(),
                artifact.kind
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            embedder,
            entries: artifact.entries,
        })
    }

    fn embed_normalized(&self, text: &str) -> Result<Vec<f32>> {
        let raw = self.embedder.embed(text)?;
        if raw.len() != self.embedder.dimension() {
            return Err(Error::Embedding(format!(
                "embedder returned {} dimensions, expected {}",
                raw.len(),
                self.embedder.dimension()
            )));
        }
        Ok(normalize(raw))
    }
}

impl IndexBackend for VectorBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vector
    }

    fn incremental(&self) -> bool {
        true
    }

    fn add(&mut self, chunks: &[Chunk]) -> Result<()> {
        for chunk in chunks {
            // Replace any previous version of this chunk.
            self.entries.retain(|e| e.id != chunk.id);
            self.entries.push(Entry {
                id: chunk.id,
                file: chunk.file.clone(),
                page: chunk.page,
                lower: chunk.bounds.map(|(lo, _)| lo),
                upper: chunk.bounds.map(|(_, hi)| hi),
                content: chunk.content.clone(),
            });
        }
        Ok(())
    }

    fn rebuild(&mut self, chunks: &[Chunk]) -> Result<()> {
        self.entries.clear();
        self.add(chunks)
    }

    fn commit(&mut self) -> Result<()> {
        let artifact = Artifact {
            kind: BackendKind::Vector,
            entries: std::mem::take(&mut self.entries),
        };
        let json = serde_json::to_string(&artifact)?;
        self.entries = artifact.entries;

        let tmp = self.path.with_extension("index.tmp");
        fs::write(&tmp, json)
            .and_then(|()| fs::rename(&tmp, &self.path))
            .map_err(|e| Error::CommitFailed(e.to_string()))?;
        Ok(())
    }

    fn query(
        &self,
        text: &str,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScoredResult>> {
        let query_vec = self.embed_normalized(text)?;

        // One embedding per chunk, computed inside the fan-out; a chunk the
        // embedder chokes on is excluded, not fatal.
        let hits = score_parallel(&self.entries, cancel, |entry| {
            let chunk_vec = self.embed_normalized(&entry.content)?;
            Ok(vec![ScoredResult {
                id: entry.id,
                file: entry.file.clone(),
                page: entry.page,
                score: dot_product(&query_vec, &chunk_vec),
                lower: entry.lower,
                upper: entry.upper,
            }])
        })?;

        Ok(rank(hits, top_k))
    }
}

impl std::fmt::Debug for VectorBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorBackend")
            .field("path", &self.path)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

/// L2-normalize a vector. An all-NaN or zero-norm input maps to the zero
/// vector instead of propagating NaN into every later comparison.
fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    if v.iter().all(|x| x.is_nan()) {
        v.fill(0.0);
        return v;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        v.fill(0.0);
        return v;
    }
    for x in &mut v {
        *x /= norm;
    }
    v
}

/// Dot product with NaN clamped to zero so a single bad vector cannot sort
/// above every real score.
fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    let sum: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    if sum.is_nan() { 0.0 } else { sum }
}
