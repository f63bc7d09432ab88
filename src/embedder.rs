//! Embedding capability injected into the vector backend.
//!
//! There is no process-wide model singleton: callers hand the backend an
//! `Arc<dyn Embedder>` scoped to one collection's operation. The default
//! [`HashEmbedder`] produces deterministic (but non-semantic) vectors from
//! FNV-1a hashing, so the engine works offline and tests need no model
//! files.

use crate::error::Result;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Tokens shorter than this are filtered out.
const MIN_TOKEN_LEN: usize = 2;

/// Default embedding dimension.
pub const DEFAULT_DIMENSION: usize = 384;

/// Produces a raw (un-normalized) embedding vector for a piece of text.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn dimension(&self) -> usize;
}

/// Hash-based embedder: each token maps to one dimension via FNV-1a, with
/// a sign taken from the hash's high bit. Captures lexical overlap only.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// # Panics
    ///
    /// Panics if `dimension` is zero.
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "dimension must be > 0");
        Self { dimension }
    }

    pub fn default_384() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::default_384()
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embedding = vec![0.0_f32; self.dimension];

        for token in tokenize(text) {
            let hash = fnv1a(token.as_bytes());
            let idx = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
            embedding[idx] += sign;
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= MIN_TOKEN_LEN)
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_has_requested_dimension() {
        let embedder = HashEmbedder::new(64);
        let v = embedder.embed("hello world").unwrap();
        assert_eq!(v.len(), 64);
        assert_eq!(embedder.dimension(), 64);
    }

    #[test]
    fn embedding_is_deterministic() {
        let embedder = HashEmbedder::default_384();
        let a = embedder.embed("the quarterly report").unwrap();
        let b = embedder.embed("the quarterly report").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_texts_usually_differ() {
        let embedder = HashEmbedder::default_384();
        let a = embedder.embed("alpha beta gamma").unwrap();
        let b = embedder.embed("delta epsilon zeta").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn case_is_normalized() {
        let embedder = HashEmbedder::default_384();
        let a = embedder.embed("Quarterly Report").unwrap();
        let b = embedder.embed("quarterly report").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(16);
        let v = embedder.embed("").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
