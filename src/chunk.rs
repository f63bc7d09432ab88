use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// How finely a document is split into chunks.
///
/// The lexical backend indexes whole pages (the page text is what gets
/// checked for literal query containment at search time); the vector and
/// term backends work on paragraph spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Granularity {
    Page,
    Paragraph,
}

/// An addressable unit of document content.
///
/// Immutable once created. The `id` derives deterministically from
/// `(file, page, lower bound)`, so re-chunking an unchanged document always
/// yields the same ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: u64,
    pub content: String,
    pub file: PathBuf,
    /// Zero-based page index within the source document.
    pub page: u32,
    /// Character (not byte) lower/upper bounds within the page text,
    /// when known.
    pub bounds: Option<(usize, usize)>,
}

impl Chunk {
    pub fn new(
        file: &Path,
        page: u32,
        lower: usize,
        upper: usize,
        content: String,
    ) -> Self {
        Self {
            id: chunk_id(file, page, lower),
            content,
            file: file.to_path_buf(),
            page,
            bounds: Some((lower, upper)),
        }
    }
}

/// Stable chunk identifier from `(file path, page, character offset)`.
///
/// Uses FNV-1a rather than `DefaultHasher` because the latter's seed is not
/// guaranteed stable across processes, and chunk ids must survive a rebuild
/// in a different process.
pub fn chunk_id(file: &Path, page: u32, lower: usize) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in file.to_string_lossy().as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    for byte in page.to_le_bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    for byte in (lower as u64).to_le_bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
