//! Index backend abstraction and on-disk artifact dispatch.
//!
//! Every backend persists under `<support>/<name>.index`. The lexical
//! backend owns a directory (a tantivy index); the vector and term
//! backends own a single JSON file carrying a `kind` tag. [`BackendKind::detect`]
//! reads that layout back without opening the artifact proper.

use std::{fs, path::Path, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    chunk::{Chunk, Granularity},
    embedder::Embedder,
    error::{Error, Result},
    executor::CancellationToken,
    lexical::LexicalBackend,
    term_index::TermBackend,
    vector::VectorBackend,
};

/// Extension for all index artifacts, directory or file.
pub const INDEX_EXTENSION: &str = "index";

/// The three index variants.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Inverted page index with literal-containment bounds.
    Lexical,
    /// Embedding store scored by dot product.
    Vector,
    /// BM25 over preprocessed paragraph terms.
    Term,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Vector => "vector",
            Self::Term => "term",
        }
    }

    /// Chunk granularity this backend expects its input in.
    pub fn granularity(self) -> Granularity {
        match self {
            Self::Lexical => Granularity::Page,
            Self::Vector | Self::Term => Granularity::Paragraph,
        }
    }

    /// Identify which backend wrote the artifact at `path`.
    ///
    /// Directories are always lexical. Files are sniffed by their JSON
    /// `kind` tag, so vector and term artifacts share one layout.
    pub fn detect(path: &Path) -> Result<Self> {
        if path.is_dir() {
            return Ok(Self::Lexical);
        }
        if !path.is_file() {
            return Err(Error::NotFound {
                kind: "index",
                name: path.display().to_string(),
            });
        }

        #[derive(Deserialize)]
        struct Tagged {
            kind: BackendKind,
        }

        let raw = fs::read_to_string(path)?;
        let tagged: Tagged = serde_json::from_str(&raw)?;
        Ok(tagged.kind)
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ranked hit. Bounds are present only when the backend could pin the
/// match to a character range within the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub id: u64,
    pub file: std::path::PathBuf,
    pub page: u32,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper: Option<usize>,
}

/// Common surface of the three index variants.
///
/// Mutations are staged by `add`/`rebuild` and become visible to readers
/// only after `commit`. Backends that cannot add incrementally report
/// `incremental() == false` and are always fed a full rebuild.
pub trait IndexBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Whether `add` can extend an existing artifact in place.
    fn incremental(&self) -> bool;

    /// Stage new chunks on top of the existing contents.
    fn add(&mut self, chunks: &[Chunk]) -> Result<()>;

    /// Replace the entire contents with `chunks`.
    fn rebuild(&mut self, chunks: &[Chunk]) -> Result<()>;

    /// Persist staged mutations. Until this returns, readers see the
    /// previous committed state.
    fn commit(&mut self) -> Result<()>;

    /// Run a ranked query against the committed state.
    fn query(
        &self,
        text: &str,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScoredResult>>;
}

/// Create a fresh backend artifact at `path`, replacing any previous one.
pub fn create(
    kind: BackendKind,
    path: &Path,
    embedder: Arc<dyn Embedder>,
) -> Result<Box<dyn IndexBackend>> {
    match kind {
        BackendKind::Lexical => {
            Ok(Box::new(LexicalBackend::create(path)?))
        }
        BackendKind::Vector => {
            Ok(Box::new(VectorBackend::create(path, embedder)?))
        }
        BackendKind::Term => Ok(Box::new(TermBackend::create(path)?)),
    }
}

/// Open the backend artifact at `path`, detecting its kind from disk.
pub fn open(
    path: &Path,
    embedder: Arc<dyn Embedder>,
) -> Result<Box<dyn IndexBackend>> {
    match BackendKind::detect(path)? {
        BackendKind::Lexical => Ok(Box::new(LexicalBackend::open(path)?)),
        BackendKind::Vector => {
            Ok(Box::new(VectorBackend::open(path, embedder)?))
        }
        BackendKind::Term => Ok(Box::new(TermBackend::open(path)?)),
    }
}

/// Remove the artifact at `path`, whatever backend wrote it.
pub fn delete(path: &Path) -> Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)?;
    } else if path.is_file() {
        fs::remove_file(path)?;
    } else {
        return Err(Error::NotFound {
            kind: "index",
            name: path.display().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;

    #[test]
    fn detect_reports_missing_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let err =
            BackendKind::detect(&tmp.path().join("ghost.index")).unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "index", .. }));
    }

    #[test]
    fn detect_distinguishes_directory_from_tagged_file() {
        let tmp = tempfile::tempdir().unwrap();

        let dir = tmp.path().join("docs.index");
        fs::create_dir(&dir).unwrap();
        assert_eq!(BackendKind::detect(&dir).unwrap(), BackendKind::Lexical);

        let file = tmp.path().join("notes.index");
        fs::write(&file, r#"{"kind":"vector","entries":[]}"#).unwrap();
        assert_eq!(BackendKind::detect(&file).unwrap(), BackendKind::Vector);

        let file = tmp.path().join("terms.index");
        fs::write(&file, r#"{"kind":"term","documents":[]}"#).unwrap();
        assert_eq!(BackendKind::detect(&file).unwrap(), BackendKind::Term);
    }

    #[test]
    fn create_open_roundtrip_preserves_kind() {
        let tmp = tempfile::tempdir().unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));

        for kind in
            [BackendKind::Lexical, BackendKind::Vector, BackendKind::Term]
        {
            let path = tmp.path().join(format!("{kind}.index"));
            let mut backend =
                create(kind, &path, Arc::clone(&embedder)).unwrap();
            backend.commit().unwrap();
            drop(backend);

            let reopened = open(&path, Arc::clone(&embedder)).unwrap();
            assert_eq!(reopened.kind(), kind);
        }
    }

    #[test]
    fn delete_removes_both_layouts() {
        let tmp = tempfile::tempdir().unwrap();

        let dir = tmp.path().join("docs.index");
        fs::create_dir(&dir).unwrap();
        delete(&dir).unwrap();
        assert!(!dir.exists());

        let file = tmp.path().join("notes.index");
        fs::write(&file, r#"{"kind":"term"}"#).unwrap();
        delete(&file).unwrap();
        assert!(!file.exists());

        let err = delete(&tmp.path().join("ghost.index")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
