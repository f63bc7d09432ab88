//! Term backend: BM25 over preprocessed paragraph terms.
//!
//! Content and query text run through the same pipeline (tokenize,
//! lowercase, stop words, stemming, negation propagation), so "no growth"
//! and "growth" index to different terms. The artifact keeps per-document
//! weighted term frequencies only; corpus statistics are recomputed from
//! them, which is why this backend rebuilds from scratch instead of adding
//! incrementally.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tantivy::tokenizer::{
    LowerCaser,
    RemoveLongFilter,
    SimpleTokenizer,
    Stemmer,
    StopWordFilter,
    TextAnalyzer,
};

use crate::{
    backend::{BackendKind, IndexBackend, ScoredResult},
    chunk::Chunk,
    error::{Error, Result},
    executor::{CancellationToken, rank, score_parallel},
};

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

/// How many terms after a negation trigger get the negated marker.
const NEGATION_WINDOW: usize = 3;

/// Relative weight of paragraph content terms vs. file-name terms.
const CONTENT_WEIGHT: f32 = 2.0;
const FILE_WEIGHT: f32 = 1.0;

/// Negation triggers. Deliberately absent from [`STOPWORDS`]; dropping them
/// there would erase the distinction negation propagation exists to keep.
const NEGATIONS: &[&str] = &["not", "no", "never", "cannot", "without"];

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if",
    "in", "into", "is", "it", "its", "of", "on", "or", "such", "that",
    "the", "their", "then", "there", "these", "they", "this", "to", "was",
    "will", "with",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocEntry {
    id: u64,
    file: PathBuf,
    page: u32,
    lower: Option<usize>,
    upper: Option<usize>,
    /// Weighted term frequencies (content terms count double).
    terms: HashMap<String, f32>,
    /// Weighted document length, kept alongside `terms` so scoring does
    /// not re-sum the map.
    length: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Artifact {
    kind: BackendKind,
    documents: Vec<DocEntry>,
}

pub struct TermBackend {
    path: PathBuf,
    documents: Vec<DocEntry>,
}

impl TermBackend {
    pub fn create(path: &Path) -> Result<Self> {
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            documents: Vec::new(),
        })
    }

    pub fn open(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|_| Error::NotFound {
            kind: "index",
            name: path.display().to_string(),
        })?;
        let artifact: Artifact = serde_json::from_str(&raw)?;

        if artifact.kind != BackendKind::Term {
            return Err(Error::Config(format!(
                "expected a term index at {}, found {}",
                path.display(),
                artifact.kind
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            documents: artifact.documents,
        })
    }

    fn avg_length(&self) -> f32 {
        if self.documents.is_empty() {
            return 0.0;
        }
        let total: f32 = self.documents.iter().map(|d| d.length).sum();
        total / self.documents.len() as f32
    }

    fn document_frequency(&self, term: &str) -> usize {
        self.documents
            .iter()
            .filter(|d| d.terms.contains_key(term))
            .count()
    }
}

impl IndexBackend for TermBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Term
    }

    fn incremental(&self) -> bool {
        false
    }

    fn add(&mut self, _chunks: &[Chunk]) -> Result<()> {
        Err(Error::Config(
            "term index does not support incremental adds; use rebuild"
                .to_string(),
        ))
    }

    fn rebuild(&mut self, chunks: &[Chunk]) -> Result<()> {
        self.documents.clear();

        for chunk in chunks {
            let mut terms: HashMap<String, f32> = HashMap::new();
            let mut length = 0.0;

            for term in preprocess(&chunk.content) {
                *terms.entry(term).or_insert(0.0) += CONTENT_WEIGHT;
                length += CONTENT_WEIGHT;
            }
            let file_name = chunk
                .file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            for term in preprocess(&file_name) {
                *terms.entry(term).or_insert(0.0) += FILE_WEIGHT;
                length += FILE_WEIGHT;
            }

            self.documents.push(DocEntry {
                id: chunk.id,
                file: chunk.file.clone(),
                page: chunk.page,
                lower: chunk.bounds.map(|(lo, _)| lo),
                upper: chunk.bounds.map(|(_, hi)| hi),
                terms,
                length,
            });
        }

        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let artifact = Artifact {
            kind: BackendKind::Term,
            documents: std::mem::take(&mut self.documents),
        };
        let json = serde_json::to_string(&artifact)?;
        self.documents = artifact.documents;

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
        let query_terms = preprocess(text);
        if query_terms.is_empty() || self.documents.is_empty() {
            return Ok(Vec::new());
        }

        let n = self.documents.len() as f32;
        let avgdl = self.avg_length();
        let idf: Vec<(String, f32)> = query_terms
            .into_iter()
            .map(|term| {
                let df = self.document_frequency(&term) as f32;
                let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                (term, idf)
            })
            .collect();

        let hits = score_parallel(&self.documents, cancel, |doc| {
            let mut score = 0.0;
            for (term, idf) in &idf {
                let Some(&tf) = doc.terms.get(term) else {
                    continue;
                };
                let norm = BM25_K1
                    * (1.0 - BM25_B + BM25_B * doc.length / avgdl.max(1.0));
                score += idf * (tf * (BM25_K1 + 1.0)) / (tf + norm);
            }
            if score <= 0.0 {
                return Ok(Vec::new());
            }
            Ok(vec![ScoredResult {
                id: doc.id,
                file: doc.file.clone(),
                page: doc.page,
                score,
                lower: doc.lower,
                upper: doc.upper,
            }])
        })?;

        Ok(rank(hits, top_k))
    }
}

impl std::fmt::Debug for TermBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermBackend")
            .field("path", &self.path)
            .field("documents", &self.documents.len())
            .finish_non_exhaustive()
    }
}

fn analyzer() -> TextAnalyzer {
    let stopwords: Vec<String> =
        STOPWORDS.iter().map(|w| w.to_string()).collect();
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(stopwords))
        .filter(Stemmer::new(tantivy::tokenizer::Language::English))
        .build()
}

/// Run text through the full pipeline: analyzer, then negation propagation.
fn preprocess(text: &str) -> Vec<String> {
    let mut analyzer = analyzer();
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while stream.advance() {
        tokens.push(stream.token().text.clone());
    }
    propagate_negations(tokens)
}

/// Rewrite the terms following a negation trigger with a `!` marker, so
/// negated and plain mentions of a term never match each other. The
/// trigger itself is dropped.
fn propagate_negations(tokens: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut remaining = 0usize;

    for token in tokens {
        if NEGATIONS.contains(&token.as_str()) {
            remaining = NEGATION_WINDOW;
            continue;
        }
        if remaining > 0 {
            out.push(format!("!{token}"));
            remaining -= 1;
        } else {
            out.push(token);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn para_chunk(file: &str, page: u32, lower: usize, content: &str) -> Chunk {
        Chunk::new(
            Path::new(file),
            page,
            lower,
            lower + content.chars().count(),
            content.to_string(),
        )
    }

    #[test]
    fn pipeline_lowercases_stems_and_drops_stopwords() {
        let terms = preprocess("The Runners are Running");
        assert_eq!(terms, vec!["runner", "run"]);
    }

    #[test]
    fn negation_marks_following_terms() {
        let terms = preprocess("revenue did not grow this quarter");
        assert!(terms.contains(&"revenu".to_string()));
        assert!(terms.contains(&"!grow".to_string()));
        assert!(!terms.contains(&"grow".to_string()));
        assert!(!terms.contains(&"not".to_string()));
    }

    #[test]
    fn negation_window_is_bounded() {
        let terms = preprocess("not one two three four");
        assert_eq!(terms, vec!["!one", "!two", "!three", "four"]);
    }

    #[test]
    fn negated_query_does_not_match_plain_mention() {
        let mut backend = TermBackend {
            path: PathBuf::from("unused.index"),
            documents: Vec::new(),
        };
        backend
            .rebuild(&[
                para_chunk("a.txt", 0, 0, "sales showed growth"),
                para_chunk("a.txt", 0, 40, "sales showed no growth"),
            ])
            .unwrap();

        let results = backend
            .query("no growth", 10, &CancellationToken::new())
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].lower, Some(40));
    }

    #[test]
    fn rare_terms_outrank_common_ones() {
        let mut backend = TermBackend {
            path: PathBuf::from("unused.index"),
            documents: Vec::new(),
        };
        let mut chunks: Vec<Chunk> = (0..10)
            .map(|i| {
                para_chunk("a.txt", 0, i * 100, "common filler paragraph")
            })
            .collect();
        chunks.push(para_chunk("a.txt", 1, 0, "common zygote paragraph"));
        backend.rebuild(&chunks).unwrap();

        let results = backend
            .query("common zygote", 10, &CancellationToken::new())
            .unwrap();
        assert_eq!(results[0].page, 1);
    }

    #[test]
    fn file_name_terms_contribute() {
        let mut backend = TermBackend {
            path: PathBuf::from("unused.index"),
            documents: Vec::new(),
        };
        backend
            .rebuild(&[
                para_chunk("budget.txt", 0, 0, "figures and tables"),
                para_chunk("minutes.txt", 0, 0, "figures and tables"),
            ])
            .unwrap();

        let results = backend
            .query("budget figures", 10, &CancellationToken::new())
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].file, PathBuf::from("budget.txt"));
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn add_is_rejected() {
        let mut backend = TermBackend {
            path: PathBuf::from("unused.index"),
            documents: Vec::new(),
        };
        let err = backend
            .add(&[para_chunk("a.txt", 0, 0, "text")])
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn empty_query_returns_nothing() {
        let mut backend = TermBackend {
            path: PathBuf::from("unused.index"),
            documents: Vec::new(),
        };
        backend
            .rebuild(&[para_chunk("a.txt", 0, 0, "something indexed")])
            .unwrap();

        let results = backend
            .query("the and of", 10, &CancellationToken::new())
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn commit_then_open_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("terms.index");

        {
            let mut backend = TermBackend::create(&path).unwrap();
            backend
                .rebuild(&[para_chunk("a.txt", 4, 9, "persisted paragraph")])
                .unwrap();
            backend.commit().unwrap();
        }

        let reopened = TermBackend::open(&path).unwrap();
        let results = reopened
            .query("persisted", 10, &CancellationToken::new())
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].page, 4);
        assert_eq!(results[0].lower, Some(9));
    }
}
