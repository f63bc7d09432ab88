//! Lexical backend: an inverted page index backed by tantivy.
//!
//! Each indexed document is one page, keyed by `file U+001F page` so a
//! re-ingest of the same page replaces rather than duplicates it. Queries
//! page candidates out of the index in fixed-size batches, then checks each
//! candidate page for literal containment of the query to derive character
//! bounds.

use std::path::{Path, PathBuf};

use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    TantivyDocument,
    collector::TopDocs,
    doc,
    query::{Query, QueryParser},
    schema::*,
    tokenizer::{
        LowerCaser,
        RemoveLongFilter,
        SimpleTokenizer,
        Stemmer,
        TextAnalyzer,
    },
};

use crate::{
    backend::{BackendKind, IndexBackend, ScoredResult},
    chunk::{Chunk, chunk_id},
    error::{Error, Result},
    executor::{BatchSource, CancellationToken, drain_batches},
};

/// Candidates are paged out of tantivy this many at a time.
pub const SEARCH_BATCH: usize = 25;

/// Separates the file path from the page number in a document key. A unit
/// separator cannot appear in a path or a decimal page, so `rsplit_once`
/// decodes unambiguously.
const KEY_SEPARATOR: char = '\u{1f}';

const WRITER_MEMORY_BUDGET: usize = 15_000_000;

/// Field names used in the schema.
mod fields {
    pub const KEY: &str = "key";
    pub const BODY: &str = "body";
}

fn encode_key(file: &Path, page: u32) -> String {
    format!("{}{KEY_SEPARATOR}{page}", file.display())
}

fn decode_key(key: &str) -> Option<(PathBuf, u32)> {
    let (file, page) = key.rsplit_once(KEY_SEPARATOR)?;
    let page = page.parse().ok()?;
    Some((PathBuf::from(file), page))
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    builder.add_text_field(fields::KEY, STRING | STORED);

    let body_opts = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("en_stem")
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();
    builder.add_text_field(fields::BODY, body_opts);

    builder.build()
}

fn register_tokenizers(index: &Index) {
    let en_stem = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(Stemmer::new(tantivy::tokenizer::Language::English))
        .build();
    index.tokenizers().register("en_stem", en_stem);
}

pub struct LexicalBackend {
    index: Index,
    reader: IndexReader,
    writer: IndexWriter,
    key: Field,
    body: Field,
}

impl LexicalBackend {
    /// Create a fresh index directory at `path`, replacing any previous one.
    pub fn create(path: &Path) -> Result<Self> {
        if path.exists() {
            if path.is_dir() {
                std::fs::remove_dir_all(path)?;
            } else {
                std::fs::remove_file(path)?;
            }
        }
        std::fs::create_dir_all(path)?;

        let schema = build_schema();
        let mmap_dir = tantivy::directory::MmapDirectory::open(path)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = Index::create(
            mmap_dir,
            schema,
            tantivy::IndexSettings::default(),
        )?;

        Self::from_index(index)
    }

    /// Open an existing index directory.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(Error::NotFound {
                kind: "index",
                name: path.display().to_string(),
            });
        }
        let mmap_dir = tantivy::directory::MmapDirectory::open(path)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = Index::open(mmap_dir)?;
        Self::from_index(index)
    }

    /// In-memory index (for testing).
    #[cfg(test)]
    pub fn open_in_ram() -> Result<Self> {
        let index = Index::create_in_ram(build_schema());
        Self::from_index(index)
    }

    fn from_index(index: Index) -> Result<Self> {
        register_tokenizers(&index);
        let reader = index.reader()?;
        let writer = index.writer(WRITER_MEMORY_BUDGET)?;
        let schema = index.schema();
        let key = schema.get_field(fields::KEY)?;
        let body = schema.get_field(fields::BODY)?;

        Ok(Self {
            index,
            reader,
            writer,
            key,
            body,
        })
    }

    fn add_page(&self, chunk: &Chunk) -> Result<()> {
        let key = encode_key(&chunk.file, chunk.page);

        // Replace any previous version of this page.
        let term = tantivy::Term::from_field_text(self.key, &key);
        self.writer.delete_term(term);

        self.writer.add_document(doc!(
            self.key => key,
            self.body => chunk.content.as_str(),
        ))?;

        Ok(())
    }
}

impl IndexBackend for LexicalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Lexical
    }

    fn incremental(&self) -> bool {
        true
    }

    fn add(&mut self, chunks: &[Chunk]) -> Result<()> {
        for chunk in chunks {
            self.add_page(chunk)?;
        }
        Ok(())
    }

    fn rebuild(&mut self, chunks: &[Chunk]) -> Result<()> {
        self.writer.delete_all_documents()?;
        self.add(chunks)
    }

    fn commit(&mut self) -> Result<()> {
        self.writer
            .commit()
            .map_err(|e| Error::CommitFailed(e.to_string()))?;
        self.reader.reload()?;
        Ok(())
    }

    fn query(
        &self,
        text: &str,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScoredResult>> {
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.body]);
        let (query, _errors) = parser.parse_query_lenient(text);

        let mut source = PagedSearch {
            searcher: &searcher,
            query: &*query,
            key: self.key,
            body: self.body,
            offset: 0,
        };
        let candidates = drain_batches(&mut source, cancel)?;

        let needle = text.trim().to_lowercase();
        let mut results = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let Some((file, page)) = decode_key(&candidate.key) else {
                tracing::warn!(key = %candidate.key, "malformed page key");
                continue;
            };
            let bounds = containment_bounds(&candidate.body, &needle);
            results.push(ScoredResult {
                id: chunk_id(&file, page, 0),
                file,
                page,
                score: candidate.score,
                lower: bounds.map(|(lo, _)| lo),
                upper: bounds.map(|(_, hi)| hi),
            });
        }

        results.truncate(top_k);
        Ok(results)
    }
}

impl std::fmt::Debug for LexicalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexicalBackend").finish_non_exhaustive()
    }
}

struct Candidate {
    score: f32,
    key: String,
    body: String,
}

/// Pages candidates out of a searcher in [`SEARCH_BATCH`]-sized slices.
struct PagedSearch<'a> {
    searcher: &'a tantivy::Searcher,
    query: &'a dyn Query,
    key: Field,
    body: Field,
    offset: usize,
}

impl BatchSource for PagedSearch<'_> {
    type Item = Candidate;

    fn next_batch(&mut self) -> Result<(Vec<Candidate>, bool)> {
        let collector =
            TopDocs::with_limit(SEARCH_BATCH).and_offset(self.offset);
        let top_docs = self.searcher.search(self.query, &collector)?;

        let fetched = top_docs.len();
        self.offset += fetched;

        let mut batch = Vec::with_capacity(fetched);
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = self.searcher.doc(doc_address)?;
            batch.push(Candidate {
                score,
                key: extract_text(&doc, self.key),
                body: extract_text(&doc, self.body),
            });
        }

        // A full batch may mean more candidates remain; a short one is
        // definitive.
        Ok((batch, fetched == SEARCH_BATCH))
    }
}

fn extract_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

/// Case-insensitive literal containment check against the stored page text.
///
/// Returns character (not byte) bounds of the first occurrence, or `None`
/// when the page matched on terms without containing the query verbatim.
/// Bounds address the original page text: lowercasing can expand a
/// character ('İ' lowers to an "i" plus a combining dot), so each lowered
/// character carries the offset of the original character it came from.
fn containment_bounds(page_text: &str, needle: &str) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }
    let needle = needle.to_lowercase();

    let mut haystack = String::with_capacity(page_text.len());
    let mut origin = Vec::with_capacity(page_text.len());
    for (char_idx, ch) in page_text.chars().enumerate() {
        for lowered in ch.to_lowercase() {
            haystack.push(lowered);
            origin.push(char_idx);
        }
    }

    let byte_idx = haystack.find(&needle)?;
    let start = haystack[..byte_idx].chars().count();
    let end = start + needle.chars().count();
    Some((origin[start], origin[end - 1] + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_chunk(file: &str, page: u32, content: &str) -> Chunk {
        Chunk::new(
            Path::new(file),
            page,
            0,
            content.chars().count(),
            content.to_string(),
        )
    }

    #[test]
    fn key_roundtrip() {
        let key = encode_key(Path::new("/docs/q3 report.pdf"), 12);
        let (file, page) = decode_key(&key).unwrap();
        assert_eq!(file, PathBuf::from("/docs/q3 report.pdf"));
        assert_eq!(page, 12);
    }

    #[test]
    fn containment_reports_char_bounds() {
        // Multibyte prefix shifts byte offsets but not character offsets.
        let page = "préface — The Quarterly Report follows.";
        let bounds = containment_bounds(page, "quarterly report").unwrap();
        let chars: Vec<char> = page.chars().collect();
        let matched: String = chars[bounds.0..bounds.1].iter().collect();
        assert_eq!(matched.to_lowercase(), "quarterly report");
    }

    #[test]
    fn containment_bounds_survive_expanding_lowercase() {
        // 'İ' lowers to two characters; bounds must stay pinned to the
        // original text the consumer will slice.
        let page = "İstanbul: freight and trade routes";
        let (lower, upper) = containment_bounds(page, "trade").unwrap();
        let matched: String =
            page.chars().skip(lower).take(upper - lower).collect();
        assert_eq!(matched, "trade");
    }

    #[test]
    fn containment_misses_return_none() {
        assert_eq!(containment_bounds("alpha beta", "gamma"), None);
        assert_eq!(containment_bounds("alpha beta", ""), None);
    }

    #[test]
    fn query_finds_indexed_page_with_bounds() {
        let mut backend = LexicalBackend::open_in_ram().unwrap();
        backend
            .add(&[page_chunk("a.pdf", 0, "The quarterly report is here.")])
            .unwrap();
        backend.commit().unwrap();

        let results = backend
            .query("quarterly report", 10, &CancellationToken::new())
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file, PathBuf::from("a.pdf"));
        assert_eq!(results[0].page, 0);
        assert_eq!(results[0].lower, Some(4));
        assert_eq!(results[0].upper, Some(20));
    }

    #[test]
    fn term_match_without_containment_has_no_bounds() {
        let mut backend = LexicalBackend::open_in_ram().unwrap();
        backend
            .add(&[page_chunk(
                "a.pdf",
                0,
                "report first, quarterly later in the text",
            )])
            .unwrap();
        backend.commit().unwrap();

        let results = backend
            .query("quarterly report", 10, &CancellationToken::new())
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].lower, None);
        assert_eq!(results[0].upper, None);
    }

    #[test]
    fn reingest_replaces_page() {
        let mut backend = LexicalBackend::open_in_ram().unwrap();
        backend.add(&[page_chunk("a.pdf", 0, "old draft text")]).unwrap();
        backend.commit().unwrap();
        backend.add(&[page_chunk("a.pdf", 0, "final draft text")]).unwrap();
        backend.commit().unwrap();

        let results = backend
            .query("draft", 10, &CancellationToken::new())
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn pages_past_one_batch_are_all_returned() {
        let mut backend = LexicalBackend::open_in_ram().unwrap();
        let chunks: Vec<Chunk> = (0..(SEARCH_BATCH as u32 * 2 + 5))
            .map(|page| {
                page_chunk("big.pdf", page, &format!("common term on {page}"))
            })
            .collect();
        backend.add(&chunks).unwrap();
        backend.commit().unwrap();

        let results = backend
            .query("common", 1000, &CancellationToken::new())
            .unwrap();
        assert_eq!(results.len(), SEARCH_BATCH * 2 + 5);
    }

    #[test]
    fn rebuild_discards_previous_contents() {
        let mut backend = LexicalBackend::open_in_ram().unwrap();
        backend.add(&[page_chunk("a.pdf", 0, "obsolete words")]).unwrap();
        backend.commit().unwrap();

        backend
            .rebuild(&[page_chunk("b.pdf", 0, "fresh words")])
            .unwrap();
        backend.commit().unwrap();

        let stale = backend
            .query("obsolete", 10, &CancellationToken::new())
            .unwrap();
        assert!(stale.is_empty());
        let fresh = backend
            .query("fresh", 10, &CancellationToken::new())
            .unwrap();
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn disk_persistence() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("docs.index");

        {
            let mut backend = LexicalBackend::create(&dir).unwrap();
            backend
                .add(&[page_chunk("a.pdf", 3, "persistent data here")])
                .unwrap();
            backend.commit().unwrap();
        }

        {
            let backend = LexicalBackend::open(&dir).unwrap();
            let results = backend
                .query("persistent", 10, &CancellationToken::new())
                .unwrap();
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].page, 3);
        }
    }
}
