//! Splits source documents into page-addressed chunks.
//!
//! PDFs are read page by page via [lopdf]; plain-text formats are treated
//! as a single page 0. Paragraph granularity tracks character offsets
//! within the page text so results can be highlighted downstream.

use std::path::Path;

use crate::{
    chunk::{Chunk, Granularity},
    error::{Error, Result},
};

/// File extensions the chunker accepts. Anything else is rejected with
/// `UnsupportedFile` before any work begins.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md", "text"];

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str())
        })
}

/// Split a document into chunks at the requested granularity.
///
/// Page indices are zero-based. Fails with `UnsupportedFile` for extensions
/// outside the allow-list and `UnreadableDocument` when the file cannot be
/// parsed; callers doing bulk imports isolate the latter per file.
pub fn chunk_document(
    path: &Path,
    granularity: Granularity,
) -> Result<Vec<Chunk>> {
    if !is_supported(path) {
        return Err(Error::UnsupportedFile(path.to_path_buf()));
    }

    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    let pages = if is_pdf {
        extract_pdf_pages(path)?
    } else {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::UnreadableDocument {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        vec![text]
    };

    Ok(split_pages(path, &pages, granularity))
}

/// Extract per-page text from a PDF.
///
/// A page whose content stream cannot be interpreted is kept as an empty
/// string so page numbering stays aligned; a document with no extractable
/// text at all is unreadable.
fn extract_pdf_pages(path: &Path) -> Result<Vec<String>> {
    let doc = lopdf::Document::load(path).map_err(|e| {
        Error::UnreadableDocument {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;

    let mut pages = Vec::new();
    for (page_num, _object_id) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(text) => pages.push(text),
            Err(e) => {
                tracing::debug!(
                    page = page_num,
                    error = %e,
                    "failed to extract page text"
                );
                pages.push(String::new());
            }
        }
    }

    if pages.iter().all(|p| p.trim().is_empty()) {
        return Err(Error::UnreadableDocument {
            path: path.to_path_buf(),
            reason: "no extractable text".to_string(),
        });
    }

    Ok(pages)
}

fn split_pages(
    path: &Path,
    pages: &[String],
    granularity: Granularity,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for (page_idx, text) in pages.iter().enumerate() {
        if text.trim().is_empty() {
            continue;
        }
        let page = page_idx as u32;

        match granularity {
            Granularity::Page => {
                let len = text.chars().count();
                chunks.push(Chunk::new(path, page, 0, len, text.clone()));
            }
            Granularity::Paragraph => {
                chunks.extend(split_paragraphs(path, page, text));
            }
        }
    }

    chunks
}

/// Split page text on blank-line boundaries, preserving character offsets
/// of each trimmed paragraph within the page.
fn split_paragraphs(path: &Path, page: u32, text: &str) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut offset = 0usize;

    for para in text.split("\n\n") {
        let para_len = para.chars().count();
        let trimmed = para.trim();
        if !trimmed.is_empty() {
            let leading =
                para.chars().take_while(|c| c.is_whitespace()).count();
            let lower = offset + leading;
            let upper = lower + trimmed.chars().count();
            chunks.push(Chunk::new(
                path,
                page,
                lower,
                upper,
                trimmed.to_string(),
            ));
        }
        // account for the "\n\n" separator consumed by split
        offset += para_len + 2;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_extension() {
        let err = chunk_document(Path::new("image.png"), Granularity::Page)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFile(_)));
    }

    #[test]
    fn missing_text_file_is_unreadable() {
        let err =
            chunk_document(Path::new("/nonexistent/a.txt"), Granularity::Page)
                .unwrap_err();
        assert!(matches!(err, Error::UnreadableDocument { .. }));
    }

    #[test]
    fn corrupt_pdf_is_unreadable() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();

        let err = chunk_document(&path, Granularity::Page).unwrap_err();
        assert!(matches!(err, Error::UnreadableDocument { .. }));
    }

    #[test]
    fn text_file_is_single_page() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notes.txt");
        std::fs::write(&path, "hello world").unwrap();

        let chunks = chunk_document(&path, Granularity::Page).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page, 0);
        assert_eq!(chunks[0].content, "hello world");
        assert_eq!(chunks[0].bounds, Some((0, 11)));
    }

    #[test]
    fn paragraph_offsets_point_into_page() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notes.md");
        let text = "first paragraph\n\nsecond paragraph\n\nthird";
        std::fs::write(&path, text).unwrap();

        let chunks = chunk_document(&path, Granularity::Paragraph).unwrap();
        assert_eq!(chunks.len(), 3);

        let page_chars: Vec<char> = text.chars().collect();
        for chunk in &chunks {
            let (lower, upper) = chunk.bounds.unwrap();
            let slice: String = page_chars[lower..upper].iter().collect();
            assert_eq!(slice, chunk.content);
        }
    }

    #[test]
    fn paragraph_skips_blank_sections() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notes.txt");
        std::fs::write(&path, "one\n\n\n\ntwo").unwrap();

        let chunks = chunk_document(&path, Granularity::Paragraph).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "one");
        assert_eq!(chunks[1].content, "two");
    }

    #[test]
    fn rechunking_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notes.txt");
        std::fs::write(&path, "alpha\n\nbeta").unwrap();

        let first = chunk_document(&path, Granularity::Paragraph).unwrap();
        let second = chunk_document(&path, Granularity::Paragraph).unwrap();
        let first_ids: Vec<u64> = first.iter().map(|c| c.id).collect();
        let second_ids: Vec<u64> = second.iter().map(|c| c.id).collect();
        assert_eq!(first_ids, second_ids);
    }
}
