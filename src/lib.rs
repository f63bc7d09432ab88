//! docsift - a local document indexing and ranked similarity query engine.
//!
//! docsift splits PDF and plain-text documents into page- or
//! paragraph-addressed chunks, indexes them into one of three
//! interchangeable backends (lexical via [Tantivy](https://github.com/quickwit-oss/tantivy),
//! vector via embeddings, or BM25 over preprocessed terms), and answers
//! ranked queries against named collections stored in a support directory.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use docsift::{
//!     backend::BackendKind,
//!     collection::CollectionManager,
//!     embedder::HashEmbedder,
//!     executor::CancellationToken,
//!     support_dir::SupportDir,
//! };
//!
//! let support = SupportDir::resolve(None).unwrap();
//! let manager =
//!     CollectionManager::new(support, Arc::new(HashEmbedder::default_384()));
//!
//! manager
//!     .create_or_update("papers", Some(BackendKind::Lexical), &[
//!         "report.pdf".into(),
//!     ])
//!     .unwrap();
//!
//! let results = manager
//!     .query("papers", "quarterly revenue", None, &CancellationToken::new())
//!     .unwrap();
//! for r in &results {
//!     println!("{}:{} (score: {:.3})", r.file.display(), r.page, r.score);
//! }
//! ```

pub mod backend;
pub mod chunk;
pub mod chunker;
pub mod collection;
pub mod embedder;
pub mod error;
pub mod executor;
pub mod lexical;
pub mod support_dir;
pub mod term_index;
pub mod vector;

pub use backend::{BackendKind, IndexBackend, ScoredResult};
pub use chunk::{Chunk, Granularity};
pub use collection::CollectionManager;
pub use embedder::{Embedder, HashEmbedder};
pub use error::{Error, Result};
pub use executor::CancellationToken;
pub use support_dir::SupportDir;
