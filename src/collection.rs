//! Collection lifecycle: ingest, query, stream, delete.
//!
//! A collection is one named index artifact in the support directory. The
//! manager decides between incremental updates and full rebuilds based on
//! what the backend supports and what is already on disk, and isolates
//! per-file ingest failures so one corrupt document cannot sink a batch.

use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use rayon::prelude::*;

use crate::{
    backend::{self, BackendKind, IndexBackend, ScoredResult},
    chunk::Chunk,
    chunker::chunk_document,
    embedder::Embedder,
    error::{Error, Result},
    executor::{CancellationToken, resolve_top_k},
    support_dir::SupportDir,
};

/// How often the lock-file watcher polls for cancellation.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Outcome of a `create_or_update` run.
#[derive(Debug)]
pub struct IngestReport {
    pub indexed_files: Vec<PathBuf>,
    pub failed_files: Vec<(PathBuf, String)>,
    pub chunks: usize,
    /// Whether the artifact was extended in place rather than rebuilt.
    pub incremental: bool,
}

pub struct CollectionManager {
    support: SupportDir,
    embedder: Arc<dyn Embedder>,
}

impl CollectionManager {
    pub fn new(support: SupportDir, embedder: Arc<dyn Embedder>) -> Self {
        Self { support, embedder }
    }

    pub fn support(&self) -> &SupportDir {
        &self.support
    }

    /// Ingest `files` into the named collection, creating it if needed.
    ///
    /// A new collection is created with `kind` (lexical when omitted). An
    /// existing collection keeps the kind detected from its artifact, and
    /// an explicit `kind` that disagrees with it is rejected: switching
    /// kinds means deleting the collection first. A file that fails to
    /// chunk is logged and skipped, but if every file fails the whole
    /// operation fails.
    pub fn create_or_update(
        &self,
        name: &str,
        kind: Option<BackendKind>,
        files: &[PathBuf],
    ) -> Result<IngestReport> {
        validate_name(name)?;
        let path = self.support.index_path(name);

        let existing = if path.exists() {
            Some(BackendKind::detect(&path)?)
        } else {
            None
        };
        if let (Some(existing), Some(requested)) = (existing, kind) {
            if existing != requested {
                return Err(Error::Config(format!(
                    "collection '{name}' is a {existing} index; delete it \
                     before re-indexing as {requested}"
                )));
            }
        }
        let kind = existing.or(kind).unwrap_or(BackendKind::Lexical);

        // Chunk before touching anything on disk: a failed ingest must
        // neither replace the previous committed artifact nor leave an
        // empty one behind on a first build.
        let outcomes: Vec<(PathBuf, Result<Vec<Chunk>>)> = files
            .par_iter()
            .map(|file| {
                (file.clone(), chunk_document(file, kind.granularity()))
            })
            .collect();

        let mut report = IngestReport {
            indexed_files: Vec::new(),
            failed_files: Vec::new(),
            chunks: 0,
            incremental: false,
        };
        let mut chunks = Vec::new();
        for (file, outcome) in outcomes {
            match outcome {
                Ok(file_chunks) => {
                    report.chunks += file_chunks.len();
                    report.indexed_files.push(file);
                    chunks.extend(file_chunks);
                }
                Err(e) => {
                    tracing::warn!(
                        file = %file.display(),
                        error = %e,
                        "skipping document"
                    );
                    report.failed_files.push((file, e.to_string()));
                }
            }
        }

        if !files.is_empty() && report.indexed_files.is_empty() {
            return Err(Error::UnreadableDocument {
                path: self.support.index_path(name),
                reason: format!(
                    "all {} documents failed to ingest",
                    report.failed_files.len()
                ),
            });
        }

        let mut backend = if existing.is_some() {
            backend::open(&path, Arc::clone(&self.embedder))?
        } else {
            backend::create(kind, &path, Arc::clone(&self.embedder))?
        };
        let incremental = existing.is_some() && backend.incremental();
        report.incremental = incremental;

        if incremental {
            backend.add(&chunks)?;
        } else {
            backend.rebuild(&chunks)?;
        }
        backend.commit()?;

        tracing::info!(
            collection = name,
            kind = %kind,
            files = report.indexed_files.len(),
            skipped = report.failed_files.len(),
            chunks = report.chunks,
            incremental,
            "collection updated"
        );

        Ok(report)
    }

    /// Ranked query against an existing collection.
    pub fn query(
        &self,
        name: &str,
        text: &str,
        top_k: Option<i64>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScoredResult>> {
        let backend = self.open_collection(name)?;
        backend.query(text, resolve_top_k(top_k), cancel)
    }

    /// Query and write results as newline-delimited JSON, one result per
    /// line, with a trailing empty line as the end-of-stream marker.
    ///
    /// When `lock_file` is given, its disappearance cancels the query: the
    /// caller deletes the file to abandon a stream it no longer wants.
    pub fn query_stream(
        &self,
        name: &str,
        text: &str,
        top_k: Option<i64>,
        lock_file: Option<&Path>,
        out: &mut dyn Write,
    ) -> Result<()> {
        if let Some(lock) = lock_file {
            if !lock.exists() {
                return Err(Error::Cancelled);
            }
        }

        let cancel = CancellationToken::new();
        let _watch = lock_file.map(|lock| LockFileWatch::spawn(lock, &cancel));

        let results = self.query(name, text, top_k, &cancel)?;

        for result in &results {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            serde_json::to_writer(&mut *out, result)?;
            out.write_all(b"\n")?;
        }
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }

    /// Remove a collection's artifact.
    pub fn delete(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let path = self.support.index_path(name);
        if !path.exists() {
            return Err(Error::NotFound {
                kind: "collection",
                name: name.to_string(),
            });
        }
        backend::delete(&path)?;
        tracing::info!(collection = name, "collection deleted");
        Ok(())
    }

    fn open_collection(&self, name: &str) -> Result<Box<dyn IndexBackend>> {
        validate_name(name)?;
        let path = self.support.index_path(name);
        backend::open(&path, Arc::clone(&self.embedder)).map_err(|e| {
            match e {
                Error::NotFound { .. } => Error::NotFound {
                    kind: "collection",
                    name: name.to_string(),
                },
                other => other,
            }
        })
    }
}

impl std::fmt::Debug for CollectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionManager")
            .field("support", &self.support)
            .finish_non_exhaustive()
    }
}

/// Collection names become file names under the support directory, so they
/// must be a single normal path component.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
    {
        return Err(Error::Config(format!(
            "invalid collection name: {name:?}"
        )));
    }
    Ok(())
}

/// Background watcher that cancels a token when a sentinel file disappears.
/// The watcher thread stops on its own once the guard is dropped.
struct LockFileWatch {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl LockFileWatch {
    fn spawn(lock: &Path, cancel: &CancellationToken) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let lock = lock.to_path_buf();
        let cancel = cancel.clone();

        let handle = thread::spawn(move || {
            loop {
                if thread_stop.load(Ordering::SeqCst) {
                    return;
                }
                if !lock.exists() {
                    cancel.cancel();
                    return;
                }
                thread::sleep(LOCK_POLL_INTERVAL);
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for LockFileWatch {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
