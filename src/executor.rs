//! Fans scoring work out across a worker pool, collects results under a
//! single-writer accumulator, and ranks the merged set.
//!
//! Every entry point here is a join barrier: the call returns only after
//! all spawned tasks have settled. Sorting happens after the barrier, so
//! the final order is deterministic regardless of task completion order.

use std::sync::{
    Arc,
    Mutex,
    atomic::{AtomicBool, Ordering},
};

use rayon::prelude::*;

use crate::{
    backend::ScoredResult,
    error::{Error, Result},
};

/// Result cap applied when the caller supplies none (or a non-positive one).
pub const DEFAULT_TOP_K: usize = 25;

/// Resolve a caller-supplied top-K. Non-positive or absent values fall back
/// to [`DEFAULT_TOP_K`] rather than erroring.
pub fn resolve_top_k(requested: Option<i64>) -> usize {
    match requested {
        Some(n) if n > 0 => n as usize,
        _ => DEFAULT_TOP_K,
    }
}

/// Cooperative cancellation for in-flight queries.
///
/// Cancelling stops new work units from being issued; units already running
/// finish but their output is discarded when the query returns `Cancelled`.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Score every unit in parallel, one task per unit.
///
/// Each task's output is tagged with the unit's original ordinal so ranking
/// can tie-break by insertion order. A failed unit is logged and excluded;
/// it never aborts the query.
pub fn score_parallel<U, F>(
    units: &[U],
    cancel: &CancellationToken,
    scorer: F,
) -> Result<Vec<(usize, Vec<ScoredResult>)>>
where
    U: Sync,
    F: Fn(&U) -> Result<Vec<ScoredResult>> + Sync,
{
    let accumulator: Mutex<Vec<(usize, Vec<ScoredResult>)>> =
        Mutex::new(Vec::with_capacity(units.len()));

    units.par_iter().enumerate().for_each(|(ordinal, unit)| {
        if cancel.is_cancelled() {
            return;
        }
        match scorer(unit) {
            Ok(hits) => {
                // A poisoned lock only means another unit panicked; the
                // data itself is still a plain Vec of finished results.
                let mut guard = accumulator
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                guard.push((ordinal, hits));
            }
            Err(e) => {
                tracing::warn!(
                    ordinal,
                    error = %e,
                    "scoring unit failed; excluded from results"
                );
            }
        }
    });

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    Ok(accumulator
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner()))
}

/// Merge accumulated hits into the final ranked list.
///
/// Hits are restored to insertion order first, then stably sorted by score
/// descending, so equal scores keep their original document order.
pub fn rank(
    mut hits: Vec<(usize, Vec<ScoredResult>)>,
    top_k: usize,
) -> Vec<ScoredResult> {
    hits.sort_by_key(|(ordinal, _)| *ordinal);

    let mut flat: Vec<ScoredResult> =
        hits.into_iter().flat_map(|(_, results)| results).collect();

    flat.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    flat.truncate(top_k);
    flat
}

/// A paginated candidate source, polled in bounded batches.
pub trait BatchSource {
    type Item;

    /// Fetch the next batch. The flag reports whether more candidates may
    /// still be available.
    fn next_batch(&mut self) -> Result<(Vec<Self::Item>, bool)>;
}

/// Drain a batch source to exhaustion.
///
/// A source may report more work while returning an empty batch; only the
/// combination of "no more" and an empty batch terminates the loop.
pub fn drain_batches<S: BatchSource>(
    source: &mut S,
    cancel: &CancellationToken,
) -> Result<Vec<S::Item>> {
    let mut items = Vec::new();

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let (batch, more) = source.next_batch()?;
        let empty = batch.is_empty();
        items.extend(batch);
        if !more && empty {
            break;
        }
    }

    Ok(items)
}
