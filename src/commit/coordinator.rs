//! CommitCoordinator - folds buffered updates into the committed index
//!
//! A commit:
//! 1. Claims a generation and the log position it folds through
//! 2. Folds every buffered record at or below that position
//! 3. Installs its snapshot unless a newer generation got there first
//! 4. Releases the folded records and writes a commit marker
//! 5. Compacts the log when the commit was durable
//!
//! Commits run concurrently up to `max_concurrent_commits`. Generations are
//! claimed in order but may finish in any order; an older generation that
//! finishes after a newer one was installed is superseded, never installed.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;

use crate::index::{CommittedIndex, FoldBatch};
use crate::observability::{Event, MetricsRegistry};
use crate::update_log::UpdateLog;

use super::errors::{CommitError, CommitResult};
use super::snapshot::{CommittedSnapshot, SnapshotCell};

/// Result of one commit call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommitOutcome {
    pub generation: u64,
    pub through_sequence: u64,
    /// False when a newer generation was installed first
    pub installed: bool,
    /// Number of records in the folded batch
    pub folded: usize,
}

struct Claims {
    next_generation: u64,
    pending: BTreeSet<u64>,
}

/// Holds one in-flight commit slot until dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, max: usize) -> Option<Self> {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| InFlight(counter))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct CommitCoordinator {
    index: Arc<dyn CommittedIndex>,
    log: Arc<UpdateLog>,
    snapshots: Arc<SnapshotCell>,
    metrics: Arc<MetricsRegistry>,
    max_concurrent: usize,
    dbq_retention: usize,
    in_flight: AtomicUsize,
    claims: Mutex<Claims>,
    /// Snapshots replaced by an install. Any still alive pins its generation.
    retired: Mutex<Vec<Weak<CommittedSnapshot>>>,
}

impl CommitCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: Arc<dyn CommittedIndex>,
        log: Arc<UpdateLog>,
        snapshots: Arc<SnapshotCell>,
        metrics: Arc<MetricsRegistry>,
        max_concurrent: usize,
        dbq_retention: usize,
        next_generation: u64,
    ) -> Self {
        Self {
            index,
            log,
            snapshots,
            metrics,
            max_concurrent,
            dbq_retention,
            in_flight: AtomicUsize::new(0),
            claims: Mutex::new(Claims {
                next_generation: next_generation.max(1),
                pending: BTreeSet::new(),
            }),
            retired: Mutex::new(Vec::new()),
        }
    }

    /// The generation the next commit will claim.
    pub fn next_generation(&self) -> u64 {
        self.claims.lock().next_generation
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn commit(&self, durable: bool) -> CommitResult<CommitOutcome> {
        let Some(_slot) = InFlight::enter(&self.in_flight, self.max_concurrent) else {
            tracing::warn!(
                event = %Event::CommitRejected,
                max = self.max_concurrent,
                "too many concurrent commits"
            );
            return Err(CommitError::TooManyCommits {
                max: self.max_concurrent,
            });
        };

        let batch = {
            let mut claims = self.claims.lock();
            let generation = claims.next_generation;
            claims.next_generation += 1;
            let through_sequence = self.log.last_sequence();
            let records = self.log.buffered_through(through_sequence);
            claims.pending.insert(generation);
            FoldBatch {
                generation,
                through_sequence,
                records,
                durable,
            }
        };

        tracing::info!(
            event = %Event::CommitStart,
            generation = batch.generation,
            through_sequence = batch.through_sequence,
            records = batch.records.len(),
            durable = durable,
            "commit started"
        );

        let result = self.fold_and_install(&batch);
        self.claims.lock().pending.remove(&batch.generation);
        self.index.compact(self.min_live_generation());
        result
    }

    fn fold_and_install(&self, batch: &FoldBatch) -> CommitResult<CommitOutcome> {
        if let Err(e) = self.index.fold(batch) {
            self.metrics.increment_commit_failures();
            tracing::error!(
                event = %Event::CommitFailed,
                generation = batch.generation,
                error = %e,
                "fold failed; records stay buffered"
            );
            return Err(e.into());
        }

        let snapshot = CommittedSnapshot::new(
            batch.generation,
            batch.through_sequence,
            Arc::clone(&self.index),
        );
        let installed = {
            let mut retired = self.retired.lock();
            match self.snapshots.install_if_newer(snapshot) {
                Some(replaced) => {
                    retired.push(Arc::downgrade(&replaced));
                    true
                }
                None => false,
            }
        };

        let outcome = CommitOutcome {
            generation: batch.generation,
            through_sequence: batch.through_sequence,
            installed,
            folded: batch.records.len(),
        };

        if !installed {
            self.metrics.increment_superseded_commits();
            tracing::info!(
                event = %Event::CommitSuperseded,
                generation = batch.generation,
                installed_generation = self.snapshots.generation(),
                "commit superseded by newer generation"
            );
            return Ok(outcome);
        }

        self.log.release_through(batch.through_sequence);
        if let Err(e) =
            self.log
                .append_commit_marker(batch.generation, batch.through_sequence, batch.durable)
        {
            self.metrics.increment_commit_failures();
            tracing::error!(
                event = %Event::CommitFailed,
                generation = batch.generation,
                error = %e,
                "commit marker write failed"
            );
            return Err(e.into());
        }

        if batch.durable && self.index.persists_durable_folds() {
            self.compact_log(batch.through_sequence);
        }

        self.metrics.increment_commits(batch.durable);
        tracing::info!(
            event = %Event::CommitInstalled,
            generation = batch.generation,
            through_sequence = batch.through_sequence,
            durable = batch.durable,
            "commit installed"
        );
        Ok(outcome)
    }

    /// Compaction failure loses nothing; the next durable commit retries.
    fn compact_log(&self, through: u64) {
        match self.log.compact_through(through, self.dbq_retention) {
            Ok(stats) => {
                self.metrics.increment_log_compactions();
                tracing::info!(
                    event = %Event::LogCompacted,
                    through_sequence = through,
                    kept = stats.kept,
                    dropped = stats.dropped,
                    bytes = stats.bytes,
                    dbq_evicted_through = stats.dbq_evicted_through,
                    "update log compacted"
                );
            }
            Err(e) => {
                tracing::warn!(
                    event = %Event::LogCompacted,
                    through_sequence = through,
                    error = %e,
                    "update log compaction failed"
                );
            }
        }
    }

    /// Oldest generation any reader or in-flight fold can still observe.
    pub fn min_live_generation(&self) -> u64 {
        let mut min = self.snapshots.generation();
        if let Some(&pending) = self.claims.lock().pending.first() {
            min = min.min(pending);
        }

        let mut retired = self.retired.lock();
        retired.retain(|snapshot| snapshot.strong_count() > 0);
        for snapshot in retired.iter().filter_map(Weak::upgrade) {
            min = min.min(snapshot.generation());
        }
        min
    }
}
