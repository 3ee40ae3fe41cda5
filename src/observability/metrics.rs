//! Metrics registry
//!
//! - Counters only, monotonic, reset on process start
//! - Relaxed atomics; exact totals, no cross-counter consistency

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    adds: AtomicU64,
    deletes: AtomicU64,
    deletes_by_query: AtomicU64,
    /// Optimistic-lock rejections
    conflicts: AtomicU64,
    /// Stale leader operations dropped (suppressed adds included)
    ignored: AtomicU64,
    soft_commits: AtomicU64,
    hard_commits: AtomicU64,
    commit_failures: AtomicU64,
    /// Commits whose fold finished after a newer generation was installed
    superseded_commits: AtomicU64,
    log_records: AtomicU64,
    log_bytes: AtomicU64,
    log_compactions: AtomicU64,
    /// Real-time gets answered from the update log buffer
    rtg_buffer_hits: AtomicU64,
    /// Real-time gets answered from the committed snapshot
    rtg_snapshot_hits: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_adds(&self) {
        self.adds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_deletes(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_deletes_by_query(&self) {
        self.deletes_by_query.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_conflicts(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_commits(&self, durable: bool) {
        if durable {
            self.hard_commits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.soft_commits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn increment_commit_failures(&self) {
        self.commit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_superseded_commits(&self) {
        self.superseded_commits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one appended log record of `bytes` framed bytes.
    pub fn record_log_append(&self, bytes: u64) {
        self.log_records.fetch_add(1, Ordering::Relaxed);
        self.log_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn increment_log_compactions(&self) {
        self.log_compactions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rtg_buffer_hits(&self) {
        self.rtg_buffer_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rtg_snapshot_hits(&self) {
        self.rtg_snapshot_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            adds: self.adds.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            deletes_by_query: self.deletes_by_query.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            soft_commits: self.soft_commits.load(Ordering::Relaxed),
            hard_commits: self.hard_commits.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
            superseded_commits: self.superseded_commits.load(Ordering::Relaxed),
            log_records: self.log_records.load(Ordering::Relaxed),
            log_bytes: self.log_bytes.load(Ordering::Relaxed),
            log_compactions: self.log_compactions.load(Ordering::Relaxed),
            rtg_buffer_hits: self.rtg_buffer_hits.load(Ordering::Relaxed),
            rtg_snapshot_hits: self.rtg_snapshot_hits.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub adds: u64,
    pub deletes: u64,
    pub deletes_by_query: u64,
    pub conflicts: u64,
    pub ignored: u64,
    pub soft_commits: u64,
    pub hard_commits: u64,
    pub commit_failures: u64,
    pub superseded_commits: u64,
    pub log_records: u64,
    pub log_bytes: u64,
    pub log_compactions: u64,
    pub rtg_buffer_hits: u64,
    pub rtg_snapshot_hits: u64,
}
