//! ConcurrencyController - the single entry point for mutations
//!
//! Per operation on one document:
//! 1. Hold the delete-by-query gate shared, then the id's lock
//! 2. Read the current version (VersionMap, else the committed snapshot)
//! 3. Decide under the operation's mode: assign, check or compare a version
//! 4. Append to the update log (durable before anything becomes visible)
//! 5. Publish the new version in the VersionMap
//!
//! Delete-by-query is logged first, then registers its predicate under the
//! exclusive gate, then sweeps existing documents one id lock at a time.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::commit::SnapshotCell;
use crate::dbq::{Admission, DeleteByQueryTracker};
use crate::model::{
    ApplyOutcome, Document, DocumentId, Fields, Mode, Operation, PredicateEvaluator, Query,
    Version,
};
use crate::observability::{Event, MetricsRegistry};
use crate::rtg::RealTimeGetResolver;
use crate::update_log::UpdateLog;
use crate::versioning::{VersionClock, VersionMap};

use super::errors::{ApplyError, ApplyResult};
use super::locks::IdLocks;

pub struct ConcurrencyController {
    version_map: Arc<VersionMap>,
    clock: VersionClock,
    locks: IdLocks,
    dbq: DeleteByQueryTracker,
    log: Arc<UpdateLog>,
    resolver: Arc<RealTimeGetResolver>,
    snapshots: Arc<SnapshotCell>,
    metrics: Arc<MetricsRegistry>,
}

impl ConcurrencyController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        version_map: Arc<VersionMap>,
        clock: VersionClock,
        evaluator: Arc<dyn PredicateEvaluator>,
        dbq_retention: usize,
        log: Arc<UpdateLog>,
        resolver: Arc<RealTimeGetResolver>,
        snapshots: Arc<SnapshotCell>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            version_map,
            clock,
            locks: IdLocks::new(),
            dbq: DeleteByQueryTracker::new(evaluator, dbq_retention),
            log,
            resolver,
            snapshots,
            metrics,
        }
    }

    pub fn clock(&self) -> &VersionClock {
        &self.clock
    }

    pub fn tracker(&self) -> &DeleteByQueryTracker {
        &self.dbq
    }

    pub fn apply(&self, operation: Operation, mode: Mode) -> ApplyResult<ApplyOutcome> {
        match operation {
            Operation::Add { id, fields } => self.apply_add(id, fields, mode),
            Operation::DeleteById { id } => self.apply_delete(id, mode),
            Operation::DeleteByQuery { query } => self.apply_delete_by_query(query, mode),
        }
    }

    fn apply_add(&self, id: DocumentId, fields: Fields, mode: Mode) -> ApplyResult<ApplyOutcome> {
        let gate = self.dbq.gate();
        let lock = self.locks.get(&id);
        let _held = lock.lock();

        let current = self.current_version(&id)?;
        let Some(magnitude) = self.decide(&id, mode, current)? else {
            return Ok(self.ignored(&id, "add", current));
        };

        let candidate = Document::new(id, Version::live(magnitude), fields);
        match self.dbq.admit(&gate, &candidate) {
            Admission::Admit => {}
            Admission::Suppressed(dbq_version) => {
                let tombstone = Version::tombstone(dbq_version);
                let id = candidate.id;
                self.write(id.clone(), tombstone, Operation::delete(id.clone()))?;
                self.metrics.increment_ignored();
                tracing::debug!(
                    event = %Event::AddSuppressed,
                    id = %id,
                    version = %candidate.version,
                    dbq_version = dbq_version,
                    "add suppressed by newer delete-by-query"
                );
                return Ok(ApplyOutcome::Ignored {
                    current: Some(tombstone),
                });
            }
            Admission::BeyondRetention { evicted_through } => {
                tracing::warn!(
                    event = %Event::RetentionExceeded,
                    id = %candidate.id,
                    version = %candidate.version,
                    evicted_through = evicted_through,
                    "add older than retained delete-by-query history"
                );
                return Err(ApplyError::BeyondRetention {
                    id: candidate.id,
                    version: candidate.version,
                    evicted_through,
                });
            }
        }

        let Document { id, version, fields } = candidate;
        self.write(id.clone(), version, Operation::Add { id: id.clone(), fields })?;
        self.metrics.increment_adds();
        tracing::debug!(event = %Event::OperationApplied, op = "add", id = %id, version = %version);
        Ok(ApplyOutcome::Accepted(version))
    }

    fn apply_delete(&self, id: DocumentId, mode: Mode) -> ApplyResult<ApplyOutcome> {
        let _gate = self.dbq.gate();
        let lock = self.locks.get(&id);
        let _held = lock.lock();

        let current = self.current_version(&id)?;
        let Some(magnitude) = self.decide(&id, mode, current)? else {
            return Ok(self.ignored(&id, "delete_by_id", current));
        };

        let version = Version::tombstone(magnitude);
        self.write(id.clone(), version, Operation::delete(id.clone()))?;
        self.metrics.increment_deletes();
        tracing::debug!(event = %Event::OperationApplied, op = "delete_by_id", id = %id, version = %version);
        Ok(ApplyOutcome::Accepted(version))
    }

    fn apply_delete_by_query(&self, query: Query, mode: Mode) -> ApplyResult<ApplyOutcome> {
        let magnitude = match mode {
            Mode::Local => self.issue_local()?,
            Mode::Leader(version) => {
                let magnitude = self.leader_magnitude(version)?;
                if self.dbq.gate().contains(magnitude) {
                    self.metrics.increment_ignored();
                    tracing::debug!(
                        event = %Event::OperationIgnored,
                        op = "delete_by_query",
                        version = %version,
                        "duplicate delete-by-query"
                    );
                    return Ok(ApplyOutcome::Ignored { current: None });
                }
                self.clock.observe(version);
                magnitude
            }
            Mode::Optimistic(_) => {
                return Err(ApplyError::InvalidRequest(
                    "optimistic locking is not supported for delete-by-query".into(),
                ))
            }
        };

        // Logged outside the gate so writers never wait on this fsync.
        // Adds that slip in before registration are caught by the sweep.
        let (_, bytes) = self.log.append(
            Version::tombstone(magnitude),
            Operation::delete_by_query(query.clone()),
        )?;
        self.metrics.record_log_append(bytes as u64);
        self.dbq.gate_exclusive().register(magnitude, query.clone());

        let removed = self.sweep(&query, magnitude)?;
        self.metrics.increment_deletes_by_query();
        tracing::info!(
            event = %Event::DeleteByQueryRegistered,
            version = magnitude,
            removed = removed,
            "delete-by-query applied"
        );
        Ok(ApplyOutcome::Accepted(Version::tombstone(magnitude)))
    }

    /// Tombstones every live document older than `magnitude` that matches
    /// `query`. Each deletion is logged like a delete-by-id.
    fn sweep(&self, query: &Query, magnitude: u64) -> ApplyResult<usize> {
        let mut candidates: BTreeSet<DocumentId> = self.version_map.ids().into_iter().collect();
        candidates.extend(self.snapshots.load().document_ids()?);

        let tombstone = Version::tombstone(magnitude);
        let mut removed = 0;
        for id in candidates {
            let _gate = self.dbq.gate();
            let lock = self.locks.get(&id);
            let _held = lock.lock();

            let Some(document) = self.resolver.get(&id)? else {
                continue;
            };
            if document.version.magnitude() >= magnitude || !self.dbq.matches(query, &document) {
                continue;
            }
            self.write(id.clone(), tombstone, Operation::delete(id))?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Re-registers a delete-by-query found in the log during recovery.
    pub fn restore_predicate(&self, magnitude: u64, query: Query) {
        self.dbq.gate_exclusive().register(magnitude, query);
    }

    /// Restores the eviction floor a log compaction recorded.
    pub fn restore_evicted_through(&self, magnitude: u64) {
        self.dbq.gate_exclusive().raise_evicted_through(magnitude);
    }

    /// Re-applies every retained predicate to the current documents.
    ///
    /// A crash between logging a delete-by-query and finishing its sweep
    /// leaves matching documents live; recovery calls this to finish the
    /// job. Documents already removed are skipped.
    pub fn resweep_retained(&self) -> ApplyResult<usize> {
        let mut removed = 0;
        for (magnitude, query) in self.dbq.retained() {
            removed += self.sweep(&query, magnitude)?;
        }
        Ok(removed)
    }

    fn current_version(&self, id: &DocumentId) -> ApplyResult<Option<Version>> {
        if let Some(entry) = self.version_map.get(id) {
            return Ok(Some(entry.version));
        }
        Ok(self.snapshots.load().version_of(id)?)
    }

    /// The magnitude to apply at, or `None` for a stale leader operation.
    fn decide(
        &self,
        id: &DocumentId,
        mode: Mode,
        current: Option<Version>,
    ) -> ApplyResult<Option<u64>> {
        let magnitude = match mode {
            Mode::Local => self.issue_local()?,
            Mode::Optimistic(expected) => {
                self.check_expected(id, expected, current)?;
                self.issue_local()?
            }
            Mode::Leader(version) => {
                let magnitude = self.leader_magnitude(version)?;
                if current.is_some_and(|current| !version.supersedes(current)) {
                    return Ok(None);
                }
                self.clock.observe(version);
                magnitude
            }
        };

        if let Some(current) = current {
            if magnitude <= current.magnitude() {
                tracing::error!(
                    event = %Event::InvariantViolation,
                    id = %id,
                    current = %current,
                    assigned = magnitude,
                    "assigned version does not supersede current version"
                );
                return Err(ApplyError::InvariantViolation(format!(
                    "version {} for {} does not supersede {}",
                    magnitude, id, current
                )));
            }
        }
        Ok(Some(magnitude))
    }

    /// A fresh local magnitude. Running out of versions is fatal.
    fn issue_local(&self) -> ApplyResult<u64> {
        match self.clock.next() {
            Some(version) => Ok(version.magnitude()),
            None => {
                tracing::error!(
                    event = %Event::InvariantViolation,
                    last = self.clock.last(),
                    "version clock exhausted"
                );
                Err(ApplyError::InvariantViolation(format!(
                    "no version left above {}",
                    self.clock.last()
                )))
            }
        }
    }

    fn leader_magnitude(&self, version: Version) -> ApplyResult<u64> {
        if !version.is_assignable() {
            return Err(ApplyError::InvalidRequest(format!(
                "leader version {} has no live and tombstone form",
                version
            )));
        }
        Ok(version.magnitude())
    }

    fn check_expected(
        &self,
        id: &DocumentId,
        expected: Version,
        current: Option<Version>,
    ) -> ApplyResult<()> {
        let satisfied = if expected == Version::MUST_NOT_EXIST {
            current.map_or(true, |v| v.is_tombstone())
        } else {
            // No other negative expectation names a valid state
            !expected.is_tombstone() && current == Some(expected)
        };
        if satisfied {
            return Ok(());
        }

        self.metrics.increment_conflicts();
        tracing::debug!(
            event = %Event::VersionConflict,
            id = %id,
            expected = %expected,
            current = ?current.map(|v| v.value()),
            "optimistic version check failed"
        );
        Err(ApplyError::Conflict {
            id: id.clone(),
            expected,
            actual: current,
        })
    }

    /// Logs then publishes one per-id mutation. Caller holds the id lock.
    fn write(&self, id: DocumentId, version: Version, operation: Operation) -> ApplyResult<()> {
        let (record, bytes) = self.log.append(version, operation).map_err(|e| {
            tracing::error!(event = %Event::LogAppendFailed, id = %id, error = %e, "log append failed");
            e
        })?;
        self.metrics.record_log_append(bytes as u64);
        self.version_map.upsert(id, version, record.sequence);
        Ok(())
    }

    fn ignored(&self, id: &DocumentId, op: &'static str, current: Option<Version>) -> ApplyOutcome {
        self.metrics.increment_ignored();
        tracing::debug!(
            event = %Event::OperationIgnored,
            op = op,
            id = %id,
            current = ?current.map(|v| v.value()),
            "stale leader operation ignored"
        );
        ApplyOutcome::Ignored { current }
    }
}
