//! DocumentStore - the outward face of the core
//!
//! Wires the update log, version map, delete-by-query tracker, committed
//! index and commit coordinator together, and runs recovery on open.
//!
//! ```ignore
//! use rtstore::{DocumentStore, Mode, Operation, StoreConfig};
//!
//! let store = DocumentStore::open_default(StoreConfig::new("/var/lib/rtstore"))?;
//! let outcome = store.apply(Operation::add("1", fields), Mode::Optimistic(Version::MUST_NOT_EXIST))?;
//! assert!(store.get_by_id(&"1".into())?.is_some());
//! store.commit(true)?;
//! ```

mod errors;
mod recovery;

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::commit::{
    CommitCoordinator, CommitOutcome, CommitResult, CommittedSnapshot, SnapshotCell,
};
use crate::concurrency::{ApplyError, ApplyResult, ConcurrencyController};
use crate::config::StoreConfig;
use crate::index::{CommittedIndex, IndexResult, MemoryIndex};
use crate::model::{
    ApplyOutcome, Document, DocumentId, FieldMatcher, Mode, Operation, PredicateEvaluator,
};
use crate::observability::{Event, MetricsRegistry, MetricsSnapshot};
use crate::rtg::RealTimeGetResolver;
use crate::update_log::{LogReplay, LogResult, UpdateLog};
use crate::versioning::{VersionClock, VersionEntry, VersionMap};

pub use errors::{StoreError, StoreResult};
pub use recovery::RecoveryReport;

pub struct DocumentStore {
    config: StoreConfig,
    version_map: Arc<VersionMap>,
    log: Arc<UpdateLog>,
    snapshots: Arc<SnapshotCell>,
    resolver: Arc<RealTimeGetResolver>,
    controller: ConcurrencyController,
    coordinator: CommitCoordinator,
    metrics: Arc<MetricsRegistry>,
    recovery: RecoveryReport,
    halted: AtomicBool,
}

impl DocumentStore {
    /// Opens the store over `index`, recovering whatever the update log
    /// holds beyond what the index has folded.
    pub fn open(
        config: StoreConfig,
        index: Arc<dyn CommittedIndex>,
        evaluator: Arc<dyn PredicateEvaluator>,
    ) -> StoreResult<Self> {
        config.validate()?;
        tracing::info!(
            event = %Event::OpenStart,
            data_dir = %config.data_dir.display(),
            "opening store"
        );

        fs::create_dir_all(&config.data_dir).map_err(|source| StoreError::Io {
            path: config.data_dir.clone(),
            source,
        })?;

        let recovered = index.recovered();
        let snapshots = Arc::new(SnapshotCell::new(CommittedSnapshot::new(
            recovered.generation,
            recovered.through_sequence,
            Arc::clone(&index),
        )));

        let (log, entries) =
            UpdateLog::open(&config.data_dir, config.sync_on_append).map_err(|e| {
                tracing::error!(event = %Event::LogCorruption, error = %e, "update log unreadable");
                e
            })?;
        let log = Arc::new(log);

        let version_map = Arc::new(VersionMap::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let resolver = Arc::new(RealTimeGetResolver::new(
            Arc::clone(&version_map),
            Arc::clone(&log),
            Arc::clone(&snapshots),
            Arc::clone(&metrics),
        ));
        let controller = ConcurrencyController::new(
            Arc::clone(&version_map),
            VersionClock::new(),
            evaluator,
            config.dbq_retention,
            Arc::clone(&log),
            Arc::clone(&resolver),
            Arc::clone(&snapshots),
            Arc::clone(&metrics),
        );

        let report = recovery::recover(&controller, &version_map, &log, recovered, entries)?;

        let coordinator = CommitCoordinator::new(
            index,
            Arc::clone(&log),
            Arc::clone(&snapshots),
            Arc::clone(&metrics),
            config.max_concurrent_commits,
            config.dbq_retention,
            report.next_generation,
        );

        tracing::info!(
            event = %Event::OpenComplete,
            generation = snapshots.generation(),
            buffered = log.buffered_len(),
            last_sequence = report.last_sequence,
            "store open"
        );

        Ok(Self {
            config,
            version_map,
            log,
            snapshots,
            resolver,
            controller,
            coordinator,
            metrics,
            recovery: report,
            halted: AtomicBool::new(false),
        })
    }

    /// Opens the store over a checkpointed [`MemoryIndex`] in the data
    /// directory, with [`FieldMatcher`] evaluating predicates.
    pub fn open_default(config: StoreConfig) -> StoreResult<Self> {
        let index = Arc::new(MemoryIndex::open(&config.data_dir)?);
        Self::open(config, index, Arc::new(FieldMatcher))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Applies one operation under `mode`.
    ///
    /// A fatal error (invariant breach, failed fsync, corrupt index) halts
    /// the store: every later call fails with [`ApplyError::Halted`].
    pub fn apply(&self, operation: Operation, mode: Mode) -> ApplyResult<ApplyOutcome> {
        if self.halted.load(Ordering::Acquire) {
            return Err(ApplyError::Halted);
        }
        self.controller.apply(operation, mode).map_err(|e| {
            if e.is_fatal() {
                self.halted.store(true, Ordering::Release);
                tracing::error!(event = %Event::InvariantViolation, error = %e, "store halted");
            }
            e
        })
    }

    /// Real-time get: the latest acknowledged state, committed or not.
    pub fn get_by_id(&self, id: &DocumentId) -> IndexResult<Option<Document>> {
        self.resolver.get(id)
    }

    /// Real-time get of several ids, in request order, skipping missing ones.
    pub fn get_many(&self, ids: &[DocumentId]) -> IndexResult<Vec<Document>> {
        self.resolver.get_many(ids)
    }

    /// Real-time get returning only the named fields; `"id"` is always
    /// available.
    pub fn get_projected<S: AsRef<str>>(
        &self,
        id: &DocumentId,
        fields: &[S],
    ) -> IndexResult<Option<Document>> {
        self.resolver.get_projected(id, fields)
    }

    /// The document as of the installed snapshot only.
    pub fn get_committed(&self, id: &DocumentId) -> IndexResult<Option<Document>> {
        self.snapshots.load().fetch(id)
    }

    /// Folds everything applied so far; `durable` also persists it.
    pub fn commit(&self, durable: bool) -> CommitResult<CommitOutcome> {
        self.coordinator.commit(durable)
    }

    /// Update records applied after the commit of `generation`.
    pub fn replay_from(&self, generation: u64) -> LogResult<LogReplay> {
        self.log.replay_from(generation)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn installed_generation(&self) -> u64 {
        self.snapshots.generation()
    }

    /// The installed snapshot. Holding it pins its generation's history.
    pub fn snapshot(&self) -> Arc<CommittedSnapshot> {
        self.snapshots.load()
    }

    /// The version map entry for `id`, if an operation touched it since the
    /// last restart.
    pub fn version_entry(&self, id: &DocumentId) -> Option<VersionEntry> {
        self.version_map.get(id)
    }

    /// Every version map entry. Intended for inspection and tests.
    pub fn version_entries(&self) -> Vec<(DocumentId, VersionEntry)> {
        self.version_map.snapshot()
    }

    pub fn last_sequence(&self) -> u64 {
        self.log.last_sequence()
    }

    /// Records applied but not yet folded by an installed commit.
    pub fn buffered_len(&self) -> usize {
        self.log.buffered_len()
    }

    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Fields, Version};
    use serde_json::json;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> DocumentStore {
        DocumentStore::open_default(StoreConfig::new(dir.path()).with_sync_on_append(false))
            .unwrap()
    }

    fn fields(value: serde_json::Value) -> Fields {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_get_many_preserves_request_order() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        for id in ["a", "b", "c"] {
            store
                .apply(Operation::add(id, fields(json!({ "id": id }))), Mode::Local)
                .unwrap();
        }

        let ids: Vec<DocumentId> = ["c", "missing", "a"].into_iter().map(DocumentId::from).collect();
        let found: Vec<String> = store
            .get_many(&ids)
            .unwrap()
            .into_iter()
            .map(|d| d.id.to_string())
            .collect();
        assert_eq!(found, vec!["c", "a"]);
    }

    #[test]
    fn test_committed_read_lags_real_time_read() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let id = DocumentId::from("a");
        store
            .apply(Operation::add("a", fields(json!({ "n": 1 }))), Mode::Local)
            .unwrap();

        assert!(store.get_by_id(&id).unwrap().is_some());
        assert!(store.get_committed(&id).unwrap().is_none());

        store.commit(false).unwrap();
        assert!(store.get_committed(&id).unwrap().is_some());
    }

    #[test]
    fn test_optimistic_delete_by_query_is_invalid() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let err = store
            .apply(
                Operation::delete_by_query(crate::model::Query::All),
                Mode::Optimistic(Version::new(3)),
            )
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(!store.is_halted());
    }

    /// The delete-by-query record reaches the log while a writer still
    /// holds the gate; only registering the predicate waits for it.
    #[test]
    fn test_delete_by_query_logs_without_waiting_for_writers() {
        use std::thread;
        use std::time::{Duration, Instant};

        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let in_flight = store.controller.tracker().gate();

        thread::scope(|s| {
            let dbq = s.spawn(|| {
                store.apply(Operation::delete_by_query(crate::model::Query::All), Mode::Local)
            });

            let deadline = Instant::now() + Duration::from_secs(10);
            while store.last_sequence() == 0 {
                assert!(Instant::now() < deadline, "delete-by-query never reached the log");
                thread::yield_now();
            }
            assert_eq!(in_flight.retained_len(), 0);

            drop(in_flight);
            assert!(dbq.join().unwrap().is_ok());
        });
        assert!(store.controller.tracker().max_version() > 0);
    }

    #[test]
    fn test_fresh_store_reports_empty_recovery() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let report = store.recovery_report();
        assert_eq!(report.replayed, 0);
        assert_eq!(report.next_generation, 1);
        assert_eq!(store.installed_generation(), 0);
    }
}
