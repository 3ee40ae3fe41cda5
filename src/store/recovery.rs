//! Startup recovery
//!
//! # Sequence (strict order)
//!
//! 1. The index reports what it durably holds: generation G, folded through T
//! 2. The update log is read in full; corruption is fatal
//! 3. Every update record raises the version clock
//! 4. Delete-by-query records re-register their predicates, and the newest
//!    compaction record restores the eviction floor
//! 5. Records above T go back into the VersionMap and the log buffer
//! 6. The generation counter resumes above G and every commit marker
//! 7. Retained predicates sweep once more, finishing any interrupted sweep

use std::sync::Arc;

use serde::Serialize;

use crate::concurrency::ConcurrencyController;
use crate::index::RecoveredState;
use crate::model::{Operation, Version};
use crate::observability::Event;
use crate::update_log::{LogEntry, UpdateLog};
use crate::versioning::VersionMap;

use super::errors::StoreResult;

/// What recovery found and rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RecoveryReport {
    /// Generation restored from the committed index
    pub index_generation: u64,
    /// Log sequence the committed index already covers
    pub index_through_sequence: u64,
    /// Records replayed into the buffer
    pub replayed: usize,
    /// Records already folded into the index
    pub skipped: usize,
    pub commit_markers: usize,
    pub delete_by_queries: usize,
    /// Delete-by-query versions at or below this were compacted away
    pub dbq_evicted_through: u64,
    /// Documents tombstoned by the final sweep
    pub swept: usize,
    pub last_sequence: u64,
    pub next_generation: u64,
}

pub(crate) fn recover(
    controller: &ConcurrencyController,
    version_map: &Arc<VersionMap>,
    log: &Arc<UpdateLog>,
    recovered: RecoveredState,
    entries: Vec<LogEntry>,
) -> StoreResult<RecoveryReport> {
    tracing::info!(
        event = %Event::RecoveryStart,
        index_generation = recovered.generation,
        index_through_sequence = recovered.through_sequence,
        log_entries = entries.len(),
        "recovery started"
    );

    let mut report = RecoveryReport {
        index_generation: recovered.generation,
        index_through_sequence: recovered.through_sequence,
        ..RecoveryReport::default()
    };
    let mut newest_marker = 0;
    let mut unfolded = Vec::new();

    for entry in entries {
        let record = match entry {
            LogEntry::Commit(marker) => {
                report.commit_markers += 1;
                newest_marker = newest_marker.max(marker.generation);
                continue;
            }
            LogEntry::Compaction(compaction) => {
                report.dbq_evicted_through =
                    report.dbq_evicted_through.max(compaction.dbq_evicted_through);
                continue;
            }
            LogEntry::Update(record) => record,
        };

        controller.clock().observe(record.version);
        if let Operation::DeleteByQuery { query } = &record.operation {
            controller.restore_predicate(record.version.magnitude(), query.clone());
            report.delete_by_queries += 1;
        }

        if record.sequence <= recovered.through_sequence {
            report.skipped += 1;
            continue;
        }
        if let Some(id) = record.operation.document_id() {
            version_map.upsert_if_newer(id.clone(), record.version, record.sequence);
        }
        unfolded.push(record);
    }

    controller.restore_evicted_through(report.dbq_evicted_through);
    controller.clock().observe(Version::live(report.dbq_evicted_through));
    controller.clock().observe(Version::live(recovered.max_version));
    report.replayed = unfolded.len();
    log.restore(unfolded);

    report.last_sequence = log.last_sequence();
    report.next_generation = recovered.generation.max(newest_marker) + 1;
    report.swept = controller.resweep_retained().map_err(|e| {
        tracing::error!(event = %Event::RecoveryFailed, error = %e, "delete-by-query sweep failed");
        e
    })?;

    tracing::info!(
        event = %Event::RecoveryComplete,
        replayed = report.replayed,
        skipped = report.skipped,
        delete_by_queries = report.delete_by_queries,
        dbq_evicted_through = report.dbq_evicted_through,
        swept = report.swept,
        next_generation = report.next_generation,
        "recovery complete"
    );
    Ok(report)
}
