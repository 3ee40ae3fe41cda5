//! Update log subsystem
//!
//! Append-only record of every accepted operation, in apply order, plus the
//! commit markers written when a commit installs its snapshot. It is the
//! source for crash recovery and replica catch-up, and it owns the
//! in-memory buffer of records not yet folded into the committed index.
//!
//! # Invariants
//!
//! - An operation is acknowledged only after its record is appended (and
//!   fsynced when `sync_on_append` is set)
//! - Checksums on every record; corruption halts reads
//! - Sequence numbers strictly increase and are never reused
//! - A record enters the buffer before `last_sequence` covers it, so any
//!   sequence at or below `last_sequence` is either buffered or folded

mod checksum;
mod errors;
mod reader;
mod record;
mod writer;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::model::{Operation, Version};

pub use checksum::{compute_checksum, verify_checksum};
pub use errors::{LogError, LogErrorCode, LogResult, Severity};
pub use reader::LogReader;
pub use record::{
    CommitMarker, CompactionRecord, LogEntry, RecordKind, UpdateRecord, FRAME_OVERHEAD,
};
pub use writer::{log_path, LogWriter};

/// Outcome of a log compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompactionStats {
    pub kept: usize,
    pub dropped: usize,
    pub bytes: u64,
    /// Highest delete-by-query version the compacted log no longer holds
    pub dbq_evicted_through: u64,
}

pub struct UpdateLog {
    data_dir: PathBuf,
    writer: Mutex<LogWriter>,
    buffer: RwLock<BTreeMap<u64, Arc<UpdateRecord>>>,
    last_sequence: AtomicU64,
}

impl UpdateLog {
    /// Opens the log under `data_dir` and returns every entry already in it.
    ///
    /// The buffer starts empty; recovery decides which records are still
    /// unfolded and hands them back through [`UpdateLog::restore`].
    pub fn open(data_dir: &Path, sync_on_append: bool) -> LogResult<(Self, Vec<LogEntry>)> {
        let path = log_path(data_dir);
        let entries = if path.exists() {
            LogReader::open(&path)?.read_all()?
        } else {
            Vec::new()
        };
        let next_sequence = entries.last().map(|e| e.sequence() + 1).unwrap_or(1);
        let writer = LogWriter::resume(data_dir, next_sequence, sync_on_append)?;
        let last_sequence = writer.last_sequence_number();

        let log = Self {
            data_dir: data_dir.to_path_buf(),
            writer: Mutex::new(writer),
            buffer: RwLock::new(BTreeMap::new()),
            last_sequence: AtomicU64::new(last_sequence),
        };
        Ok((log, entries))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path(&self) -> PathBuf {
        log_path(&self.data_dir)
    }

    /// Appends an accepted operation and buffers it.
    ///
    /// Returns the buffered record and the number of bytes written.
    pub fn append(
        &self,
        version: Version,
        operation: Operation,
    ) -> LogResult<(Arc<UpdateRecord>, usize)> {
        let mut writer = self.writer.lock();
        let (record, bytes) = writer.append_update(version, operation)?;
        let record = Arc::new(record);
        self.buffer.write().insert(record.sequence, Arc::clone(&record));
        self.last_sequence.store(record.sequence, Ordering::Release);
        Ok((record, bytes))
    }

    /// Puts records recovered from disk back into the buffer.
    pub fn restore<I>(&self, records: I)
    where
        I: IntoIterator<Item = UpdateRecord>,
    {
        let mut buffer = self.buffer.write();
        for record in records {
            buffer.insert(record.sequence, Arc::new(record));
        }
    }

    /// Highest sequence number whose record is buffered or folded.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::Acquire)
    }

    pub fn buffered(&self, sequence: u64) -> Option<Arc<UpdateRecord>> {
        self.buffer.read().get(&sequence).cloned()
    }

    /// Copy of every buffered record at or below `through`, in sequence order.
    pub fn buffered_through(&self, through: u64) -> Vec<Arc<UpdateRecord>> {
        self.buffer
            .read()
            .range(..=through)
            .map(|(_, record)| Arc::clone(record))
            .collect()
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.read().len()
    }

    /// Drops buffered records folded by an installed commit.
    pub fn release_through(&self, through: u64) {
        let mut buffer = self.buffer.write();
        let rest = buffer.split_off(&through.saturating_add(1));
        *buffer = rest;
    }

    pub fn append_commit_marker(
        &self,
        generation: u64,
        through_sequence: u64,
        durable: bool,
    ) -> LogResult<CommitMarker> {
        let mut writer = self.writer.lock();
        let (marker, _) = writer.append_commit(generation, through_sequence, durable)?;
        if durable {
            writer.fsync()?;
        }
        Ok(marker)
    }

    /// Rewrites the log without the records folded through `through`.
    ///
    /// Delete-by-query records with the `dbq_keep` highest versions are kept
    /// regardless, matching what the watermark retains, so a restart can
    /// rebuild it. The highest version dropped goes into the trailing
    /// compaction record, carried forward from any earlier one.
    pub fn compact_through(&self, through: u64, dbq_keep: usize) -> LogResult<CompactionStats> {
        let mut writer = self.writer.lock();
        let entries = LogReader::open(writer.path())?.read_all()?;
        let total = entries.len();

        let mut dbq_versions: BTreeSet<u64> = BTreeSet::new();
        for entry in &entries {
            dbq_versions.extend(dbq_magnitude(entry));
        }
        let retained: BTreeSet<u64> = dbq_versions.into_iter().rev().take(dbq_keep.max(1)).collect();

        let mut evicted_through = 0;
        let mut kept = Vec::with_capacity(total);
        for entry in entries {
            if let LogEntry::Compaction(previous) = &entry {
                evicted_through = evicted_through.max(previous.dbq_evicted_through);
                continue;
            }
            if entry.sequence() > through {
                kept.push(entry);
                continue;
            }
            if let Some(magnitude) = dbq_magnitude(&entry) {
                if retained.contains(&magnitude) {
                    kept.push(entry);
                } else {
                    evicted_through = evicted_through.max(magnitude);
                }
            }
        }

        let kept_len = kept.len();
        let (_, bytes) = writer.rewrite_compacted(kept, through, evicted_through)?;
        Ok(CompactionStats {
            kept: kept_len,
            dropped: total - kept_len,
            bytes,
            dbq_evicted_through: evicted_through,
        })
    }

    /// Every update record applied after the commit of `generation`.
    ///
    /// Generation 0 replays the whole log. Reads are lazy and see the log as
    /// of this call.
    pub fn replay_from(&self, generation: u64) -> LogResult<LogReplay> {
        let (marker_scan, records) = {
            let writer = self.writer.lock();
            (LogReader::open(writer.path())?, LogReader::open(writer.path())?)
        };

        let through = if generation == 0 {
            0
        } else {
            let mut oldest = None;
            let mut found = None;
            for entry in marker_scan {
                if let LogEntry::Commit(marker) = entry? {
                    oldest = Some(oldest.map_or(marker.generation, |g: u64| g.min(marker.generation)));
                    if marker.generation == generation {
                        found = Some(marker.through_sequence);
                        break;
                    }
                }
            }
            found.ok_or_else(|| LogError::generation_unavailable(generation, oldest))?
        };

        Ok(LogReplay {
            reader: records,
            through,
        })
    }
}

fn dbq_magnitude(entry: &LogEntry) -> Option<u64> {
    match entry {
        LogEntry::Update(record) if record.kind() == RecordKind::DeleteByQuery => {
            Some(record.version.magnitude())
        }
        _ => None,
    }
}

/// Lazy iterator over the update records of a replay.
#[derive(Debug)]
pub struct LogReplay {
    reader: LogReader,
    through: u64,
}

impl LogReplay {
    /// Records at or below this sequence are skipped.
    pub fn through_sequence(&self) -> u64 {
        self.through
    }
}

impl Iterator for LogReplay {
    type Item = LogResult<UpdateRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.reader.next()? {
                Ok(LogEntry::Update(record)) if record.sequence > self.through => {
                    return Some(Ok(record))
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
