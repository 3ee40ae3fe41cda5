//! Update log writer
//!
//! - Append-only single file at `<data_dir>/log/update.log`
//! - With `sync_on_append`, every append is followed by fsync before the
//!   caller may acknowledge the operation
//! - Sequence numbers start at 1 and are never reused, compaction included
//! - Compaction rewrites the file through a temp file + rename + dir fsync,
//!   ending it with a compaction record at a fresh sequence number

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::errors::{LogError, LogResult};
use super::reader::LogReader;
use super::record::{CommitMarker, CompactionRecord, LogEntry, UpdateRecord};
use crate::model::{Operation, Version};

const LOG_DIR: &str = "log";
const LOG_FILE: &str = "update.log";

/// Location of the update log under a data directory.
pub fn log_path(data_dir: &Path) -> PathBuf {
    data_dir.join(LOG_DIR).join(LOG_FILE)
}

pub struct LogWriter {
    log_path: PathBuf,
    file: File,
    /// Next sequence number to assign (starts at 1, never reused)
    next_sequence: u64,
    sync_on_append: bool,
}

impl LogWriter {
    /// Opens or creates the log under `data_dir`, scanning it to find the
    /// next sequence number.
    pub fn open(data_dir: &Path, sync_on_append: bool) -> LogResult<Self> {
        let path = log_path(data_dir);
        let next_sequence = Self::determine_next_sequence(&path)?;
        Self::resume(data_dir, next_sequence, sync_on_append)
    }

    /// Opens the log for append when the caller already scanned it.
    pub fn resume(data_dir: &Path, next_sequence: u64, sync_on_append: bool) -> LogResult<Self> {
        let log_dir = data_dir.join(LOG_DIR);
        let log_path = log_dir.join(LOG_FILE);

        if !log_dir.exists() {
            fs::create_dir_all(&log_dir).map_err(|e| {
                LogError::append_failed(
                    format!("Failed to create log directory: {}", log_dir.display()),
                    e,
                )
            })?;
        }

        let file = open_for_append(&log_path)?;

        Ok(Self {
            log_path,
            file,
            next_sequence: next_sequence.max(1),
            sync_on_append,
        })
    }

    fn determine_next_sequence(log_path: &Path) -> LogResult<u64> {
        let metadata = match fs::metadata(log_path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(1),
            Err(e) => return Err(LogError::append_failed("Failed to read log metadata", e)),
        };

        if metadata.len() == 0 {
            return Ok(1);
        }

        let mut reader = LogReader::open(log_path)?;
        while reader.read_next()?.is_some() {}
        Ok(reader.last_sequence_number() + 1)
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    pub fn next_sequence_number(&self) -> u64 {
        self.next_sequence
    }

    /// Last assigned sequence number, or 0 if nothing was ever written.
    pub fn last_sequence_number(&self) -> u64 {
        self.next_sequence.saturating_sub(1)
    }

    /// Appends an accepted operation. Returns the record and its framed size.
    pub fn append_update(
        &mut self,
        version: Version,
        operation: Operation,
    ) -> LogResult<(UpdateRecord, usize)> {
        let record = UpdateRecord {
            sequence: self.next_sequence,
            version,
            operation,
        };
        let written = self.write_framed(record.sequence, record.serialize())?;
        Ok((record, written))
    }

    /// Appends a commit marker.
    pub fn append_commit(
        &mut self,
        generation: u64,
        through_sequence: u64,
        durable: bool,
    ) -> LogResult<(CommitMarker, usize)> {
        let marker = CommitMarker {
            sequence: self.next_sequence,
            generation,
            through_sequence,
            durable,
        };
        let written = self.write_framed(marker.sequence, marker.serialize())?;
        Ok((marker, written))
    }

    fn write_framed(&mut self, sequence: u64, framed: io::Result<Vec<u8>>) -> LogResult<usize> {
        let serialized = framed.map_err(|e| {
            LogError::append_failed(
                format!("Failed to encode log record at sequence {}", sequence),
                e,
            )
        })?;

        self.file.write_all(&serialized).map_err(|e| {
            LogError::append_failed(
                format!("Failed to write log record at sequence {}", sequence),
                e,
            )
        })?;

        if self.sync_on_append {
            self.file.sync_all().map_err(|e| {
                LogError::fsync_failed(
                    format!("fsync failed after log append at sequence {}", sequence),
                    e,
                )
            })?;
        }

        // Only advance after the record is on disk
        self.next_sequence += 1;
        Ok(serialized.len())
    }

    pub fn fsync(&self) -> LogResult<()> {
        self.file
            .sync_all()
            .map_err(|e| LogError::fsync_failed("Explicit log fsync failed", e))
    }

    /// Replaces the log contents with `entries` followed by a compaction
    /// record, atomically. Returns the record and the new file size.
    pub fn rewrite_compacted(
        &mut self,
        mut entries: Vec<LogEntry>,
        through_sequence: u64,
        dbq_evicted_through: u64,
    ) -> LogResult<(CompactionRecord, u64)> {
        let record = CompactionRecord {
            sequence: self.next_sequence,
            through_sequence,
            dbq_evicted_through,
        };
        entries.push(LogEntry::Compaction(record));
        let bytes = self.rewrite(&entries)?;
        self.next_sequence += 1;
        Ok((record, bytes))
    }

    /// Replaces the log contents with `entries`, atomically.
    ///
    /// Sequence numbering continues where it was; the kept entries retain
    /// their original sequence numbers. On failure the old file is intact.
    pub fn rewrite(&mut self, entries: &[LogEntry]) -> LogResult<u64> {
        let log_dir = self
            .log_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let temp_path = log_dir.join(format!("{}.tmp", LOG_FILE));

        let mut temp = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| {
                LogError::append_failed(
                    format!("Failed to create compacted log: {}", temp_path.display()),
                    e,
                )
            })?;

        let mut bytes = 0u64;
        for entry in entries {
            let serialized = entry.serialize().map_err(|e| {
                LogError::append_failed("Failed to encode log record during compaction", e)
            })?;
            temp.write_all(&serialized).map_err(|e| {
                LogError::append_failed("Failed to write compacted log", e)
            })?;
            bytes += serialized.len() as u64;
        }

        temp.sync_all().map_err(|e| {
            LogError::fsync_failed(
                format!("Failed to fsync compacted log: {}", temp_path.display()),
                e,
            )
        })?;
        drop(temp);

        fs::rename(&temp_path, &self.log_path).map_err(|e| {
            LogError::append_failed(
                format!("Failed to install compacted log: {}", self.log_path.display()),
                e,
            )
        })?;

        let dir_handle = OpenOptions::new().read(true).open(&log_dir).map_err(|e| {
            LogError::append_failed(
                format!("Failed to open log directory for fsync: {}", log_dir.display()),
                e,
            )
        })?;
        dir_handle.sync_all().map_err(|e| {
            LogError::fsync_failed(
                format!("Failed to fsync log directory: {}", log_dir.display()),
                e,
            )
        })?;

        self.file = open_for_append(&self.log_path)?;
        Ok(bytes)
    }
}

fn open_for_append(log_path: &Path) -> LogResult<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| {
            LogError::append_failed(
                format!("Failed to open log file: {}", log_path.display()),
                e,
            )
        })
}
