//! Update log reader with strict corruption detection
//!
//! - Any checksum or framing failure halts the read; nothing is skipped
//! - Sequence numbers must strictly increase (compaction leaves gaps, so
//!   contiguity is not required)
//! - Reads are sequential from the start of the file

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use super::errors::{LogError, LogResult};
use super::record::{LogEntry, FRAME_OVERHEAD};

#[derive(Debug)]
pub struct LogReader {
    log_path: PathBuf,
    reader: BufReader<File>,
    current_offset: u64,
    file_size: u64,
    last_sequence: u64,
}

impl LogReader {
    pub fn open(log_path: &Path) -> LogResult<Self> {
        let file = File::open(log_path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                LogError::corruption(format!("Update log not found: {}", log_path.display()))
            } else {
                LogError::corruption(format!(
                    "Failed to open update log: {}: {}",
                    log_path.display(),
                    e
                ))
            }
        })?;

        let file_size = file
            .metadata()
            .map_err(|e| LogError::corruption(format!("Failed to read log metadata: {}", e)))?
            .len();

        Ok(Self {
            log_path: log_path.to_path_buf(),
            reader: BufReader::new(file),
            current_offset: 0,
            file_size,
            last_sequence: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence
    }

    /// Reads the next entry.
    ///
    /// - `Ok(Some(entry))` on success
    /// - `Ok(None)` at a clean end of file
    /// - `Err` on any corruption, including a torn trailing record
    pub fn read_next(&mut self) -> LogResult<Option<LogEntry>> {
        if self.current_offset >= self.file_size {
            return Ok(None);
        }

        let remaining = self.file_size - self.current_offset;
        if remaining < FRAME_OVERHEAD as u64 {
            return Err(LogError::corruption_at_offset(
                self.current_offset,
                format!(
                    "Truncated log: {} bytes remaining, minimum record size is {}",
                    remaining, FRAME_OVERHEAD
                ),
            ));
        }

        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).map_err(|e| {
            LogError::corruption_at_offset(
                self.current_offset,
                format!("Failed to read record length: {}", e),
            )
        })?;
        let record_length = u32::from_le_bytes(len_buf) as u64;

        if record_length < FRAME_OVERHEAD as u64 {
            return Err(LogError::corruption_at_offset(
                self.current_offset,
                format!("Invalid record length: {}", record_length),
            ));
        }
        if record_length > remaining {
            return Err(LogError::corruption_at_offset(
                self.current_offset,
                format!(
                    "Record length {} exceeds remaining file size {}",
                    record_length, remaining
                ),
            ));
        }

        let mut record_buf = vec![0u8; record_length as usize];
        record_buf[0..4].copy_from_slice(&len_buf);
        self.reader.read_exact(&mut record_buf[4..]).map_err(|e| {
            LogError::corruption_at_offset(
                self.current_offset,
                format!("Failed to read record body: {}", e),
            )
        })?;

        let (entry, consumed) = LogEntry::deserialize(&record_buf)
            .map_err(|e| LogError::corruption_at_offset(self.current_offset, e.to_string()))?;

        let sequence = entry.sequence();
        if sequence <= self.last_sequence {
            return Err(LogError::corruption_at_sequence(
                sequence,
                format!(
                    "Non-increasing sequence number: {} after {}",
                    sequence, self.last_sequence
                ),
            ));
        }

        self.current_offset += consumed as u64;
        self.last_sequence = sequence;
        Ok(Some(entry))
    }

    /// Reads every remaining entry. Any corruption fails the whole read.
    pub fn read_all(&mut self) -> LogResult<Vec<LogEntry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.read_next()? {
            entries.push(entry);
        }
        Ok(entries)
    }
}

impl Iterator for LogReader {
    type Item = LogResult<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}
