//! Update log record types and framing
//!
//! Each record on disk:
//! - Record Length (u32 LE), total including this field and the checksum
//! - Record Kind (u8): ADD / DELETE_BY_ID / DELETE_BY_QUERY / COMMIT / COMPACTION
//! - Sequence Number (u64 LE)
//! - Body (JSON)
//! - Checksum (u32 LE) over everything before it
//!
//! Update records carry the applied signed version together with the full
//! operation (full document for adds, never deltas), so replay needs nothing
//! but the log.

use std::io;

use serde::{Deserialize, Serialize};

use super::checksum::compute_checksum;
use crate::model::{Document, Operation, Version};

/// Length + kind + sequence + checksum.
pub const FRAME_OVERHEAD: usize = 4 + 1 + 8 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    Add = 0,
    DeleteById = 1,
    DeleteByQuery = 2,
    /// Commit marker written when a commit installs its snapshot
    Commit = 3,
    /// Written at the tail of a compacted log
    Compaction = 4,
}

impl RecordKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(RecordKind::Add),
            1 => Some(RecordKind::DeleteById),
            2 => Some(RecordKind::DeleteByQuery),
            3 => Some(RecordKind::Commit),
            4 => Some(RecordKind::Compaction),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    fn of(operation: &Operation) -> Self {
        match operation {
            Operation::Add { .. } => RecordKind::Add,
            Operation::DeleteById { .. } => RecordKind::DeleteById,
            Operation::DeleteByQuery { .. } => RecordKind::DeleteByQuery,
        }
    }
}

/// An accepted operation together with the version it was applied at.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRecord {
    /// Log sequence number (starts at 1, never reused)
    pub sequence: u64,
    /// Signed applied version; negative for deletes
    pub version: Version,
    pub operation: Operation,
}

impl UpdateRecord {
    pub fn kind(&self) -> RecordKind {
        RecordKind::of(&self.operation)
    }

    /// The document this record produced, if it was an add.
    pub fn document(&self) -> Option<Document> {
        match &self.operation {
            Operation::Add { id, fields } => {
                Some(Document::new(id.clone(), self.version, fields.clone()))
            }
            Operation::DeleteById { .. } | Operation::DeleteByQuery { .. } => None,
        }
    }

    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        let body = serde_json::to_vec(&UpdateBodyRef {
            version: self.version,
            operation: &self.operation,
        })
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(frame(self.kind(), self.sequence, &body))
    }
}

/// Marks the point up to which a commit folded the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMarker {
    #[serde(skip)]
    pub sequence: u64,
    pub generation: u64,
    /// Every update record with a sequence at or below this was folded.
    pub through_sequence: u64,
    pub durable: bool,
}

impl CommitMarker {
    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        let body =
            serde_json::to_vec(self).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(frame(RecordKind::Commit, self.sequence, &body))
    }
}

/// What a compaction dropped that the remaining records cannot rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionRecord {
    #[serde(skip)]
    pub sequence: u64,
    /// Update records at or below this sequence were folded and dropped,
    /// apart from retained delete-by-query records.
    pub through_sequence: u64,
    /// Highest delete-by-query version no longer in the log.
    pub dbq_evicted_through: u64,
}

impl CompactionRecord {
    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        let body =
            serde_json::to_vec(self).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(frame(RecordKind::Compaction, self.sequence, &body))
    }
}

fn frame(kind: RecordKind, sequence: u64, body: &[u8]) -> Vec<u8> {
    let record_length = (FRAME_OVERHEAD + body.len()) as u32;

    let mut record = Vec::with_capacity(record_length as usize);
    record.extend_from_slice(&record_length.to_le_bytes());
    record.push(kind.as_u8());
    record.extend_from_slice(&sequence.to_le_bytes());
    record.extend_from_slice(body);

    let checksum = compute_checksum(&record);
    record.extend_from_slice(&checksum.to_le_bytes());
    record
}

/// Anything that can appear in the log file.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEntry {
    Update(UpdateRecord),
    Commit(CommitMarker),
    Compaction(CompactionRecord),
}

#[derive(Serialize)]
struct UpdateBodyRef<'a> {
    version: Version,
    operation: &'a Operation,
}

#[derive(Deserialize)]
struct UpdateBody {
    version: Version,
    operation: Operation,
}

impl LogEntry {
    pub fn sequence(&self) -> u64 {
        match self {
            LogEntry::Update(record) => record.sequence,
            LogEntry::Commit(marker) => marker.sequence,
            LogEntry::Compaction(record) => record.sequence,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            LogEntry::Update(record) => record.kind(),
            LogEntry::Commit(_) => RecordKind::Commit,
            LogEntry::Compaction(_) => RecordKind::Compaction,
        }
    }

    /// Serialize the complete framed record.
    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        match self {
            LogEntry::Update(record) => record.serialize(),
            LogEntry::Commit(marker) => marker.serialize(),
            LogEntry::Compaction(record) => record.serialize(),
        }
    }

    /// Deserialize one framed record, verifying its checksum.
    ///
    /// Returns the entry and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        if data.len() < FRAME_OVERHEAD {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Record too short"));
        }

        let record_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if record_length < FRAME_OVERHEAD {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid record length: {}", record_length),
            ));
        }
        if data.len() < record_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Record truncated: expected {} bytes, got {}",
                    record_length,
                    data.len()
                ),
            ));
        }

        let checksum_offset = record_length - 4;
        let stored_checksum = u32::from_le_bytes([
            data[checksum_offset],
            data[checksum_offset + 1],
            data[checksum_offset + 2],
            data[checksum_offset + 3],
        ]);
        let computed_checksum = compute_checksum(&data[..checksum_offset]);
        if computed_checksum != stored_checksum {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Checksum mismatch: computed {:08x}, stored {:08x}",
                    computed_checksum, stored_checksum
                ),
            ));
        }

        let kind = RecordKind::from_u8(data[4]).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid record kind: {}", data[4]),
            )
        })?;

        let mut seq_buf = [0u8; 8];
        seq_buf.copy_from_slice(&data[5..13]);
        let sequence = u64::from_le_bytes(seq_buf);

        let body = &data[13..checksum_offset];
        let invalid = |e: serde_json::Error| io::Error::new(io::ErrorKind::InvalidData, e);

        let entry = match kind {
            RecordKind::Commit => {
                let mut marker: CommitMarker = serde_json::from_slice(body).map_err(invalid)?;
                marker.sequence = sequence;
                LogEntry::Commit(marker)
            }
            RecordKind::Compaction => {
                let mut record: CompactionRecord =
                    serde_json::from_slice(body).map_err(invalid)?;
                record.sequence = sequence;
                LogEntry::Compaction(record)
            }
            RecordKind::Add | RecordKind::DeleteById | RecordKind::DeleteByQuery => {
                let body: UpdateBody = serde_json::from_slice(body).map_err(invalid)?;
                let record = UpdateRecord {
                    sequence,
                    version: body.version,
                    operation: body.operation,
                };
                if record.kind() != kind {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "Record kind {:?} does not match operation {}",
                            kind,
                            record.operation.kind()
                        ),
                    ));
                }
                LogEntry::Update(record)
            }
        };

        Ok((entry, record_length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Fields, Query};
    use serde_json::json;

    fn add_record(sequence: u64) -> LogEntry {
        let fields: Fields = serde_json::from_value(json!({"title": "hello"})).unwrap();
        LogEntry::Update(UpdateRecord {
            sequence,
            version: Version::live(100),
            operation: Operation::add("doc1", fields),
        })
    }

    #[test]
    fn test_record_round_trip_preserves_everything() {
        let entries = vec![
            add_record(1),
            LogEntry::Update(UpdateRecord {
                sequence: 2,
                version: Version::tombstone(101),
                operation: Operation::delete("doc1"),
            }),
            LogEntry::Update(UpdateRecord {
                sequence: 3,
                version: Version::tombstone(102),
                operation: Operation::delete_by_query(Query::ids(["a", "b"])),
            }),
            LogEntry::Commit(CommitMarker {
                sequence: 4,
                generation: 2,
                through_sequence: 3,
                durable: true,
            }),
            LogEntry::Compaction(CompactionRecord {
                sequence: 5,
                through_sequence: 4,
                dbq_evicted_through: 102,
            }),
        ];

        for entry in entries {
            let bytes = entry.serialize().unwrap();
            let (decoded, consumed) = LogEntry::deserialize(&bytes).unwrap();
            assert_eq!(decoded, entry);
            assert_eq!(consumed, bytes.len());
        }
    }

    #[test]
    fn test_checksum_mismatch_is_detected() {
        let mut bytes = add_record(1).serialize().unwrap();
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0xff;

        let err = LogEntry::deserialize(&bytes).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("Checksum mismatch"));
    }

    #[test]
    fn test_truncated_record_is_detected() {
        let bytes = add_record(1).serialize().unwrap();
        let err = LogEntry::deserialize(&bytes[..bytes.len() - 3]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_add_record_yields_document() {
        let LogEntry::Update(record) = add_record(5) else {
            panic!("expected update record");
        };
        let doc = record.document().unwrap();
        assert_eq!(doc.id.as_str(), "doc1");
        assert_eq!(doc.version, Version::live(100));
        assert_eq!(doc.fields["title"], json!("hello"));
    }
}
