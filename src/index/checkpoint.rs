//! Index checkpoint file
//!
//! Location: `<data_dir>/index/checkpoint.json`
//!
//! Records the documents visible at one durably folded generation,
//! tombstones included, plus the log sequence it covers. Written to a temp
//! file, fsynced, renamed over the previous checkpoint, then the directory
//! is fsynced. A reader therefore sees either the old or the new checkpoint.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::errors::{IndexError, IndexResult};
use crate::model::{DocumentId, Fields, Version};

const FORMAT_VERSION: u8 = 1;

/// Location of the checkpoint under a data directory.
pub fn checkpoint_path(data_dir: &Path) -> PathBuf {
    data_dir.join("index").join("checkpoint.json")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointDocument {
    pub id: DocumentId,
    pub version: Version,
    /// `None` for tombstones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Fields>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexCheckpoint {
    pub format_version: u8,
    /// RFC3339 timestamp
    pub created_at: String,
    pub generation: u64,
    pub through_sequence: u64,
    pub max_version: u64,
    pub documents: Vec<CheckpointDocument>,
}

impl IndexCheckpoint {
    pub fn new(
        generation: u64,
        through_sequence: u64,
        max_version: u64,
        documents: Vec<CheckpointDocument>,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            created_at: Utc::now().to_rfc3339(),
            generation,
            through_sequence,
            max_version,
            documents,
        }
    }

    pub fn write_to_file(&self, path: &Path) -> IndexResult<()> {
        let json = serde_json::to_vec(self)
            .map_err(|e| IndexError::Corrupt(format!("Failed to encode checkpoint: {}", e)))?;

        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| IndexError::io(&dir, e))?;
        }

        let temp_path = path.with_extension("json.tmp");
        let mut file = File::create(&temp_path).map_err(|e| IndexError::io(&temp_path, e))?;
        file.write_all(&json)
            .map_err(|e| IndexError::io(&temp_path, e))?;
        file.sync_all().map_err(|e| IndexError::io(&temp_path, e))?;
        drop(file);

        fs::rename(&temp_path, path).map_err(|e| IndexError::io(path, e))?;

        let dir_handle = OpenOptions::new()
            .read(true)
            .open(&dir)
            .map_err(|e| IndexError::io(&dir, e))?;
        dir_handle.sync_all().map_err(|e| IndexError::io(&dir, e))?;

        Ok(())
    }

    /// Reads the checkpoint; `Ok(None)` if none was ever written.
    pub fn read_from_file(path: &Path) -> IndexResult<Option<Self>> {
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(IndexError::io(path, e)),
        };

        let checkpoint: IndexCheckpoint = serde_json::from_slice(&content)
            .map_err(|e| IndexError::Corrupt(format!("{}: {}", path.display(), e)))?;

        if checkpoint.format_version != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported checkpoint format version {}",
                checkpoint.format_version
            )));
        }
        Ok(Some(checkpoint))
    }
}
