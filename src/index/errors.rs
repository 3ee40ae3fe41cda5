//! Committed index errors

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type IndexResult<T> = Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Checkpoint I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Checkpoint is corrupt: {0}")]
    Corrupt(String),

    #[error("Fold of generation {generation} failed: {reason}")]
    FoldFailed { generation: u64, reason: String },

    #[error("Index unavailable: {0}")]
    Unavailable(String),
}

impl IndexError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        IndexError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            IndexError::Io { .. } => "RTS_INDEX_IO",
            IndexError::Corrupt(_) => "RTS_INDEX_CORRUPT",
            IndexError::FoldFailed { .. } => "RTS_INDEX_FOLD_FAILED",
            IndexError::Unavailable(_) => "RTS_INDEX_UNAVAILABLE",
        }
    }

    /// A corrupt checkpoint cannot be recovered from without operator action.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IndexError::Corrupt(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_fatality() {
        let err = IndexError::Corrupt("bad json".into());
        assert_eq!(err.code(), "RTS_INDEX_CORRUPT");
        assert!(err.is_fatal());

        let err = IndexError::FoldFailed {
            generation: 4,
            reason: "disk full".into(),
        };
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("generation 4"));
    }
}
