//! Store open/recovery errors

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::commit::CommitError;
use crate::concurrency::ApplyError;
use crate::config::ConfigError;
use crate::index::IndexError;
use crate::update_log::LogError;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to prepare data directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Commit(#[from] CommitError),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Config(e) => e.code(),
            StoreError::Io { .. } => "RTS_STORE_IO",
            StoreError::Log(e) => e.code().code(),
            StoreError::Index(e) => e.code(),
            StoreError::Apply(e) => e.code(),
            StoreError::Commit(e) => e.code(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            StoreError::Config(_) => 400,
            StoreError::Io { .. } => 500,
            StoreError::Log(_) => 503,
            StoreError::Index(_) => 500,
            StoreError::Apply(e) => e.status_code(),
            StoreError::Commit(e) => e.status_code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Version;

    #[test]
    fn test_apply_errors_keep_their_status() {
        let err: StoreError = ApplyError::Conflict {
            id: "7".into(),
            expected: Version::new(1),
            actual: None,
        }
        .into();
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.code(), "RTS_VERSION_CONFLICT");
    }

    #[test]
    fn test_corrupt_log_maps_to_log_code() {
        let err: StoreError = LogError::corruption("bad frame").into();
        assert_eq!(err.code(), "RTS_LOG_CORRUPTION");
    }
}
