//! Apply path errors

use thiserror::Error;

use crate::index::IndexError;
use crate::model::{DocumentId, Version};
use crate::update_log::LogError;

pub type ApplyResult<T> = Result<T, ApplyError>;

fn describe(version: &Option<Version>) -> String {
    version.map_or_else(|| "none".to_string(), |v| v.to_string())
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("Version conflict for {id}: expected {expected}, current {}", describe(.actual))]
    Conflict {
        id: DocumentId,
        expected: Version,
        actual: Option<Version>,
    },

    #[error(
        "Add for {id} at version {version} predates delete-by-query history retained \
         (evicted through {evicted_through})"
    )]
    BeyondRetention {
        id: DocumentId,
        version: Version,
        evicted_through: u64,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Store halted after a fatal error; writes are refused")]
    Halted,

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl ApplyError {
    pub fn code(&self) -> &'static str {
        match self {
            ApplyError::Conflict { .. } => "RTS_VERSION_CONFLICT",
            ApplyError::BeyondRetention { .. } => "RTS_DBQ_RETENTION_EXCEEDED",
            ApplyError::InvalidRequest(_) => "RTS_INVALID_REQUEST",
            ApplyError::InvariantViolation(_) => "RTS_INVARIANT_VIOLATION",
            ApplyError::Halted => "RTS_STORE_HALTED",
            ApplyError::Log(e) => e.code().code(),
            ApplyError::Index(e) => e.code(),
        }
    }

    /// HTTP-style status for callers that surface errors over a wire API.
    pub fn status_code(&self) -> u16 {
        match self {
            ApplyError::Conflict { .. } => 409,
            ApplyError::BeyondRetention { .. } => 410,
            ApplyError::InvalidRequest(_) => 400,
            ApplyError::InvariantViolation(_) => 500,
            ApplyError::Halted => 503,
            ApplyError::Log(_) => 503,
            ApplyError::Index(_) => 500,
        }
    }

    /// Fatal errors mean the store must stop accepting writes.
    pub fn is_fatal(&self) -> bool {
        match self {
            ApplyError::InvariantViolation(_) => true,
            ApplyError::Log(e) => e.is_fatal(),
            ApplyError::Index(e) => e.is_fatal(),
            _ => false,
        }
    }
}
