//! Commit errors

use thiserror::Error;

use crate::index::IndexError;
use crate::update_log::LogError;

pub type CommitResult<T> = Result<T, CommitError>;

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("Too many concurrent commits (max {max})")]
    TooManyCommits { max: usize },

    #[error("Commit fold failed: {0}")]
    Index(#[from] IndexError),

    #[error("Commit marker write failed: {0}")]
    Log(#[from] LogError),
}

impl CommitError {
    pub fn code(&self) -> &'static str {
        match self {
            CommitError::TooManyCommits { .. } => "RTS_COMMIT_REJECTED",
            CommitError::Index(e) => e.code(),
            CommitError::Log(e) => e.code().code(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            CommitError::TooManyCommits { .. } => 503,
            CommitError::Index(_) => 500,
            CommitError::Log(_) => 503,
        }
    }

    /// Rejections are retryable and leave no trace; other failures leave
    /// the operations buffered for the next commit.
    pub fn is_retryable(&self) -> bool {
        match self {
            CommitError::TooManyCommits { .. } => true,
            CommitError::Index(e) => !e.is_fatal(),
            CommitError::Log(e) => !e.is_fatal(),
        }
    }
}
