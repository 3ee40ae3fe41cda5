//! Update log error types
//!
//! Error codes:
//! - RTS_LOG_APPEND_FAILED (ERROR severity)
//! - RTS_LOG_FSYNC_FAILED (FATAL severity)
//! - RTS_LOG_CORRUPTION (FATAL severity)
//! - RTS_LOG_GENERATION_UNAVAILABLE (ERROR severity)

use std::fmt;
use std::io;

/// Severity levels for log errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, store continues
    Error,
    /// The store must stop accepting writes
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogErrorCode {
    /// Log write failed
    AppendFailed,
    /// Log fsync failed
    FsyncFailed,
    /// Checksum or framing failure
    Corruption,
    /// Replay requested from a commit marker that was compacted away
    GenerationUnavailable,
}

impl LogErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            LogErrorCode::AppendFailed => "RTS_LOG_APPEND_FAILED",
            LogErrorCode::FsyncFailed => "RTS_LOG_FSYNC_FAILED",
            LogErrorCode::Corruption => "RTS_LOG_CORRUPTION",
            LogErrorCode::GenerationUnavailable => "RTS_LOG_GENERATION_UNAVAILABLE",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            LogErrorCode::AppendFailed => Severity::Error,
            LogErrorCode::FsyncFailed => Severity::Fatal,
            LogErrorCode::Corruption => Severity::Fatal,
            LogErrorCode::GenerationUnavailable => Severity::Error,
        }
    }
}

impl fmt::Display for LogErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Update log error with code, message and optional context.
#[derive(Debug)]
pub struct LogError {
    code: LogErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl LogError {
    pub fn append_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: LogErrorCode::AppendFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    pub fn fsync_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: LogErrorCode::FsyncFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    pub fn corruption(message: impl Into<String>) -> Self {
        Self {
            code: LogErrorCode::Corruption,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    pub fn corruption_at_sequence(sequence: u64, reason: impl Into<String>) -> Self {
        Self {
            code: LogErrorCode::Corruption,
            message: reason.into(),
            details: Some(format!("sequence: {}", sequence)),
            source: None,
        }
    }

    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: LogErrorCode::Corruption,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    pub fn generation_unavailable(generation: u64, oldest: Option<u64>) -> Self {
        Self {
            code: LogErrorCode::GenerationUnavailable,
            message: format!("no commit marker for generation {}", generation),
            details: oldest.map(|g| format!("oldest_marker_generation: {}", g)),
            source: None,
        }
    }

    pub fn code(&self) -> LogErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Fatal errors mean the log can no longer be trusted for appends.
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for LogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

pub type LogResult<T> = Result<T, LogError>;
