//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero exit code.

use std::fmt;
use std::io;

use crate::commit::CommitError;
use crate::concurrency::ApplyError;
use crate::config::ConfigError;
use crate::index::IndexError;
use crate::store::StoreError;
use crate::update_log::LogError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdin/stdout)
    IoError,
    /// Malformed request on stdin
    BadRequest,
    /// Store failed to open or recover
    OpenFailed,
    /// Update log unreadable or corrupt
    LogError,
    /// Operation or commit failed
    OperationFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "RTS_CLI_CONFIG_ERROR",
            Self::IoError => "RTS_CLI_IO_ERROR",
            Self::BadRequest => "RTS_CLI_BAD_REQUEST",
            Self::OpenFailed => "RTS_CLI_OPEN_FAILED",
            Self::LogError => "RTS_CLI_LOG_ERROR",
            Self::OperationFailed => "RTS_CLI_OPERATION_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::BadRequest, msg)
    }

    pub fn open_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::OpenFailed, msg)
    }

    pub fn log_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::LogError, msg)
    }

    pub fn operation_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::OperationFailed, msg)
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::bad_request(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<LogError> for CliError {
    fn from(e: LogError) -> Self {
        Self::log_error(e.to_string())
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Config(e) => e.into(),
            StoreError::Log(e) => e.into(),
            other => Self::open_failed(format!("{} ({})", other, other.code())),
        }
    }
}

impl From<IndexError> for CliError {
    fn from(e: IndexError) -> Self {
        Self::operation_failed(format!("{} ({})", e, e.code()))
    }
}

impl From<ApplyError> for CliError {
    fn from(e: ApplyError) -> Self {
        Self::operation_failed(format!("{} ({})", e, e.code()))
    }
}

impl From<CommitError> for CliError {
    fn from(e: CommitError) -> Self {
        Self::operation_failed(format!("{} ({})", e, e.code()))
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
