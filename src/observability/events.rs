//! Observable events
//!
//! Every structured log line carries an `event` field drawn from this enum,
//! so log consumers can filter on a closed vocabulary.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Store open begins
    OpenStart,
    /// Store open complete, ready to serve
    OpenComplete,
    ConfigLoaded,

    // Apply path
    /// Operation accepted and logged
    OperationApplied,
    /// Stale leader operation dropped
    OperationIgnored,
    /// Optimistic version check failed
    VersionConflict,
    /// Delete-by-query registered with the watermark
    DeleteByQueryRegistered,
    /// Add suppressed by a newer delete-by-query
    AddSuppressed,
    /// Leader add older than the delete-by-query retention window
    RetentionExceeded,
    /// Internal invariant breach (FATAL)
    InvariantViolation,

    // Update log
    LogAppendFailed,
    LogCompacted,
    /// Checksum or framing failure (FATAL)
    LogCorruption,

    // Commit
    CommitStart,
    /// Snapshot installed
    CommitInstalled,
    /// Folded but not installed; a newer generation was already visible
    CommitSuperseded,
    CommitFailed,
    CommitRejected,

    // Recovery
    RecoveryStart,
    RecoveryComplete,
    /// Recovery failed (FATAL)
    RecoveryFailed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::OpenStart => "STORE_OPEN_BEGIN",
            Event::OpenComplete => "STORE_OPEN_COMPLETE",
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::OperationApplied => "OPERATION_APPLIED",
            Event::OperationIgnored => "OPERATION_IGNORED",
            Event::VersionConflict => "VERSION_CONFLICT",
            Event::DeleteByQueryRegistered => "DBQ_REGISTERED",
            Event::AddSuppressed => "ADD_SUPPRESSED",
            Event::RetentionExceeded => "DBQ_RETENTION_EXCEEDED",
            Event::InvariantViolation => "INVARIANT_VIOLATION",

            Event::LogAppendFailed => "LOG_APPEND_FAILED",
            Event::LogCompacted => "LOG_COMPACTED",
            Event::LogCorruption => "LOG_CORRUPTION",

            Event::CommitStart => "COMMIT_BEGIN",
            Event::CommitInstalled => "COMMIT_INSTALLED",
            Event::CommitSuperseded => "COMMIT_SUPERSEDED",
            Event::CommitFailed => "COMMIT_FAILED",
            Event::CommitRejected => "COMMIT_REJECTED",

            Event::RecoveryStart => "RECOVERY_BEGIN",
            Event::RecoveryComplete => "RECOVERY_COMPLETE",
            Event::RecoveryFailed => "RECOVERY_FAILED",
        }
    }

    /// Returns true if this event means the store cannot continue
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Event::LogCorruption | Event::RecoveryFailed | Event::InvariantViolation
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
