//! CLI module for rtstore
//!
//! Provides command-line interface for:
//! - inspect-log: Print update log records
//! - verify-log: Check update log integrity
//! - get: Real-time get of documents
//! - apply: Apply operations read from stdin
//! - compact: Durable commit plus log compaction

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, StoreTarget};
pub use commands::{apply, compact, get, inspect_log, run, run_command, verify_log};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_requests, write_error, write_line, write_response};
