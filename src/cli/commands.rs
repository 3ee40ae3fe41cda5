//! CLI command implementations
//!
//! Log commands read the update log directly and never open the store.
//! `get`, `apply` and `compact` open the store, which runs recovery first.

use std::io;
use std::path::Path;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::StoreConfig;
use crate::model::{ApplyOutcome, Document, DocumentId, Mode, Operation, Version};
use crate::observability::{self, Event};
use crate::store::DocumentStore;
use crate::update_log::{log_path, LogEntry, LogReader, UpdateLog, UpdateRecord};

use super::args::{Command, StoreTarget};
use super::errors::{CliError, CliResult};
use super::io::{read_requests, write_error, write_line, write_response};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    observability::init_tracing();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::InspectLog {
            target,
            from_generation,
            limit,
        } => inspect_log(&resolve_config(&target)?, from_generation, limit),
        Command::VerifyLog { target } => verify_log(&resolve_config(&target)?),
        Command::Get {
            target,
            ids,
            committed,
            fl,
        } => get(resolve_config(&target)?, &ids, committed, &fl),
        Command::Apply { target, commit } => apply(resolve_config(&target)?, commit),
        Command::Compact { target } => compact(resolve_config(&target)?),
    }
}

fn resolve_config(target: &StoreTarget) -> CliResult<StoreConfig> {
    match (&target.config, &target.data_dir) {
        (Some(path), _) => {
            let config = StoreConfig::load(path)?;
            tracing::info!(
                event = %Event::ConfigLoaded,
                path = %path.display(),
                data_dir = %config.data_dir.display(),
                "config loaded"
            );
            Ok(config)
        }
        (None, Some(dir)) => Ok(StoreConfig::new(dir)),
        (None, None) => Err(CliError::config_error(
            "either --config or --data-dir is required",
        )),
    }
}

/// Prints one JSON line per log entry, then a summary response.
pub fn inspect_log(
    config: &StoreConfig,
    from_generation: Option<u64>,
    limit: Option<usize>,
) -> CliResult<()> {
    let limit = limit.unwrap_or(usize::MAX);
    let mut printed = 0;

    match from_generation {
        Some(generation) => {
            let (log, _) = UpdateLog::open(&config.data_dir, false)?;
            let replay = log.replay_from(generation)?;
            let through = replay.through_sequence();
            for record in replay.take(limit) {
                write_line(&update_json(&record?))?;
                printed += 1;
            }
            write_response(json!({
                "records": printed,
                "from_generation": generation,
                "through_sequence": through,
            }))
        }
        None => {
            let path = log_path(&config.data_dir);
            if !path.exists() {
                return write_response(json!({ "records": 0 }));
            }
            for entry in LogReader::open(&path)?.take(limit) {
                write_line(&entry_json(&entry?))?;
                printed += 1;
            }
            write_response(json!({ "records": printed }))
        }
    }
}

/// Reads the whole log, checking every checksum and sequence number.
pub fn verify_log(config: &StoreConfig) -> CliResult<()> {
    let path = log_path(&config.data_dir);
    if !path.exists() {
        return write_response(json!({ "valid": true, "records": 0 }));
    }

    let summary = match summarize_log(&path) {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!(event = %Event::LogCorruption, error = %e, "log verification failed");
            write_error(e.code().code(), &e.to_string())?;
            return Err(e.into());
        }
    };
    write_response(summary)
}

fn summarize_log(path: &Path) -> crate::update_log::LogResult<Value> {
    let mut reader = LogReader::open(path)?;
    let (mut updates, mut deletes_by_query, mut markers) = (0usize, 0usize, 0usize);
    let mut newest_generation = None;
    let mut compactions = 0usize;
    let mut dbq_evicted_through = None;

    while let Some(entry) = reader.read_next()? {
        match entry {
            LogEntry::Update(record) => {
                updates += 1;
                if matches!(record.operation, Operation::DeleteByQuery { .. }) {
                    deletes_by_query += 1;
                }
            }
            LogEntry::Commit(marker) => {
                markers += 1;
                newest_generation = Some(marker.generation);
            }
            LogEntry::Compaction(compaction) => {
                compactions += 1;
                dbq_evicted_through = Some(compaction.dbq_evicted_through);
            }
        }
    }

    Ok(json!({
        "valid": true,
        "records": updates + markers + compactions,
        "updates": updates,
        "deletes_by_query": deletes_by_query,
        "commit_markers": markers,
        "compactions": compactions,
        "newest_generation": newest_generation,
        "dbq_evicted_through": dbq_evicted_through,
        "last_sequence": reader.last_sequence_number(),
        "bytes": reader.current_offset(),
    }))
}

/// An empty `fl` returns whole documents.
pub fn get(config: StoreConfig, ids: &[String], committed: bool, fl: &[String]) -> CliResult<()> {
    let store = DocumentStore::open_default(config)?;
    let ids: Vec<DocumentId> = ids.iter().map(|id| DocumentId::from(id.as_str())).collect();

    let documents = if committed {
        let mut found = Vec::new();
        for id in &ids {
            if let Some(document) = store.get_committed(id)? {
                found.push(document);
            }
        }
        found
    } else {
        store.get_many(&ids)?
    };
    let documents: Vec<Document> = if fl.is_empty() {
        documents
    } else {
        documents.iter().map(|document| document.project(fl)).collect()
    };

    write_response(json!({
        "generation": store.installed_generation(),
        "documents": documents,
    }))
}

/// One line on stdin: `{"operation": {...}, "mode": {...}}`.
#[derive(Debug, Deserialize)]
struct ApplyRequest {
    operation: Operation,
    #[serde(default)]
    mode: ModeRequest,
}

#[derive(Debug, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ModeRequest {
    #[default]
    Local,
    Optimistic {
        expected: i64,
    },
    Leader {
        version: i64,
    },
}

impl From<ModeRequest> for Mode {
    fn from(mode: ModeRequest) -> Self {
        match mode {
            ModeRequest::Local => Mode::Local,
            ModeRequest::Optimistic { expected } => Mode::Optimistic(Version::new(expected)),
            ModeRequest::Leader { version } => Mode::Leader(Version::new(version)),
        }
    }
}

/// Applies each request on stdin and prints one result line per request.
///
/// Conflicts and other recoverable errors are reported and skipped; a fatal
/// error stops the run.
pub fn apply(config: StoreConfig, commit: bool) -> CliResult<()> {
    let store = DocumentStore::open_default(config)?;
    let (mut accepted, mut ignored, mut failed) = (0usize, 0usize, 0usize);

    for request in read_requests(io::stdin().lock()) {
        let request: ApplyRequest = serde_json::from_value(request?)?;
        let kind = request.operation.kind();
        match store.apply(request.operation, request.mode.into()) {
            Ok(ApplyOutcome::Accepted(version)) => {
                accepted += 1;
                write_line(&json!({ "op": kind, "outcome": "accepted", "version": version }))?;
            }
            Ok(ApplyOutcome::Ignored { current }) => {
                ignored += 1;
                write_line(&json!({ "op": kind, "outcome": "ignored", "current": current }))?;
            }
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                failed += 1;
                write_line(&json!({
                    "op": kind,
                    "outcome": "error",
                    "code": e.code(),
                    "status": e.status_code(),
                    "message": e.to_string(),
                }))?;
            }
        }
    }

    let outcome = if commit {
        Some(store.commit(false)?)
    } else {
        None
    };
    write_response(json!({
        "accepted": accepted,
        "ignored": ignored,
        "failed": failed,
        "commit": outcome,
    }))
}

/// Folds everything durably, which also compacts the update log.
pub fn compact(config: StoreConfig) -> CliResult<()> {
    let store = DocumentStore::open_default(config)?;
    let outcome = store.commit(true)?;
    write_response(json!({
        "commit": outcome,
        "recovery": store.recovery_report(),
        "metrics": store.metrics(),
    }))
}

fn update_json(record: &UpdateRecord) -> Value {
    json!({
        "sequence": record.sequence,
        "kind": record.operation.kind(),
        "version": record.version,
        "operation": record.operation,
    })
}

fn entry_json(entry: &LogEntry) -> Value {
    match entry {
        LogEntry::Update(record) => update_json(record),
        LogEntry::Commit(marker) => json!({
            "sequence": marker.sequence,
            "kind": "commit",
            "generation": marker.generation,
            "through_sequence": marker.through_sequence,
            "durable": marker.durable,
        }),
        LogEntry::Compaction(compaction) => json!({
            "sequence": compaction.sequence,
            "kind": "compaction",
            "through_sequence": compaction.through_sequence,
            "dbq_evicted_through": compaction.dbq_evicted_through,
        }),
    }
}
