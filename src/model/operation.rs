//! Operations, apply modes and apply outcomes.
//!
//! `Operation` is a closed set; every consumer matches it exhaustively.
//! The version of an operation travels with its `Mode` (expected or
//! leader-assigned) and, once applied, on the logged `UpdateRecord`.

use serde::{Deserialize, Serialize};

use super::{DocumentId, Fields, Query, Version};

/// A mutation delivered to the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Insert or fully replace a document.
    Add { id: DocumentId, fields: Fields },
    /// Delete a single document.
    DeleteById { id: DocumentId },
    /// Delete every document matching a predicate.
    DeleteByQuery { query: Query },
}

impl Operation {
    pub fn add(id: impl Into<DocumentId>, fields: Fields) -> Self {
        Operation::Add { id: id.into(), fields }
    }

    pub fn delete(id: impl Into<DocumentId>) -> Self {
        Operation::DeleteById { id: id.into() }
    }

    pub fn delete_by_query(query: Query) -> Self {
        Operation::DeleteByQuery { query }
    }

    /// The single document this operation targets, if any.
    pub fn document_id(&self) -> Option<&DocumentId> {
        match self {
            Operation::Add { id, .. } | Operation::DeleteById { id } => Some(id),
            Operation::DeleteByQuery { .. } => None,
        }
    }

    /// Short name used in logs and the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Add { .. } => "add",
            Operation::DeleteById { .. } => "delete_by_id",
            Operation::DeleteByQuery { .. } => "delete_by_query",
        }
    }
}

/// Conflict policy under which an operation is applied.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Locally originated, unconditional. The version clock assigns the version.
    Local,
    /// Client optimistic locking: the caller's expected current version.
    Optimistic(Version),
    /// Replica applying a leader-stamped operation. Only the magnitude is used.
    Leader(Version),
}

/// Non-error result of applying an operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Applied; carries the signed version that was stored (negative for deletes).
    Accepted(Version),
    /// Stale leader operation dropped without effect.
    Ignored { current: Option<Version> },
}

impl ApplyOutcome {
    pub fn version(&self) -> Option<Version> {
        match self {
            ApplyOutcome::Accepted(version) => Some(*version),
            ApplyOutcome::Ignored { .. } => None,
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, ApplyOutcome::Ignored { .. })
    }
}
