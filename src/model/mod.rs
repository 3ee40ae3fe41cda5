//! Domain vocabulary shared by every subsystem
//!
//! This module provides:
//! - `DocumentId` / `Document` / `Fields` - what gets stored
//! - `Version` - signed version, negative iff tombstoned
//! - `Operation` / `Mode` / `ApplyOutcome` - what gets applied and how
//! - `Query` / `PredicateEvaluator` - delete-by-query predicates

mod document;
mod operation;
mod query;
mod version;

pub use document::{Document, DocumentId, Fields};
pub use operation::{ApplyOutcome, Mode, Operation};
pub use query::{FieldMatcher, PredicateEvaluator, Query};
pub use version::Version;
