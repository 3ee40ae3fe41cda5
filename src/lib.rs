//! rtstore - versioned document store with real-time get
//!
//! Operations are applied under per-document version control (local,
//! optimistic or leader-ordered), logged before they are acknowledged, and
//! readable immediately through real-time get. Commits fold the log into a
//! committed index in generations; durable commits also compact the log.

pub mod cli;
pub mod commit;
pub mod concurrency;
pub mod config;
pub mod dbq;
pub mod index;
pub mod model;
pub mod observability;
pub mod rtg;
pub mod store;
pub mod update_log;
pub mod versioning;

pub use commit::{CommitError, CommitOutcome};
pub use concurrency::ApplyError;
pub use config::StoreConfig;
pub use index::{CommittedIndex, MemoryIndex};
pub use model::{
    ApplyOutcome, Document, DocumentId, FieldMatcher, Fields, Mode, Operation, PredicateEvaluator,
    Query, Version,
};
pub use store::{DocumentStore, RecoveryReport, StoreError};
