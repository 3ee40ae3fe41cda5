//! Committed index collaborator
//!
//! The store folds batches of update records into a `CommittedIndex` at
//! commit time and reads committed state from it at a given generation.
//! The index is not the source of truth: anything it lost can be rebuilt
//! from the update log, provided it reports what it durably holds through
//! [`CommittedIndex::recovered`].
//!
//! # Contract
//!
//! - `fold` is idempotent and version-guarded: folding a record whose
//!   version does not supersede what is already visible has no effect
//! - Reads at generation G see exactly the batches folded at generations
//!   `<= G`, and stay stable while a snapshot of G is alive
//! - Delete-by-query records need no handling here; every document they
//!   removed was logged as its own delete

mod checkpoint;
mod errors;
mod memory;

use std::sync::Arc;

use crate::model::{Document, DocumentId, Version};
use crate::update_log::UpdateRecord;

pub use checkpoint::{checkpoint_path, CheckpointDocument, IndexCheckpoint};
pub use errors::{IndexError, IndexResult};
pub use memory::MemoryIndex;

/// One commit's worth of records.
#[derive(Debug, Clone)]
pub struct FoldBatch {
    pub generation: u64,
    /// Every record at or below this sequence is in `records`, or was folded
    /// by an earlier installed generation.
    pub through_sequence: u64,
    pub records: Vec<Arc<UpdateRecord>>,
    pub durable: bool,
}

/// What the index durably held when it was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveredState {
    pub generation: u64,
    pub through_sequence: u64,
    pub max_version: u64,
}

pub trait CommittedIndex: Send + Sync {
    /// Folds a batch at `batch.generation`. Durable batches must be
    /// persisted before returning.
    fn fold(&self, batch: &FoldBatch) -> IndexResult<()>;

    /// The live document visible at `generation`; `None` if absent or deleted.
    fn fetch_by_id(&self, id: &DocumentId, generation: u64) -> IndexResult<Option<Document>>;

    /// The signed version visible at `generation`, tombstones included.
    fn version_of(&self, id: &DocumentId, generation: u64) -> IndexResult<Option<Version>>;

    /// Ids with any entry visible at `generation`, tombstones included.
    fn document_ids(&self, generation: u64) -> IndexResult<Vec<DocumentId>>;

    /// Highest version magnitude ever folded.
    fn max_version(&self) -> u64;

    /// Drops history no snapshot at or above `min_live_generation` can observe.
    fn compact(&self, min_live_generation: u64);

    fn recovered(&self) -> RecoveredState;

    /// Whether durable folds survive a restart. The update log is only
    /// compacted behind durable commits of an index that says so.
    fn persists_durable_folds(&self) -> bool {
        true
    }
}
