//! CommittedSnapshot - a stable view of the committed index
//!
//! A snapshot is a generation number plus the log sequence its generation
//! folded through. It never changes once created; holding one pins the
//! index history it reads (see `CommitCoordinator::min_live_generation`).

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::index::{CommittedIndex, IndexResult};
use crate::model::{Document, DocumentId, Version};

pub struct CommittedSnapshot {
    generation: u64,
    folded_through: u64,
    index: Arc<dyn CommittedIndex>,
}

impl CommittedSnapshot {
    pub fn new(generation: u64, folded_through: u64, index: Arc<dyn CommittedIndex>) -> Self {
        Self {
            generation,
            folded_through,
            index,
        }
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Highest update log sequence folded into this snapshot.
    #[inline]
    pub fn folded_through(&self) -> u64 {
        self.folded_through
    }

    pub fn fetch(&self, id: &DocumentId) -> IndexResult<Option<Document>> {
        self.index.fetch_by_id(id, self.generation)
    }

    pub fn version_of(&self, id: &DocumentId) -> IndexResult<Option<Version>> {
        self.index.version_of(id, self.generation)
    }

    pub fn document_ids(&self) -> IndexResult<Vec<DocumentId>> {
        self.index.document_ids(self.generation)
    }
}

impl fmt::Debug for CommittedSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommittedSnapshot")
            .field("generation", &self.generation)
            .field("folded_through", &self.folded_through)
            .finish()
    }
}

/// The installed snapshot. Swapped atomically; readers clone the `Arc`.
#[derive(Debug)]
pub struct SnapshotCell {
    current: RwLock<Arc<CommittedSnapshot>>,
}

impl SnapshotCell {
    pub fn new(initial: CommittedSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn load(&self) -> Arc<CommittedSnapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation()
    }

    /// Installs `snapshot` if its generation is newer than the installed one.
    ///
    /// Returns the replaced snapshot on success, or `None` if `snapshot` was
    /// superseded.
    pub fn install_if_newer(&self, snapshot: CommittedSnapshot) -> Option<Arc<CommittedSnapshot>> {
        let mut current = self.current.write();
        if snapshot.generation <= current.generation {
            return None;
        }
        Some(std::mem::replace(&mut *current, Arc::new(snapshot)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;

    fn snapshot(generation: u64, index: &Arc<dyn CommittedIndex>) -> CommittedSnapshot {
        CommittedSnapshot::new(generation, generation * 10, Arc::clone(index))
    }

    #[test]
    fn test_install_only_moves_forward() {
        let index: Arc<dyn CommittedIndex> = Arc::new(MemoryIndex::new());
        let cell = SnapshotCell::new(snapshot(0, &index));

        let replaced = cell.install_if_newer(snapshot(2, &index)).unwrap();
        assert_eq!(replaced.generation(), 0);
        assert!(cell.install_if_newer(snapshot(1, &index)).is_none());
        assert!(cell.install_if_newer(snapshot(2, &index)).is_none());
        assert_eq!(cell.generation(), 2);
        assert_eq!(cell.load().folded_through(), 20);
    }

    #[test]
    fn test_loaded_snapshot_is_stable_across_installs() {
        let index: Arc<dyn CommittedIndex> = Arc::new(MemoryIndex::new());
        let cell = SnapshotCell::new(snapshot(1, &index));

        let held = cell.load();
        cell.install_if_newer(snapshot(5, &index));
        assert_eq!(held.generation(), 1);
        assert_eq!(cell.load().generation(), 5);
    }
}
