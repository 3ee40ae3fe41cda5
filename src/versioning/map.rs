//! VersionMap - latest applied version per document id
//!
//! Source of truth for real-time get between commits. Sharded (`DashMap`),
//! so reads of one id never wait behind writes to an unrelated shard.
//!
//! Entries are created on the first accepted operation for an id and then
//! only mutated; deletes leave a tombstone entry behind. Monotonicity is the
//! caller's responsibility (ConcurrencyController holds the id lock);
//! `upsert` re-checks it in debug builds.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::model::{DocumentId, Version};

/// The latest accepted version of one document.
///
/// `version` and the location of its payload are published together by a
/// single `upsert`, so a reader never pairs a tombstone with a stale payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VersionEntry {
    /// Signed version; negative iff tombstoned.
    pub version: Version,
    /// Update log sequence number of the record that produced this entry.
    pub sequence: u64,
}

impl VersionEntry {
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.version.is_tombstone()
    }
}

#[derive(Debug, Default)]
pub struct VersionMap {
    entries: DashMap<DocumentId, VersionEntry>,
}

impl VersionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time read of one entry.
    pub fn get(&self, id: &DocumentId) -> Option<VersionEntry> {
        self.entries.get(id).map(|entry| *entry)
    }

    /// Installs a new entry for `id`. Must be called under the id's lock.
    pub fn upsert(&self, id: DocumentId, version: Version, sequence: u64) {
        let fresh = VersionEntry { version, sequence };
        match self.entries.entry(id) {
            Entry::Occupied(mut occupied) => {
                debug_assert!(
                    version.supersedes(occupied.get().version),
                    "version regression for {}: {} after {}",
                    occupied.key(),
                    version,
                    occupied.get().version
                );
                occupied.insert(fresh);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
            }
        }
    }

    /// Installs the entry only if it supersedes the current one. Used by
    /// recovery, where the caller holds no id lock.
    pub fn upsert_if_newer(&self, id: DocumentId, version: Version, sequence: u64) -> bool {
        let fresh = VersionEntry { version, sequence };
        match self.entries.entry(id) {
            Entry::Occupied(mut occupied) => {
                if version.supersedes(occupied.get().version) {
                    occupied.insert(fresh);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                true
            }
        }
    }

    /// Every id with an entry, tombstones included.
    pub fn ids(&self) -> Vec<DocumentId> {
        self.entries.iter().map(|r| r.key().clone()).collect()
    }

    /// Copy of every entry, for inspection and tests.
    pub fn snapshot(&self) -> Vec<(DocumentId, VersionEntry)> {
        self.entries
            .iter()
            .map(|r| (r.key().clone(), *r.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
