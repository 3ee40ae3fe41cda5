//! MemoryIndex - reference `CommittedIndex`
//!
//! Each document keeps a chain of `(generation, version, payload)` entries.
//! The entry visible at generation G is the one with the largest version
//! magnitude among entries folded at generations `<= G`, so folds of
//! different generations may interleave and a reader pinned to G never sees
//! a later fold.
//!
//! With a data directory, durable folds are written to the checkpoint file
//! and restored by [`MemoryIndex::open`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use super::checkpoint::{checkpoint_path, CheckpointDocument, IndexCheckpoint};
use super::errors::IndexResult;
use super::{CommittedIndex, FoldBatch, RecoveredState};
use crate::model::{Document, DocumentId, Fields, Operation, Version};

#[derive(Debug, Clone)]
struct ChainEntry {
    generation: u64,
    version: Version,
    /// `None` for tombstones
    fields: Option<Fields>,
}

#[derive(Debug, Default)]
struct DocumentChain {
    entries: Vec<ChainEntry>,
}

impl DocumentChain {
    fn visible(&self, generation: u64) -> Option<&ChainEntry> {
        self.entries
            .iter()
            .filter(|e| e.generation <= generation)
            .max_by_key(|e| e.version.magnitude())
    }

    fn accepts(&self, generation: u64, version: Version) -> bool {
        self.visible(generation)
            .map_or(true, |current| version.supersedes(current.version))
    }

    /// Keeps the entry visible at `min_live` and everything folded later.
    fn compact(&mut self, min_live: u64) {
        let keep = self.visible(min_live).map(|e| (e.generation, e.version));
        self.entries
            .retain(|e| e.generation > min_live || Some((e.generation, e.version)) == keep);
    }
}

struct Persistence {
    path: PathBuf,
    /// Newest generation written to the checkpoint
    durable_generation: Mutex<u64>,
}

pub struct MemoryIndex {
    chains: RwLock<HashMap<DocumentId, DocumentChain>>,
    max_version: AtomicU64,
    persistence: Option<Persistence>,
    recovered: RecoveredState,
}

impl MemoryIndex {
    /// A purely in-memory index; durable folds persist nothing.
    pub fn new() -> Self {
        Self {
            chains: RwLock::new(HashMap::new()),
            max_version: AtomicU64::new(0),
            persistence: None,
            recovered: RecoveredState::default(),
        }
    }

    /// Opens the index under `data_dir`, restoring the last checkpoint.
    pub fn open(data_dir: &Path) -> IndexResult<Self> {
        let path = checkpoint_path(data_dir);
        let checkpoint = IndexCheckpoint::read_from_file(&path)?;

        let mut chains = HashMap::new();
        let mut recovered = RecoveredState::default();
        if let Some(checkpoint) = checkpoint {
            recovered = RecoveredState {
                generation: checkpoint.generation,
                through_sequence: checkpoint.through_sequence,
                max_version: checkpoint.max_version,
            };
            for doc in checkpoint.documents {
                chains.insert(
                    doc.id,
                    DocumentChain {
                        entries: vec![ChainEntry {
                            generation: checkpoint.generation,
                            version: doc.version,
                            fields: doc.fields,
                        }],
                    },
                );
            }
        }

        Ok(Self {
            chains: RwLock::new(chains),
            max_version: AtomicU64::new(recovered.max_version),
            persistence: Some(Persistence {
                path,
                durable_generation: Mutex::new(recovered.generation),
            }),
            recovered,
        })
    }

    /// Number of chain entries kept for `id`. Exposed for inspection.
    pub fn history_len(&self, id: &DocumentId) -> usize {
        self.chains
            .read()
            .get(id)
            .map_or(0, |chain| chain.entries.len())
    }

    fn persist(&self, persistence: &Persistence, batch: &FoldBatch) -> IndexResult<()> {
        let mut durable_generation = persistence.durable_generation.lock();
        if batch.generation <= *durable_generation {
            return Ok(());
        }

        let documents: Vec<CheckpointDocument> = {
            let chains = self.chains.read();
            let mut documents: Vec<CheckpointDocument> = chains
                .iter()
                .filter_map(|(id, chain)| {
                    chain.visible(batch.generation).map(|entry| CheckpointDocument {
                        id: id.clone(),
                        version: entry.version,
                        fields: entry.fields.clone(),
                    })
                })
                .collect();
            documents.sort_by(|a, b| a.id.cmp(&b.id));
            documents
        };

        IndexCheckpoint::new(
            batch.generation,
            batch.through_sequence,
            self.max_version(),
            documents,
        )
        .write_to_file(&persistence.path)?;

        *durable_generation = batch.generation;
        tracing::debug!(
            generation = batch.generation,
            through_sequence = batch.through_sequence,
            "index checkpoint written"
        );
        Ok(())
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl CommittedIndex for MemoryIndex {
    fn fold(&self, batch: &FoldBatch) -> IndexResult<()> {
        {
            let mut chains = self.chains.write();
            for record in &batch.records {
                let (id, fields) = match &record.operation {
                    Operation::Add { id, fields } => (id, Some(fields)),
                    Operation::DeleteById { id } => (id, None),
                    Operation::DeleteByQuery { .. } => continue,
                };

                self.max_version
                    .fetch_max(record.version.magnitude(), Ordering::AcqRel);

                let chain = chains.entry(id.clone()).or_default();
                if chain.accepts(batch.generation, record.version) {
                    chain.entries.push(ChainEntry {
                        generation: batch.generation,
                        version: record.version,
                        fields: fields.cloned(),
                    });
                }
            }
        }

        if batch.durable {
            if let Some(persistence) = &self.persistence {
                self.persist(persistence, batch)?;
            }
        }
        Ok(())
    }

    fn fetch_by_id(&self, id: &DocumentId, generation: u64) -> IndexResult<Option<Document>> {
        let chains = self.chains.read();
        let document = chains
            .get(id)
            .and_then(|chain| chain.visible(generation))
            .and_then(|entry| {
                entry
                    .fields
                    .as_ref()
                    .map(|fields| Document::new(id.clone(), entry.version, fields.clone()))
            });
        Ok(document)
    }

    fn version_of(&self, id: &DocumentId, generation: u64) -> IndexResult<Option<Version>> {
        Ok(self
            .chains
            .read()
            .get(id)
            .and_then(|chain| chain.visible(generation))
            .map(|entry| entry.version))
    }

    fn document_ids(&self, generation: u64) -> IndexResult<Vec<DocumentId>> {
        Ok(self
            .chains
            .read()
            .iter()
            .filter(|(_, chain)| chain.visible(generation).is_some())
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn max_version(&self) -> u64 {
        self.max_version.load(Ordering::Acquire)
    }

    fn compact(&self, min_live_generation: u64) {
        let mut chains = self.chains.write();
        for chain in chains.values_mut() {
            chain.compact(min_live_generation);
        }
    }

    fn recovered(&self) -> RecoveredState {
        self.recovered
    }

    fn persists_durable_folds(&self) -> bool {
        self.persistence.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update_log::UpdateRecord;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn fields(title: &str) -> Fields {
        serde_json::from_value(json!({ "title": title })).unwrap()
    }

    fn add(sequence: u64, id: &str, magnitude: u64, title: &str) -> Arc<UpdateRecord> {
        Arc::new(UpdateRecord {
            sequence,
            version: Version::live(magnitude),
            operation: Operation::add(id, fields(title)),
        })
    }

    fn delete(sequence: u64, id: &str, magnitude: u64) -> Arc<UpdateRecord> {
        Arc::new(UpdateRecord {
            sequence,
            version: Version::tombstone(magnitude),
            operation: Operation::delete(id),
        })
    }

    fn batch(generation: u64, records: Vec<Arc<UpdateRecord>>, durable: bool) -> FoldBatch {
        let through_sequence = records.iter().map(|r| r.sequence).max().unwrap_or(0);
        FoldBatch {
            generation,
            through_sequence,
            records,
            durable,
        }
    }

    #[test]
    fn test_reads_are_pinned_to_generation() {
        let index = MemoryIndex::new();
        let id = DocumentId::from("a");
        index.fold(&batch(1, vec![add(1, "a", 10, "one")], false)).unwrap();
        index.fold(&batch(2, vec![add(2, "a", 20, "two")], false)).unwrap();

        assert_eq!(index.fetch_by_id(&id, 0).unwrap(), None);
        assert_eq!(
            index.fetch_by_id(&id, 1).unwrap().unwrap().fields["title"],
            json!("one")
        );
        assert_eq!(index.version_of(&id, 2).unwrap(), Some(Version::live(20)));
    }

    #[test]
    fn test_fold_is_version_guarded_and_idempotent() {
        let index = MemoryIndex::new();
        let id = DocumentId::from("a");
        let records = vec![add(1, "a", 10, "one"), delete(2, "a", 12)];
        index.fold(&batch(1, records.clone(), false)).unwrap();
        index.fold(&batch(2, records, false)).unwrap();
        index.fold(&batch(3, vec![add(3, "a", 11, "stale")], false)).unwrap();

        assert_eq!(index.fetch_by_id(&id, 3).unwrap(), None);
        assert_eq!(index.version_of(&id, 3).unwrap(), Some(Version::tombstone(12)));
        assert_eq!(index.history_len(&id), 2);
    }

    #[test]
    fn test_out_of_order_folds_converge() {
        let index = MemoryIndex::new();
        let id = DocumentId::from("a");
        index.fold(&batch(3, vec![add(1, "a", 10, "one"), add(2, "a", 20, "two")], false)).unwrap();
        index.fold(&batch(2, vec![add(1, "a", 10, "one")], false)).unwrap();

        assert_eq!(index.version_of(&id, 2).unwrap(), Some(Version::live(10)));
        assert_eq!(index.version_of(&id, 3).unwrap(), Some(Version::live(20)));
    }

    #[test]
    fn test_compact_keeps_what_live_generations_see() {
        let index = MemoryIndex::new();
        let id = DocumentId::from("a");
        for generation in 1..=4 {
            index
                .fold(&batch(generation, vec![add(generation, "a", generation * 10, "t")], false))
                .unwrap();
        }
        index.compact(3);

        assert_eq!(index.history_len(&id), 2);
        assert_eq!(index.version_of(&id, 3).unwrap(), Some(Version::live(30)));
        assert_eq!(index.version_of(&id, 4).unwrap(), Some(Version::live(40)));
    }

    #[test]
    fn test_durable_fold_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let index = MemoryIndex::open(dir.path()).unwrap();
            index
                .fold(&batch(1, vec![add(1, "a", 10, "one"), add(2, "b", 11, "two")], true))
                .unwrap();
            index.fold(&batch(2, vec![delete(3, "b", 12)], true)).unwrap();
            index.fold(&batch(3, vec![add(4, "c", 13, "soft")], false)).unwrap();
        }

        let index = MemoryIndex::open(dir.path()).unwrap();
        assert_eq!(
            index.recovered(),
            RecoveredState {
                generation: 2,
                through_sequence: 3,
                max_version: 12,
            }
        );
        assert!(index.fetch_by_id(&"a".into(), 2).unwrap().is_some());
        assert_eq!(
            index.version_of(&"b".into(), 2).unwrap(),
            Some(Version::tombstone(12))
        );
        assert_eq!(index.version_of(&"c".into(), 2).unwrap(), None);
    }
}
