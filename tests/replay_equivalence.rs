//! Replay Equivalence Property Tests
//!
//! A replica receiving leader-stamped operations in any order ends up
//! showing the same documents as one that received them in version order.
//!
//! Each id's predicate membership is fixed (even ids are red), so a
//! delete-by-query selects the same ids whenever it is evaluated.
//!
//! Soft and durable commits are interleaved with delivery; durable ones
//! compact the update log, so the reopened store is rebuilt from a
//! checkpoint plus whatever the compacted log kept.

use proptest::prelude::*;
use rtstore::{
    Document, DocumentId, DocumentStore, Fields, Mode, Operation, Query, StoreConfig, Version,
};
use serde_json::json;
use tempfile::TempDir;

const IDS: u8 = 6;

// =============================================================================
// Strategies
// =============================================================================

#[derive(Debug, Clone)]
enum Step {
    Add(u8),
    Delete(u8),
    DeleteRed,
    DeleteIds(Vec<u8>),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (0..IDS).prop_map(Step::Add),
        2 => (0..IDS).prop_map(Step::Delete),
        1 => Just(Step::DeleteRed),
        1 => prop::collection::vec(0..IDS, 1..4).prop_map(Step::DeleteIds),
    ]
}

/// Commit after a step: `None`, soft (`Some(false)`) or durable (`Some(true)`).
fn commit_strategy() -> impl Strategy<Value = Option<bool>> {
    prop_oneof![
        7 => Just(None),
        2 => Just(Some(false)),
        1 => Just(Some(true)),
    ]
}

/// Version-stamped steps, once in version order and once shuffled, with a
/// commit choice per shuffled step.
fn history_strategy(
) -> impl Strategy<Value = (Vec<(i64, Step)>, Vec<((i64, Step), Option<bool>)>)> {
    prop::collection::vec(step_strategy(), 1..40).prop_flat_map(|steps| {
        let stamped: Vec<(i64, Step)> = steps
            .into_iter()
            .enumerate()
            .map(|(i, step)| ((i as i64 + 1) * 10, step))
            .collect();
        let len = stamped.len();
        (
            Just(stamped.clone()),
            (
                Just(stamped).prop_shuffle(),
                prop::collection::vec(commit_strategy(), len),
            )
                .prop_map(|(shuffled, commits)| shuffled.into_iter().zip(commits).collect()),
        )
    })
}

// =============================================================================
// Test Utilities
// =============================================================================

fn open_store(dir: &TempDir) -> DocumentStore {
    DocumentStore::open_default(StoreConfig::new(dir.path()).with_sync_on_append(false))
        .expect("Failed to open store")
}

fn color(id: u8) -> &'static str {
    if id % 2 == 0 {
        "red"
    } else {
        "blue"
    }
}

fn apply(store: &DocumentStore, version: i64, step: &Step) {
    let (operation, mode) = match step {
        Step::Add(id) => {
            let fields: Fields =
                serde_json::from_value(json!({ "color": color(*id), "stamp": version })).unwrap();
            (
                Operation::add(DocumentId::from(*id as u64), fields),
                Mode::Leader(Version::new(version)),
            )
        }
        Step::Delete(id) => (
            Operation::delete(DocumentId::from(*id as u64)),
            Mode::Leader(Version::new(-version)),
        ),
        Step::DeleteRed => (
            Operation::delete_by_query(Query::term("color", "red")),
            Mode::Leader(Version::new(-version)),
        ),
        Step::DeleteIds(ids) => (
            Operation::delete_by_query(Query::ids(ids.iter().map(|id| *id as u64))),
            Mode::Leader(Version::new(-version)),
        ),
    };
    store
        .apply(operation, mode)
        .unwrap_or_else(|e| panic!("apply at {} failed: {}", version, e));
}

fn visible(store: &DocumentStore) -> Vec<Option<Document>> {
    (0..IDS)
        .map(|id| store.get_by_id(&DocumentId::from(id as u64)).unwrap())
        .collect()
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_shuffled_delivery_matches_ordered_delivery(
        (ordered, shuffled) in history_strategy()
    ) {
        let ordered_dir = TempDir::new().unwrap();
        let ordered_store = open_store(&ordered_dir);
        for (version, step) in &ordered {
            apply(&ordered_store, *version, step);
        }

        let shuffled_dir = TempDir::new().unwrap();
        let shuffled_store = open_store(&shuffled_dir);
        for ((version, step), commit) in &shuffled {
            apply(&shuffled_store, *version, step);
            if let Some(durable) = commit {
                shuffled_store.commit(*durable).unwrap();
            }
        }

        let expected = visible(&ordered_store);
        prop_assert_eq!(&visible(&shuffled_store), &expected);

        // Recovery rebuilds the same view from the checkpoint and the
        // compacted log
        shuffled_store.commit(true).unwrap();
        drop(shuffled_store);
        let reopened = open_store(&shuffled_dir);
        prop_assert_eq!(&visible(&reopened), &expected);
    }

    #[test]
    fn prop_accepted_versions_never_decrease(
        (_, shuffled) in history_strategy()
    ) {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let mut last = vec![0u64; IDS as usize];

        for ((version, step), commit) in &shuffled {
            apply(&store, *version, step);
            if let Some(durable) = commit {
                store.commit(*durable).unwrap();
            }
            for id in 0..IDS {
                let current = store
                    .version_entry(&DocumentId::from(id as u64))
                    .map(|e| e.version.magnitude())
                    .or_else(|| {
                        store
                            .get_committed(&DocumentId::from(id as u64))
                            .unwrap()
                            .map(|d| d.version.magnitude())
                    });
                if let Some(magnitude) = current {
                    prop_assert!(magnitude >= last[id as usize]);
                    last[id as usize] = magnitude;
                }
            }
        }
    }
}
