//! Leader Ordering Tests
//!
//! A replica applies leader-stamped operations idempotently: anything not
//! newer than the current version is ignored without effect, and local
//! versions issued afterwards stay above every version the leader sent.

use rtstore::{
    ApplyError, ApplyOutcome, DocumentId, DocumentStore, Fields, Mode, Operation, StoreConfig,
    Version,
};
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

fn open_store(dir: &TempDir) -> DocumentStore {
    DocumentStore::open_default(StoreConfig::new(dir.path()).with_sync_on_append(false))
        .expect("Failed to open store")
}

fn payload(n: i64) -> Fields {
    serde_json::from_value(json!({ "n": n })).unwrap()
}

fn leader(magnitude: i64) -> Mode {
    Mode::Leader(Version::new(magnitude))
}

// =============================================================================
// Reordered Delivery
// =============================================================================

/// An older add delivered after a newer one changes nothing.
#[test]
fn test_older_leader_add_is_ignored() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let id = DocumentId::from("1");

    let base = 1_000;
    let outcome = store
        .apply(Operation::add("1", payload(10)), leader(base + 10))
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::Accepted(Version::new(base + 10)));

    let outcome = store
        .apply(Operation::add("1", payload(9)), leader(base + 9))
        .unwrap();
    assert_eq!(
        outcome,
        ApplyOutcome::Ignored {
            current: Some(Version::new(base + 10))
        }
    );

    let doc = store.get_by_id(&id).unwrap().unwrap();
    assert_eq!(doc.version, Version::new(base + 10));
    assert_eq!(doc.fields["n"], json!(10));
    assert_eq!(store.metrics().ignored, 1);
}

#[test]
fn test_duplicate_delivery_is_ignored() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    store.apply(Operation::add("1", payload(1)), leader(50)).unwrap();
    let again = store.apply(Operation::add("1", payload(1)), leader(50)).unwrap();
    assert!(again.is_ignored());
    assert_eq!(store.last_sequence(), 1);
}

#[test]
fn test_stale_delete_does_not_remove_newer_add() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let id = DocumentId::from("1");

    store.apply(Operation::add("1", payload(1)), leader(20)).unwrap();
    // Leader deletes carry negative versions; only the magnitude orders
    let outcome = store.apply(Operation::delete("1"), leader(-15)).unwrap();
    assert!(outcome.is_ignored());
    assert!(store.get_by_id(&id).unwrap().is_some());
}

#[test]
fn test_newer_delete_then_older_add() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let id = DocumentId::from("1");

    store.apply(Operation::add("1", payload(1)), leader(10)).unwrap();
    let deleted = store.apply(Operation::delete("1"), leader(-30)).unwrap();
    assert_eq!(deleted, ApplyOutcome::Accepted(Version::tombstone(30)));

    let outcome = store.apply(Operation::add("1", payload(2)), leader(20)).unwrap();
    assert_eq!(
        outcome,
        ApplyOutcome::Ignored {
            current: Some(Version::tombstone(30))
        }
    );
    assert!(store.get_by_id(&id).unwrap().is_none());
}

/// Ordering survives a commit: the stale check falls back to the snapshot.
#[test]
fn test_ordering_against_committed_version() {
    let dir = TempDir::new().unwrap();
    let id = DocumentId::from("1");
    {
        let store = open_store(&dir);
        store.apply(Operation::add("1", payload(1)), leader(40)).unwrap();
        store.commit(true).unwrap();
    }

    let store = open_store(&dir);
    assert!(store.version_entry(&id).is_none());
    let outcome = store.apply(Operation::add("1", payload(2)), leader(39)).unwrap();
    assert_eq!(
        outcome,
        ApplyOutcome::Ignored {
            current: Some(Version::new(40))
        }
    );
}

// =============================================================================
// Clock Interaction
// =============================================================================

#[test]
fn test_local_versions_stay_above_leader_versions() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let far_future = i64::MAX / 4;
    store.apply(Operation::add("1", payload(1)), leader(far_future)).unwrap();
    let local = store
        .apply(Operation::add("2", payload(2)), Mode::Local)
        .unwrap()
        .version()
        .unwrap();
    assert!(local.magnitude() > far_future as u64);
}

#[test]
fn test_zero_leader_version_is_invalid() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let err = store.apply(Operation::add("1", payload(1)), leader(0)).unwrap_err();
    assert!(matches!(err, ApplyError::InvalidRequest(_)));
    assert_eq!(err.status_code(), 400);
}

// =============================================================================
// Version Range Edges
// =============================================================================

/// `i64::MIN` has no live form, so a leader cannot stamp anything with it.
#[test]
fn test_min_leader_version_is_invalid() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let err = store
        .apply(Operation::add("a", payload(1)), leader(i64::MIN))
        .unwrap_err();
    assert!(matches!(err, ApplyError::InvalidRequest(_)));

    let err = store
        .apply(
            Operation::delete_by_query(rtstore::Query::All),
            leader(i64::MIN),
        )
        .unwrap_err();
    assert!(matches!(err, ApplyError::InvalidRequest(_)));

    assert!(store.version_entry(&DocumentId::from("a")).is_none());
    assert!(!store.is_halted());
}

#[test]
fn test_max_leader_version_is_stored_live() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let outcome = store
        .apply(Operation::add("a", payload(1)), leader(i64::MAX))
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::Accepted(Version::new(i64::MAX)));

    let doc = store.get_by_id(&DocumentId::from("a")).unwrap().unwrap();
    assert_eq!(doc.version, Version::new(i64::MAX));
    assert!(!doc.version.is_tombstone());
}

/// Once the leader used the last version, no local version can supersede
/// it. The store refuses instead of wrapping into a tombstone.
#[test]
fn test_local_write_after_last_version_halts() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    store
        .apply(Operation::add("a", payload(1)), leader(i64::MAX))
        .unwrap();

    let err = store
        .apply(Operation::add("b", payload(2)), Mode::Local)
        .unwrap_err();
    assert!(matches!(err, ApplyError::InvariantViolation(_)));
    assert!(err.is_fatal());
    assert!(store.is_halted());
    assert!(store.get_by_id(&DocumentId::from("b")).unwrap().is_none());

    let err = store
        .apply(Operation::add("c", payload(3)), Mode::Local)
        .unwrap_err();
    assert!(matches!(err, ApplyError::Halted));
}
