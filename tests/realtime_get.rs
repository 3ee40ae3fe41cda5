//! Real-time Get Tests
//!
//! Every acknowledged operation is visible to `get_by_id` immediately,
//! before any commit, and stays visible across soft and hard commits.

use rtstore::{
    ApplyOutcome, DocumentId, DocumentStore, Fields, Mode, Operation, StoreConfig, Version,
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

fn payload(title: &str) -> Fields {
    serde_json::from_value(json!({ "title": title })).unwrap()
}

fn accepted(outcome: ApplyOutcome) -> Version {
    match outcome {
        ApplyOutcome::Accepted(version) => version,
        other => panic!("expected accepted, got {:?}", other),
    }
}

// =============================================================================
// Visibility Before Commit
// =============================================================================

/// Create-if-absent, read back, commit durably, read back again.
#[test]
fn test_created_document_visible_before_and_after_hard_commit() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let id = DocumentId::from("1");

    let v1 = accepted(
        store
            .apply(
                Operation::add("1", payload("p1")),
                Mode::Optimistic(Version::MUST_NOT_EXIST),
            )
            .unwrap(),
    );
    assert!(!v1.is_tombstone());

    let doc = store.get_by_id(&id).unwrap().expect("visible before commit");
    assert_eq!(doc.version, v1);
    assert_eq!(doc.fields["title"], json!("p1"));

    store.commit(true).unwrap();

    let doc = store.get_by_id(&id).unwrap().expect("visible after commit");
    assert_eq!(doc.version, v1);
    assert_eq!(doc.fields["title"], json!("p1"));
}

#[test]
fn test_delete_hides_document_before_commit() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let id = DocumentId::from("a");

    store.apply(Operation::add("a", payload("x")), Mode::Local).unwrap();
    store.commit(false).unwrap();
    let deleted = accepted(store.apply(Operation::delete("a"), Mode::Local).unwrap());

    assert!(deleted.is_tombstone());
    assert!(store.get_by_id(&id).unwrap().is_none());
    // The committed view still has it until the next commit
    assert!(store.get_committed(&id).unwrap().is_some());

    store.commit(false).unwrap();
    assert!(store.get_committed(&id).unwrap().is_none());
}

#[test]
fn test_replacement_is_visible_over_committed_version() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let id = DocumentId::from("a");

    store.apply(Operation::add("a", payload("old")), Mode::Local).unwrap();
    store.commit(false).unwrap();
    let v2 = accepted(store.apply(Operation::add("a", payload("new")), Mode::Local).unwrap());

    let doc = store.get_by_id(&id).unwrap().unwrap();
    assert_eq!(doc.version, v2);
    assert_eq!(doc.fields["title"], json!("new"));
    assert_eq!(
        store.get_committed(&id).unwrap().unwrap().fields["title"],
        json!("old")
    );
}

#[test]
fn test_versions_increase_per_document() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let mut last = 0;
    for i in 0..20 {
        let op = if i % 3 == 2 {
            Operation::delete("a")
        } else {
            Operation::add("a", payload("x"))
        };
        let version = accepted(store.apply(op, Mode::Local).unwrap());
        assert!(version.magnitude() > last);
        last = version.magnitude();
        if i % 5 == 4 {
            store.commit(false).unwrap();
        }
    }
}

// =============================================================================
// Read Paths
// =============================================================================

#[test]
fn test_buffer_and_snapshot_reads_are_counted() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let id = DocumentId::from("a");

    store.apply(Operation::add("a", payload("x")), Mode::Local).unwrap();
    store.get_by_id(&id).unwrap();
    store.commit(false).unwrap();
    store.get_by_id(&id).unwrap();

    let metrics = store.metrics();
    assert_eq!(metrics.rtg_buffer_hits, 1);
    assert_eq!(metrics.rtg_snapshot_hits, 1);
}

#[test]
fn test_get_many_mixes_buffered_and_committed() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    store.apply(Operation::add("committed", payload("c")), Mode::Local).unwrap();
    store.commit(true).unwrap();
    store.apply(Operation::add("buffered", payload("b")), Mode::Local).unwrap();
    store.apply(Operation::add("gone", payload("g")), Mode::Local).unwrap();
    store.apply(Operation::delete("gone"), Mode::Local).unwrap();

    let ids: Vec<DocumentId> = ["buffered", "gone", "committed"]
        .into_iter()
        .map(DocumentId::from)
        .collect();
    let titles: Vec<_> = store
        .get_many(&ids)
        .unwrap()
        .into_iter()
        .map(|d| d.fields["title"].clone())
        .collect();
    assert_eq!(titles, vec![json!("b"), json!("c")]);
}

// =============================================================================
// Field Projection
// =============================================================================

/// A projection on `id` alone returns just the id, buffered or committed,
/// and nothing once the document is gone.
#[test]
fn test_projected_get_follows_document_lifecycle() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let one = DocumentId::from("1");

    store.apply(Operation::add("1", payload("one")), Mode::Local).unwrap();
    let doc = store.get_projected(&one, &["id"]).unwrap().unwrap();
    assert_eq!(serde_json::Value::Object(doc.fields), json!({ "id": "1" }));

    store.commit(false).unwrap();
    let doc = store.get_projected(&one, &["id", "title"]).unwrap().unwrap();
    assert_eq!(
        serde_json::Value::Object(doc.fields),
        json!({ "id": "1", "title": "one" })
    );

    store.apply(Operation::delete("1"), Mode::Local).unwrap();
    assert!(store.get_projected(&one, &["id"]).unwrap().is_none());

    store.apply(Operation::add("10", payload("ten")), Mode::Local).unwrap();
    store.apply(Operation::add("11", payload("eleven")), Mode::Local).unwrap();
    store
        .apply(
            Operation::delete_by_query(rtstore::Query::ids(["10"])),
            Mode::Local,
        )
        .unwrap();
    assert!(store.get_projected(&DocumentId::from("10"), &["id"]).unwrap().is_none());
    let doc = store
        .get_projected(&DocumentId::from("11"), &["id"])
        .unwrap()
        .unwrap();
    assert_eq!(serde_json::Value::Object(doc.fields), json!({ "id": "11" }));
}
