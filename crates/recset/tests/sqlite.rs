//! The store over SQLite, and the backend contract shared by both backends.

use std::collections::HashSet;
use std::sync::Arc;

use recset::backend::{Backend, BackendError, KeyType, MemoryBackend, SqliteBackend, SCAN_START};
use recset::{BackendConfig, Options, Query, Record};
use recset_testkit::{init_tracing, Note, TestFixture};
use serde_json::json;

/// Behavior every backend must share.
async fn backend_contract(backend: &dyn Backend) {
    // Documents
    backend
        .document_set("note:a", &json!({"id": "a", "title": "x"}))
        .await
        .unwrap();
    backend
        .document_patch("note:a", "$.deletedAt", &json!(7))
        .await
        .unwrap();
    assert_eq!(
        backend.document_get("note:a").await.unwrap(),
        Some(json!({"id": "a", "title": "x", "deletedAt": 7}))
    );
    assert!(matches!(
        backend.document_patch("note:zz", "$.deletedAt", &json!(7)).await,
        Err(BackendError::NotFound(_))
    ));

    // Ordered sets: ranks, reverse, negative indexes
    for (score, member) in [(3, "c"), (1, "a"), (2, "b"), (4, "d")] {
        backend.ordered_set_add("notes", score, member).await.unwrap();
    }
    assert_eq!(
        backend.ordered_set_range("notes", 0, -1, true).await.unwrap(),
        vec!["d", "c", "b", "a"]
    );
    assert_eq!(
        backend.ordered_set_range("notes", 1, 2, false).await.unwrap(),
        vec!["b", "c"]
    );
    assert!(backend.ordered_set_range("notes", 9, 12, true).await.unwrap().is_empty());
    assert!(backend.ordered_set_remove("notes", "a").await.unwrap());
    assert!(!backend.ordered_set_remove("notes", "a").await.unwrap());

    // Scan walks to the sentinel and sees only documents
    for i in 0..25 {
        backend
            .document_set(&format!("note:s{i}"), &json!({"id": format!("s{i}")}))
            .await
            .unwrap();
    }
    let mut cursor = SCAN_START.to_string();
    let mut seen = HashSet::new();
    loop {
        let (next, keys) = backend
            .scan_keys(&cursor, "note:s*", KeyType::Json, 7)
            .await
            .unwrap();
        seen.extend(keys);
        if next == SCAN_START {
            break;
        }
        cursor = next;
    }
    assert_eq!(seen.len(), 25);

    // Expiry
    backend.set_expiry("note:a", 0).await.unwrap();
    assert!(!backend.key_exists("note:a").await.unwrap());
    assert!(backend.document_get("note:a").await.unwrap().is_none());

    // Multi-get alignment
    let got = backend
        .multi_document_get(&["note:s1".to_string(), "note:none".to_string(), "note:s2".to_string()])
        .await
        .unwrap();
    assert!(got[0].is_some() && got[1].is_none() && got[2].is_some());
}

#[tokio::test]
async fn memory_backend_meets_contract() {
    backend_contract(&MemoryBackend::new()).await;
}

#[tokio::test]
async fn sqlite_backend_meets_contract() {
    backend_contract(&SqliteBackend::open_memory().unwrap()).await;
}

#[tokio::test]
async fn store_over_sqlite() {
    init_tracing();
    let backend: Arc<dyn Backend> = BackendConfig::new("sqlite::memory:").connect().unwrap();
    let fixture = TestFixture::with_backend(backend);

    let notes = fixture.seed("u1", 4).await;
    let other = fixture.create(Note::new("x", "u2").category("c1")).await;

    let found = fixture.store.find(&Query::all().filter("user", "u1")).await.unwrap();
    let ids: Vec<&str> = found.iter().map(|n| n.id()).collect();
    let expected: Vec<&str> = notes.iter().rev().map(|n| n.id()).collect();
    assert_eq!(ids, expected);

    fixture.store.delete(other.id(), &Options::new()).await.unwrap();
    assert!(fixture.store.get(other.id(), &Options::new()).await.unwrap().is_none());
    assert!(fixture.members("notes:category:c1").await.is_empty());

    let scanned = fixture.store.ids(&Query::scan("*").count(3)).await.unwrap();
    assert_eq!(scanned.len(), 3);
}

#[tokio::test]
async fn sqlite_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.db");

    let created = {
        let fixture = TestFixture::with_backend(Arc::new(SqliteBackend::open(&path).unwrap()));
        fixture.create(Note::new("kept", "u1").category("c1")).await
    };

    let fixture = TestFixture::with_backend(Arc::new(SqliteBackend::open(&path).unwrap()));
    let fetched = fixture
        .store
        .get(created.id(), &Options::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched, created);

    let found = fixture
        .store
        .find(&Query::all().filter("category", "c1"))
        .await
        .unwrap();
    assert_eq!(found, vec![created]);
}
