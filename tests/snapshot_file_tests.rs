//! Integration tests for JSON snapshot files

use cim_metadata::{MemoryStore, MetadataStore, SnapshotFile, StorageError};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;

#[tokio::test]
async fn test_round_trip() {
    let dir = TempDir::new().unwrap();
    let snapshot = SnapshotFile::new(dir.path().join("metadata.json"));

    let store = MemoryStore::<String>::new();
    store.set("foo", "foo".to_string()).await.unwrap();
    snapshot.save(&store).await.unwrap();

    let loaded = snapshot.load::<String>().await.unwrap().unwrap();
    assert_eq!(loaded.get("foo").await.unwrap(), Some("foo".to_string()));
    assert_eq!(loaded.len().await, 1);
}

#[tokio::test]
async fn test_file_format_is_array_of_pairs() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metadata.json");
    let snapshot = SnapshotFile::new(&path);

    let store = MemoryStore::<String>::new();
    store.set("foo", "foo".to_string()).await.unwrap();
    snapshot.save(&store).await.unwrap();

    let written: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(written, json!([["foo", "foo"]]));
}

#[tokio::test]
async fn test_missing_file_loads_nothing() {
    let dir = TempDir::new().unwrap();
    let snapshot = SnapshotFile::new(dir.path().join("absent.json"));

    assert!(snapshot.load::<Value>().await.unwrap().is_none());
}

#[tokio::test]
async fn test_insertion_order_survives_reload() {
    let dir = TempDir::new().unwrap();
    let snapshot = SnapshotFile::new(dir.path().join("nested/dir/metadata.json"));

    let store = MemoryStore::<Value>::new();
    store.set("schema:Order", json!({"title": "Order"})).await.unwrap();
    store.set("schema:Invoice", json!({"title": "Invoice"})).await.unwrap();
    store.set("route:Order", json!({"path": "/orders"})).await.unwrap();
    snapshot.save(&store).await.unwrap();

    let loaded = snapshot.load::<Value>().await.unwrap().unwrap();
    let keys: Vec<String> = loaded.entries().await.into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["schema:Order", "schema:Invoice", "route:Order"]);
}

#[tokio::test]
async fn test_save_replaces_previous_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metadata.json");
    let snapshot = SnapshotFile::new(&path);

    let store = MemoryStore::<Value>::new();
    store.set("a", json!(1)).await.unwrap();
    snapshot.save(&store).await.unwrap();

    let replacement = MemoryStore::<Value>::new();
    replacement.set("b", json!(2)).await.unwrap();
    snapshot.save(&replacement).await.unwrap();

    let loaded = snapshot.load::<Value>().await.unwrap().unwrap();
    assert_eq!(loaded.entries().await, vec![("b".to_string(), json!(2))]);
    assert_eq!(file_names(&dir), vec!["metadata.json".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_saves_to_one_path() {
    let dir = TempDir::new().unwrap();
    let snapshot = SnapshotFile::new(dir.path().join("metadata.json"));

    let store = MemoryStore::<Value>::new();
    for i in 0..500 {
        store
            .set(&format!("schema:Type{i}"), json!({"index": i, "tags": ["a", "b"]}))
            .await
            .unwrap();
    }

    for _ in 0..5 {
        let saves: Vec<_> = (0..8)
            .map(|_| {
                let snapshot = snapshot.clone();
                let store = store.clone();
                tokio::spawn(async move { snapshot.save(&store).await })
            })
            .collect();

        for save in saves {
            save.await.unwrap().unwrap();
        }

        let loaded = snapshot.load::<Value>().await.unwrap().unwrap();
        assert_eq!(loaded.len().await, 500);
    }

    assert_eq!(file_names(&dir), vec!["metadata.json".to_string()]);
}

fn file_names(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_corrupt_snapshot_is_serialization_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metadata.json");
    std::fs::write(&path, b"{not json").unwrap();

    let err = SnapshotFile::new(&path).load::<Value>().await.unwrap_err();
    assert!(matches!(err, StorageError::Serialization(_)));
}
