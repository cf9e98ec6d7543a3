//! Local file provider integration tests
//!
//! Covers the startup reconciliation table and JSON write-through.

use std::fs;
use std::sync::Arc;

use colony_sync::codec::json;
use colony_sync::provider::local::{CSV_FILE, JSON_FILE};
use colony_sync::{Colony, ColonyProvider, ColonySet, LocalStoreProvider, TaskPool};
use parking_lot::Mutex;
use tempfile::TempDir;

fn read_json(dir: &TempDir) -> ColonySet {
    let text = fs::read_to_string(dir.path().join(JSON_FILE)).unwrap();
    json::decode_envelope(&text).unwrap()
}

// =============================================================================
// Startup reconciliation
// =============================================================================

#[tokio::test]
async fn test_csv_only_creates_json() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(CSV_FILE), "1,10,20,A,,\n").unwrap();

    let pool = TaskPool::current(4).unwrap();
    let provider = LocalStoreProvider::open(dir.path(), pool.clone());

    let colonies = provider.colonies();
    assert_eq!(colonies.len(), 1);
    let colony = colonies.get(1).unwrap();
    assert_eq!((colony.x(), colony.y()), (10.0, 20.0));
    assert!(colony.is_active());

    // written synchronously by open
    assert!(provider.json_path().exists());
    assert_eq!(read_json(&dir), *colonies);
    pool.shutdown().await;
}

#[tokio::test]
async fn test_json_overrides_csv() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(CSV_FILE), "4,1,1,A,,\n5,30,40, ,,\n").unwrap();
    fs::write(
        dir.path().join(JSON_FILE),
        r#"{"colonies":[{"id":5,"x":30.0,"y":40.0,"active":true,"visited":true,"modified":"2024-06-01T10:00:00Z"},
                        {"id":6,"x":2.0,"y":2.0,"active":false,"visited":false,"modified":null}]}"#,
    )
    .unwrap();

    let pool = TaskPool::current(4).unwrap();
    let provider = LocalStoreProvider::open(dir.path(), pool.clone());

    let colonies = provider.colonies();
    let ids: Vec<i32> = colonies.ids().collect();
    assert_eq!(ids, vec![4, 5, 6]);
    let merged = colonies.get(5).unwrap();
    assert!(merged.is_active());
    assert!(merged.is_visited());
    assert!(merged.modified_at().is_some());

    let on_disk = read_json(&dir);
    assert_eq!(on_disk.len(), 3);
    assert!(on_disk.get(5).unwrap().is_visited());
    pool.shutdown().await;
}

#[tokio::test]
async fn test_json_only() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(JSON_FILE),
        r#"{"colonies":[{"id":2,"x":5.0,"y":6.0,"active":true}]}"#,
    )
    .unwrap();

    let pool = TaskPool::current(4).unwrap();
    let provider = LocalStoreProvider::open(dir.path(), pool.clone());
    assert_eq!(provider.colonies().len(), 1);
    assert!(!provider.csv_path().exists());
    pool.shutdown().await;
}

#[tokio::test]
async fn test_missing_directory_is_created_empty() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("nested").join("data");

    let pool = TaskPool::current(4).unwrap();
    let provider = LocalStoreProvider::open(&data_dir, pool.clone());

    assert!(data_dir.is_dir());
    assert!(provider.colonies().is_empty());
    pool.shutdown().await;
}

// =============================================================================
// Write-through
// =============================================================================

#[tokio::test]
async fn test_update_colony_is_visible_then_persisted() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(CSV_FILE), "1,10,20,A,,\n2,30,40,A,,\n").unwrap();

    let pool = TaskPool::current(4).unwrap();
    let provider = LocalStoreProvider::open(dir.path(), pool.clone());

    let mut colony = provider.colonies().get(2).unwrap().clone();
    colony.set_visited(true);
    provider.update_colony(colony);

    // visible before the write lands
    assert!(provider.colonies().get(2).unwrap().is_visited());

    pool.drain().await;
    let on_disk = read_json(&dir);
    assert!(on_disk.get(2).unwrap().is_visited());
    assert!(on_disk.get(2).unwrap().modified_at().is_some());

    // the CSV import is never rewritten
    assert_eq!(
        fs::read_to_string(dir.path().join(CSV_FILE)).unwrap(),
        "1,10,20,A,,\n2,30,40,A,,\n"
    );
    pool.shutdown().await;
}

#[tokio::test]
async fn test_many_updates_leave_latest_snapshot_on_disk() {
    let dir = TempDir::new().unwrap();
    let pool = TaskPool::current(8).unwrap();
    let provider = LocalStoreProvider::open(dir.path(), pool.clone());

    for id in 0..50 {
        provider.update_colony(Colony::new(id, id as f64, 0.0, true));
    }
    pool.drain().await;
    provider.persist().await.unwrap();

    assert_eq!(read_json(&dir).len(), 50);
    assert!(!dir.path().join("colonies.json.tmp").exists());
    pool.shutdown().await;
}

#[tokio::test]
async fn test_listeners_see_replace_and_merge_in() {
    let dir = TempDir::new().unwrap();
    let pool = TaskPool::current(4).unwrap();
    let provider = LocalStoreProvider::open(dir.path(), pool.clone());

    let sizes = Arc::new(Mutex::new(Vec::new()));
    let sink = sizes.clone();
    provider
        .hub()
        .add_listener(Arc::new(move |colonies: &Arc<ColonySet>| sink.lock().push(colonies.len())));

    provider.replace((1..=3).map(|id| Colony::new(id, 0.0, 0.0, true)).collect());
    provider.merge_in(&(3..=5).map(|id| Colony::new(id, 1.0, 1.0, false)).collect());

    assert_eq!(*sizes.lock(), vec![3, 5]);
    assert!(!provider.colonies().get(3).unwrap().is_active());

    pool.drain().await;
    assert_eq!(read_json(&dir).len(), 5);
    pool.shutdown().await;
}

#[tokio::test]
async fn test_csv_with_invalid_byte_loads_remaining_rows() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(CSV_FILE),
        b"1,10,20,A,,\n2,\xff,30,A,,\n3,5,5, ,,\n".as_slice(),
    )
    .unwrap();

    let pool = TaskPool::current(4).unwrap();
    let provider = LocalStoreProvider::open(dir.path(), pool.clone());

    let ids: Vec<i32> = provider.colonies().ids().collect();
    assert_eq!(ids, vec![1, 3]);
    pool.shutdown().await;
}
