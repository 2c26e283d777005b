//! Error handling and edge case tests.

use async_trait::async_trait;
use recipe_store::{
    schema, Database, Hash, Recipe, RecipeInput, RecipeStore, RecordId, RemoteMirror,
    StoreConfig, StoreError, WriteMode,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tempfile::TempDir;

fn config(dir: &TempDir) -> StoreConfig {
    StoreConfig {
        path: dir.path().join("recipes"),
        blob_cache_size: 16,
        ..Default::default()
    }
}

/// Mirror whose remote end is always unreachable.
struct UnreachableMirror;

#[async_trait]
impl RemoteMirror for UnreachableMirror {
    async fn create(&self, _recipe: &Recipe) -> recipe_store::Result<()> {
        Err(StoreError::Mirror("connection refused".into()))
    }

    async fn delete(&self, _id: RecordId) -> recipe_store::Result<()> {
        Err(StoreError::Mirror("connection refused".into()))
    }
}

// --- Not-open Errors ---

#[tokio::test]
async fn test_get_all_before_open() {
    let dir = TempDir::new().unwrap();
    let store = RecipeStore::offline(config(&dir));

    let result = store.get_all_items().await;
    assert!(matches!(result, Err(StoreError::NotOpen)));
    assert_eq!(StoreError::NotOpen.to_string(), "Database is not open");
}

#[tokio::test]
async fn test_writes_before_open() {
    let dir = TempDir::new().unwrap();
    let store = RecipeStore::offline(config(&dir));

    let added = store.add_item("Soup", "Hot soup", b"img".to_vec()).await;
    assert!(matches!(added, Err(StoreError::NotOpen)));

    let deleted = store.delete_item(RecordId(1)).await;
    assert!(matches!(deleted, Err(StoreError::NotOpen)));

    // Nothing was written by the rejected calls.
    store.open().await.unwrap();
    assert!(store.get_all_items().await.unwrap().is_empty());
}

// --- Write-mode Errors ---

#[tokio::test]
async fn test_insert_duplicate_key() {
    let dir = TempDir::new().unwrap();
    let store = RecipeStore::offline(config(&dir));
    store.open().await.unwrap();

    let id = RecordId(7);
    store
        .add_item_with_mode(
            RecipeInput::new("Soup", "Hot", b"first".to_vec()).with_id(id),
            WriteMode::Insert,
        )
        .await
        .unwrap();

    let result = store
        .add_item_with_mode(
            RecipeInput::new("Stew", "Thick", b"second".to_vec()).with_id(id),
            WriteMode::Insert,
        )
        .await;
    assert!(matches!(result, Err(StoreError::DuplicateKey(dup)) if dup == id));

    // The first write is untouched.
    let item = store.get_item(id).await.unwrap().unwrap();
    assert_eq!(item.recipe.title, "Soup");
    assert_eq!(store.count().unwrap(), 1);
}

// --- Mirror Errors ---

#[tokio::test]
async fn test_mirror_failure_keeps_local_write() {
    let dir = TempDir::new().unwrap();
    let store = RecipeStore::new(config(&dir), UnreachableMirror);
    store.open().await.unwrap();

    let result = store.add_item("Soup", "Hot soup", b"img".to_vec()).await;
    assert!(matches!(result, Err(StoreError::Mirror(_))));

    let items = store.get_all_items().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].recipe.title, "Soup");
}

#[tokio::test]
async fn test_mirror_failure_keeps_local_delete() {
    let dir = TempDir::new().unwrap();
    let store = RecipeStore::new(config(&dir), UnreachableMirror);
    store.open().await.unwrap();

    let _ = store.add_item("Soup", "Hot soup", b"img".to_vec()).await;
    let id = store.get_all_items().await.unwrap()[0].recipe.id;

    let result = store.delete_item(id).await;
    assert!(matches!(result, Err(StoreError::Mirror(_))));
    assert!(store.get_all_items().await.unwrap().is_empty());
}

// --- Open Errors ---

#[test]
fn test_open_nonexistent_store() {
    let dir = TempDir::new().unwrap();

    let result = Database::open(&StoreConfig {
        create_if_missing: false,
        ..config(&dir)
    });

    assert!(matches!(result, Err(StoreError::NotInitialized)));
}

#[test]
fn test_concurrent_store_access() {
    let dir = TempDir::new().unwrap();

    let _db = Database::open(&config(&dir)).unwrap();

    // Second handle should fail with lock error
    let result = Database::open(&config(&dir));
    assert!(matches!(result, Err(StoreError::Locked)));
}

#[test]
fn test_open_with_older_version() {
    let dir = TempDir::new().unwrap();

    drop(Database::open(&config(&dir)).unwrap());

    // Simulate a database written by a newer build.
    let path = dir.path().join("recipes");
    let mut schema = schema::read_manifest(&path).unwrap();
    schema.version = 2;
    schema::write_manifest(&path, &schema).unwrap();

    let result = Database::open(&config(&dir));
    assert!(matches!(
        result,
        Err(StoreError::VersionTooNew {
            requested: 1,
            current: 2
        })
    ));
}

#[test]
fn test_open_with_unsupported_version() {
    let dir = TempDir::new().unwrap();

    let result = Database::open(&StoreConfig {
        version: 2,
        ..config(&dir)
    });
    assert!(matches!(result, Err(StoreError::UnsupportedVersion(2))));

    // Nothing was upgraded on disk.
    let db = Database::open(&config(&dir)).unwrap();
    assert_eq!(db.version(), 1);
}

#[test]
fn test_open_with_other_name() {
    let dir = TempDir::new().unwrap();

    drop(Database::open(&config(&dir)).unwrap());

    let result = Database::open(&StoreConfig {
        name: "pantry".to_string(),
        ..config(&dir)
    });
    assert!(matches!(result, Err(StoreError::InvalidFormat(_))));
}

#[test]
fn test_corrupted_manifest() {
    let dir = TempDir::new().unwrap();

    drop(Database::open(&config(&dir)).unwrap());
    std::fs::write(dir.path().join("recipes").join("MANIFEST"), b"garbage").unwrap();

    let result = Database::open(&config(&dir));
    assert!(result.is_err());
}

// --- Record Errors ---

#[test]
fn test_get_nonexistent_record() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(&config(&dir)).unwrap();

    assert!(db.get(RecordId(999)).unwrap().is_none());
    assert!(!db.delete(RecordId(999)).unwrap());
}

#[test]
fn test_missing_image_blob() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(&config(&dir)).unwrap();

    let recipe = db
        .put(RecipeInput::new("Soup", "", b"img".to_vec()), WriteMode::Upsert)
        .unwrap();
    drop(db);

    std::fs::remove_dir_all(dir.path().join("recipes").join("blobs")).unwrap();

    let db = Database::open(&config(&dir)).unwrap();
    let result = db.get(recipe.id);
    assert!(matches!(result, Err(StoreError::BlobNotFound(_))));
}

#[test]
fn test_damaged_image_file_is_repaired_on_put() {
    let dir = TempDir::new().unwrap();
    let image = b"image torn by a crash".to_vec();

    // A crash left only the header of this image's file behind.
    drop(Database::open(&config(&dir)).unwrap());
    let hash = Hash::from_bytes(&image);
    let shard = dir.path().join("recipes").join("blobs").join(hash.shard_prefix());
    std::fs::create_dir_all(&shard).unwrap();
    std::fs::write(shard.join(hash.to_hex()), b"IMG\0\x01").unwrap();

    let db = Database::open(&config(&dir)).unwrap();
    let recipe = db
        .put(RecipeInput::new("Soup", "Hot soup", image.clone()), WriteMode::Upsert)
        .unwrap();
    drop(db);

    let db = Database::open(&config(&dir)).unwrap();
    let all = db.get_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, recipe.id);
    assert_eq!(all[0].image, image);
}

// --- Concurrent Transactions ---

#[test]
fn test_reads_during_deletes_and_upserts() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(&StoreConfig {
        blob_cache_size: 1,
        ..config(&dir)
    })
    .unwrap();

    let pinned = db
        .put(RecipeInput::new("Bread", "Crusty", b"bread-0".to_vec()), WriteMode::Upsert)
        .unwrap();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            let written = (0..200u32).try_for_each(|i| -> recipe_store::Result<()> {
                let image = format!("soup-{i}").into_bytes();
                let soup = db.put(RecipeInput::new("Soup", "Hot", image), WriteMode::Upsert)?;
                db.delete(soup.id)?;

                // Replacing the image drops the previous image file.
                let image = format!("bread-{}", i + 1).into_bytes();
                db.put(
                    RecipeInput::new("Bread", "Crusty", image).with_id(pinned.id),
                    WriteMode::Upsert,
                )?;
                Ok(())
            });
            done.store(true, Ordering::SeqCst);
            written.unwrap();
        });

        s.spawn(|| {
            while !done.load(Ordering::SeqCst) {
                let all = db.get_all().unwrap();
                assert!(all.iter().any(|recipe| recipe.id == pinned.id));
                assert!(db.get(pinned.id).unwrap().is_some());
            }
        });
    });

    let all = db.get_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].image, b"bread-200");
}
