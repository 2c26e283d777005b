//! HTTP mirror tests against an in-process mock of the recipes API.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, post};
use axum::Router;
use parking_lot::Mutex;
use recipe_store::{
    HttpMirror, MirrorConfig, RecipeStore, RecordId, StoreConfig, StoreError,
    MIRROR_IMAGE_CONTENT_TYPE,
};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Debug, Clone)]
struct Part {
    content_type: Option<String>,
    data: Vec<u8>,
}

#[derive(Debug, Clone)]
enum Received {
    Create(HashMap<String, Part>),
    Delete(u64),
}

#[derive(Clone)]
struct MockApi {
    received: Arc<Mutex<Vec<Received>>>,
    status: StatusCode,
}

async fn create_recipe(State(api): State<MockApi>, mut multipart: Multipart) -> StatusCode {
    let mut parts = HashMap::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.unwrap().to_vec();
        parts.insert(name, Part { content_type, data });
    }
    api.received.lock().push(Received::Create(parts));
    api.status
}

async fn delete_recipe(State(api): State<MockApi>, Path(id): Path<u64>) -> StatusCode {
    api.received.lock().push(Received::Delete(id));
    api.status
}

/// Start the mock API and return its base URL and request log.
async fn spawn_mock_api(status: StatusCode) -> (String, Arc<Mutex<Vec<Received>>>) {
    let api = MockApi {
        received: Arc::new(Mutex::new(Vec::new())),
        status,
    };
    let received = api.received.clone();

    let app = Router::new()
        .route("/recipes", post(create_recipe))
        .route("/recipes/:id", delete(delete_recipe))
        .with_state(api);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), received)
}

fn mirrored_store(dir: &TempDir, base_url: String) -> RecipeStore {
    let mirror = HttpMirror::new(&MirrorConfig {
        base_url,
        timeout_secs: 5,
    })
    .unwrap();

    RecipeStore::new(
        StoreConfig {
            path: dir.path().join("recipes"),
            ..Default::default()
        },
        mirror,
    )
}

#[tokio::test]
async fn test_create_posts_multipart_form() {
    let (base_url, received) = spawn_mock_api(StatusCode::CREATED).await;
    let dir = TempDir::new().unwrap();
    let store = mirrored_store(&dir, base_url);
    store.open().await.unwrap();

    store
        .add_item("Soup", "Hot soup", vec![1u8, 2, 3, 4])
        .await
        .unwrap();

    let received = received.lock().clone();
    assert_eq!(received.len(), 1);

    let Received::Create(parts) = &received[0] else {
        panic!("expected a create request, got {:?}", received[0]);
    };
    assert_eq!(parts["title"].data, b"Soup");
    assert_eq!(parts["description"].data, b"Hot soup");
    assert_eq!(parts["image"].data, vec![1u8, 2, 3, 4]);
    assert_eq!(
        parts["image"].content_type.as_deref(),
        Some(MIRROR_IMAGE_CONTENT_TYPE)
    );
}

#[tokio::test]
async fn test_delete_addresses_recipe_by_id() {
    let (base_url, received) = spawn_mock_api(StatusCode::NO_CONTENT).await;
    let dir = TempDir::new().unwrap();
    let store = mirrored_store(&dir, base_url);
    store.open().await.unwrap();

    let soup = store.add_item("Soup", "Hot soup", b"img".to_vec()).await.unwrap();
    store.delete_item(soup.id).await.unwrap();

    let received = received.lock().clone();
    assert!(matches!(received.last(), Some(Received::Delete(id)) if *id == soup.id.0));
}

#[tokio::test]
async fn test_error_status_is_not_inspected() {
    let (base_url, received) = spawn_mock_api(StatusCode::INTERNAL_SERVER_ERROR).await;
    let dir = TempDir::new().unwrap();
    let store = mirrored_store(&dir, base_url);
    store.open().await.unwrap();

    let soup = store.add_item("Soup", "Hot soup", b"img".to_vec()).await.unwrap();
    store.delete_item(soup.id).await.unwrap();

    assert_eq!(received.lock().len(), 2);
}

#[tokio::test]
async fn test_unreachable_mirror_is_an_error() {
    // Grab a free port, then close it so nothing is listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let dir = TempDir::new().unwrap();
    let store = mirrored_store(&dir, format!("http://{addr}"));
    store.open().await.unwrap();

    let result = store.add_item("Soup", "Hot soup", b"img".to_vec()).await;
    assert!(matches!(result, Err(StoreError::Mirror(_))));

    // The local write was committed anyway.
    assert_eq!(store.count().unwrap(), 1);

    let result = store.delete_item(RecordId(1)).await;
    assert!(matches!(result, Err(StoreError::Mirror(_))));
    assert_eq!(store.count().unwrap(), 0);
}
