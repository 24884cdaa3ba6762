//! Profile API behavior through the router.

use axum::body::Body;
use axum::http::{header, Method, Request, Response, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use talkypie_server::{app, AppState};
use talkypie_store::{FileProfileStore, MemoryProfileStore, ProfileStore};
use tower::ServiceExt;

fn memory_app() -> axum::Router {
    app(AppState {
        store: Arc::new(MemoryProfileStore::new()),
    })
}

async fn send(app: &axum::Router, method: Method, uri: &str, body: Body) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn post_json(app: &axum::Router, value: &Value) -> Response<Body> {
    send(app, Method::POST, "/profile", Body::from(value.to_string())).await
}

fn assert_cors(response: &Response<Body>) {
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_METHODS],
        "GET, POST, OPTIONS"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
}

#[tokio::test]
async fn health_check_returns_ok() {
    let app = memory_app();
    let response = send(&app, Method::GET, "/", Body::empty()).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_cors(&response);
    assert_eq!(body_bytes(response).await, b"OK");
}

#[tokio::test]
async fn head_health_check_has_no_body() {
    let app = memory_app();
    let response = send(&app, Method::HEAD, "/", Body::empty()).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_cors(&response);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn fresh_store_has_no_content() {
    let app = memory_app();
    let response = send(&app, Method::GET, "/profile", Body::empty()).await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_cors(&response);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn write_then_read_round_trips() {
    let app = memory_app();
    let profile = json!({
        "name": "Ava",
        "age": 6,
        "likes": "dinosaurs",
        "nested": { "favourite": ["green", "blue"] }
    });

    let response = post_json(&app, &profile).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    assert_cors(&response);
    assert_eq!(body_bytes(response).await, b"{}");

    let response = send(&app, Method::GET, "/profile", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    let stored: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(stored, profile);
}

#[tokio::test]
async fn repeated_reads_are_byte_identical() {
    let app = memory_app();
    post_json(&app, &json!({ "name": "आरव", "learning": "colours" })).await;

    let first = body_bytes(send(&app, Method::GET, "/profile", Body::empty()).await).await;
    let second = body_bytes(send(&app, Method::GET, "/profile", Body::empty()).await).await;
    let third = body_bytes(send(&app, Method::GET, "/profile", Body::empty()).await).await;

    assert_eq!(first, second);
    assert_eq!(second, third);
    assert_eq!(
        String::from_utf8(first).unwrap(),
        "{\n  \"learning\": \"colours\",\n  \"name\": \"आरव\"\n}"
    );
}

#[tokio::test]
async fn second_write_replaces_the_whole_document() {
    let app = memory_app();
    post_json(&app, &json!({ "name": "Ava", "likes": "dinosaurs" })).await;
    post_json(&app, &json!({ "age": 7 })).await;

    let response = send(&app, Method::GET, "/profile", Body::empty()).await;
    let stored: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(stored, json!({ "age": 7 }));
}

#[tokio::test]
async fn undecodable_payloads_are_server_errors() {
    let app = memory_app();
    for payload in ["", "{\"name\": ", "[1, 2, 3]", "\"Ava\""] {
        let response = send(&app, Method::POST, "/profile", Body::from(payload)).await;
        assert_eq!(
            response.status(),
            StatusCode::INTERNAL_SERVER_ERROR,
            "payload {:?}",
            payload
        );
        assert_cors(&response);
    }

    let response = send(&app, Method::GET, "/profile", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn preflight_is_answered_on_any_path() {
    let app = memory_app();
    for path in ["/profile", "/", "/anything/else"] {
        let response = send(&app, Method::OPTIONS, path, Body::empty()).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT, "path {}", path);
        assert_cors(&response);
        assert!(body_bytes(response).await.is_empty());
    }
}

#[tokio::test]
async fn unknown_paths_and_methods_are_not_found() {
    let app = memory_app();

    let response = send(&app, Method::GET, "/profiles", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_cors(&response);

    let response = send(&app, Method::POST, "/", Body::from("{}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, Method::DELETE, "/profile", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_cors(&response);

    let response = send(&app, Method::HEAD, "/profile", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_cors(&response);

    post_json(&app, &json!({ "name": "Ava" })).await;
    let response = send(&app, Method::HEAD, "/profile", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn corrupt_file_reads_as_no_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile.json");
    std::fs::write(&path, "{\"name\": \"Ava\"").unwrap();
    let app = app(AppState {
        store: Arc::new(FileProfileStore::new(&path)),
    });

    let response = send(&app, Method::GET, "/profile", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    post_json(&app, &json!({ "name": "Ava" })).await;
    let response = send(&app, Method::GET, "/profile", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn storage_failure_is_a_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileProfileStore::new(dir.path().join("missing").join("profile.json"));
    let app = app(AppState {
        store: Arc::new(store),
    });

    let response = post_json(&app, &json!({ "name": "Ava" })).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_cors(&response);
}

#[tokio::test]
async fn unreadable_file_is_a_server_error() {
    let dir = tempfile::tempdir().unwrap();
    // A directory where the file should be: reading it fails with an I/O
    // error that is neither "not found" nor bad content.
    let path = dir.path().join("profile.json");
    std::fs::create_dir(&path).unwrap();
    let app = app(AppState {
        store: Arc::new(FileProfileStore::new(&path)),
    });

    let response = send(&app, Method::GET, "/profile", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_cors(&response);
}

#[tokio::test]
async fn concurrent_writes_leave_exactly_one_body() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn ProfileStore> =
        Arc::new(FileProfileStore::new(dir.path().join("profile.json")));
    let app = app(AppState {
        store: Arc::clone(&store),
    });

    let bodies: Vec<Value> = (0..12)
        .map(|i| {
            json!({
                "name": format!("child-{}", i),
                "age": i + 1,
                "likes": "x".repeat(i * 500),
            })
        })
        .collect();

    let mut tasks = Vec::new();
    for body in bodies.clone() {
        let app = app.clone();
        tasks.push(tokio::spawn(async move { post_json(&app, &body).await.status() }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }

    let response = send(&app, Method::GET, "/profile", Body::empty()).await;
    let stored: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(bodies.contains(&stored));
}
