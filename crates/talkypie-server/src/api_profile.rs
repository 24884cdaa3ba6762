//! Profile Service handlers.
//!
//! Provides:
//! - `GET /` liveness check
//! - `GET /profile` read the stored document
//! - `POST /profile` replace the stored document

use crate::AppState;
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Extension},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use talkypie_store::{decode_document, encode_document, StoreError};

/// Handler for `GET /` (and `HEAD /`).
///
/// Independent of store state; used by hosting health checks.
pub async fn health_handler() -> &'static str {
    "OK"
}

fn internal_error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
        .into_response()
}

/// Handler for `GET /profile`.
///
/// Returns the stored document in its canonical encoding, or 204 if none
/// has been written. A corrupt file is reported as 204 as well.
pub async fn get_profile_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    let store = Arc::clone(&state.store);
    let read = tokio::task::spawn_blocking(move || store.get()).await;

    let document = match read {
        Ok(Ok(Some(document))) => document,
        Ok(Ok(None)) => return StatusCode::NO_CONTENT.into_response(),
        Ok(Err(StoreError::Corrupt(reason))) => {
            tracing::warn!(%reason, "stored profile is corrupt, reporting no content");
            return StatusCode::NO_CONTENT.into_response();
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "failed to read profile");
            return internal_error("failed to read profile");
        }
        Err(e) => {
            tracing::error!(error = %e, "profile read task failed");
            return internal_error("failed to read profile");
        }
    };

    match encode_document(&document) {
        Ok(body) => ([(CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode profile");
            internal_error("failed to read profile")
        }
    }
}

/// Handler for `POST /profile`.
///
/// Stores any JSON object verbatim, replacing the previous document.
/// Unreadable bodies, malformed JSON, non-object JSON and storage failures
/// all answer 500.
pub async fn post_profile_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "failed to read profile request body");
            return internal_error("failed to store profile");
        }
    };

    let document = match decode_document(&body) {
        Ok(document) => document,
        Err(e) => {
            tracing::warn!(error = %e, bytes = body.len(), "rejected profile payload");
            return internal_error("failed to store profile");
        }
    };

    let store = Arc::clone(&state.store);
    match tokio::task::spawn_blocking(move || store.put(&document)).await {
        Ok(Ok(())) => {
            tracing::info!("profile replaced");
            (StatusCode::OK, Json(json!({}))).into_response()
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "failed to write profile");
            internal_error("failed to store profile")
        }
        Err(e) => {
            tracing::error!(error = %e, "profile write task failed");
            internal_error("failed to store profile")
        }
    }
}

/// Fallback for unknown paths and unsupported methods.
pub async fn not_found_handler() -> StatusCode {
    StatusCode::NOT_FOUND
}
