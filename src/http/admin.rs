use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::http::AppState;
use crate::Result;

pub async fn garbage_collect(State(state): State<AppState>) -> Result<Response> {
    let result = state.store.garbage_collect(state.config.session_ttl()).await?;
    Ok((StatusCode::OK, Json(result)).into_response())
}

pub async fn garbage_collect_stats(State(state): State<AppState>) -> Result<Response> {
    let result = state
        .store
        .garbage_collect_stats(state.config.session_ttl())
        .await?;
    Ok((StatusCode::OK, Json(result)).into_response())
}

pub async fn list_blobs(State(state): State<AppState>) -> Result<Response> {
    let digests = state.store.list_blob_digests().await?;
    Ok((StatusCode::OK, digests.join("\n")).into_response())
}

/// `POST /api/shutdown`, only mounted when `NSCR_SHUTDOWN_ENDPOINT_ENABLED`
/// is set -- lets the torture-test harness tear the server down
/// deterministically instead of killing the process.
pub async fn shutdown(State(state): State<AppState>) -> Result<Response> {
    tracing::warn!("shutdown endpoint invoked, terminating process");
    let _ = &state;
    std::process::exit(0);
}
