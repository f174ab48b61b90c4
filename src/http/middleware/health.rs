use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::errors::Error;
use crate::http::AppState;

/// Gates every request behind the shared `healthy` flag the background
/// integrity monitor maintains: once recovery fails, every `/v2` and
/// admin endpoint returns 503 until a later integrity check passes again.
pub async fn require_healthy<B>(
    State(state): State<AppState>,
    req: Request<B>,
    next: Next<B>,
) -> Response {
    if state.healthy.load(Ordering::Relaxed) {
        next.run(req).await
    } else {
        Error::DatabaseUnavailable.into_response()
    }
}
