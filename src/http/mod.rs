use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware as axum_middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::trace::{self, TraceLayer};

pub mod headers;
pub mod middleware;

mod admin;
mod blobs;
mod catalog;
mod manifests;
mod tags;

use crate::config::Config;
use crate::errors::Result;
use crate::store::Store;

/// Everything a handler needs: the store facade, the resolved config (for
/// limits, the registry URL echoed in `Location`, and auth), and the
/// shared health flag the background integrity monitor flips on and off.
/// `healthy` defaults to `true` and is only ever read by request handlers
/// -- only the monitor task writes it.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Arc<Config>,
    pub healthy: Arc<AtomicBool>,
}

/// Assembles the full router: the OCI `/v2/*` surface, the `/api/*` admin
/// surface, and (when configured) the test-only shutdown endpoint. Basic
/// auth, when enabled, gates both surfaces via `route_layer` so the
/// version probe at `GET /v2/` still requires a round trip through the
/// middleware (clients use it to discover auth is required).
pub fn router(state: AppState) -> Router {
    let max_upload_size = state.config.max_upload_size_bytes() as usize;

    let blobs_router = Router::new()
        .route("/:digest", get(blobs::get_blob).head(blobs::head_blob))
        .route("/uploads", post(blobs::start_upload))
        .route("/uploads/", post(blobs::start_upload))
        .layer(DefaultBodyLimit::max(max_upload_size));

    let manifests_router = Router::new().route(
        "/:reference",
        get(manifests::get_manifest)
            .head(manifests::head_manifest)
            .put(manifests::put_manifest)
            .delete(manifests::delete_manifest),
    );

    let tags_router = Router::new().route("/list", get(tags::list_tags));

    let v2 = Router::new()
        .route("/", get(version_probe))
        .route("/_catalog", get(catalog::list_repositories))
        .route(
            "/uploads/:session_id/:chunk",
            patch(blobs::patch_chunk)
                .put(blobs::finalize_upload)
                .layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .nest("/:name/blobs", blobs_router)
        .nest("/:name/manifests", manifests_router)
        .nest("/:name/tags", tags_router)
        .route("/:name", delete(catalog::delete_repository));

    let api = Router::new()
        .route("/garbage-collect", post(admin::garbage_collect))
        .route("/garbage-collect/stats", get(admin::garbage_collect_stats))
        .route("/blobs", get(admin::list_blobs));

    let mut app = Router::new()
        .route("/v2", get(version_probe))
        .nest("/v2", v2)
        .nest("/api", api)
        .layer(
            TraceLayer::new_for_http()
                .on_response(trace::DefaultOnResponse::new())
                .on_request(trace::DefaultOnRequest::new()),
        );

    if state.config.shutdown_endpoint_enabled {
        app = app.route("/api/shutdown", post(admin::shutdown));
    }

    if state.config.auth_enabled {
        app = app.route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::basic_auth,
        ));
    }

    app = app.route_layer(axum_middleware::from_fn_with_state(
        state.clone(),
        middleware::health::require_healthy,
    ));

    app.with_state(state)
}

async fn version_probe(State(_state): State<AppState>) -> Result<Response> {
    Ok((
        StatusCode::OK,
        [("Docker-Distribution-API-Version", "registry/2.0")],
        "",
    )
        .into_response())
}
