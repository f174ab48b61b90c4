use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::{http::StatusCode, Json};
use serde::Serialize;

use crate::http::AppState;
use crate::validate::validate_repository_name;
use crate::Result;

#[derive(Serialize)]
struct TagsList {
    name: String,
    tags: Vec<String>,
}

pub async fn list_tags(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response> {
    validate_repository_name(&name)?;
    let tags = state.store.list_tags(&name).await?;
    Ok((StatusCode::OK, Json(TagsList { name, tags })).into_response())
}
