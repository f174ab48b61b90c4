use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::errors::{DistributionErrorCode, Error};
use crate::http::AppState;
use crate::validate::validate_repository_name;
use crate::Result;

#[derive(Serialize)]
struct Catalog {
    repositories: Vec<String>,
}

pub async fn list_repositories(State(state): State<AppState>) -> Result<Response> {
    let repositories = state.store.list_repositories().await?;
    Ok((StatusCode::OK, Json(Catalog { repositories })).into_response())
}

#[derive(Serialize)]
struct DeleteRepositoryBody {
    message: String,
    #[serde(rename = "manifestsDeleted")]
    manifests_deleted: i64,
}

pub async fn delete_repository(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response> {
    validate_repository_name(&name)?;
    let count = state.store.delete_repository(&name).await?;
    if count == 0 {
        return Err(Error::DistributionSpecError(DistributionErrorCode::NameUnknown));
    }
    Ok((
        StatusCode::ACCEPTED,
        Json(DeleteRepositoryBody {
            message: format!("deleted repository {name}"),
            manifests_deleted: count,
        }),
    )
        .into_response())
}
