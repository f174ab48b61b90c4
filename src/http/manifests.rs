use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::errors::{DistributionErrorCode, Error};
use crate::http::AppState;
use crate::store::manifests::detect_media_type;
use crate::validate::validate_repository_name;
use crate::Result;

pub async fn head_manifest(
    State(state): State<AppState>,
    Path((name, reference)): Path<(String, String)>,
) -> Result<Response> {
    validate_repository_name(&name)?;
    if !state.store.has_manifest(&name, &reference).await? {
        return Err(Error::DistributionSpecError(DistributionErrorCode::ManifestUnknown));
    }
    Ok(StatusCode::OK.into_response())
}

pub async fn get_manifest(
    State(state): State<AppState>,
    Path((name, reference)): Path<(String, String)>,
) -> Result<Response> {
    validate_repository_name(&name)?;
    let manifest = state.store.get_manifest(&name, &reference).await?;
    Ok((
        StatusCode::OK,
        [
            ("Docker-Content-Digest", manifest.digest),
            ("Content-Type", manifest.media_type),
        ],
        manifest.body,
    )
        .into_response())
}

pub async fn put_manifest(
    State(state): State<AppState>,
    Path((name, reference)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    validate_repository_name(&name)?;
    let media_type = match headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        Some(ct) if !ct.is_empty() => ct.to_string(),
        _ => detect_media_type(&body)?,
    };

    let digest = state
        .store
        .add_manifest(
            &name,
            &reference,
            &media_type,
            body.to_vec(),
            state.config.manifest_require_blobs,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        [
            ("Docker-Content-Digest", digest.clone()),
            (
                "Location",
                format!("{}/v2/{}/manifests/{}", state.config.registry_url(), name, digest),
            ),
        ],
    )
        .into_response())
}

pub async fn delete_manifest(
    State(state): State<AppState>,
    Path((name, reference)): Path<(String, String)>,
) -> Result<Response> {
    validate_repository_name(&name)?;
    if state.store.remove_manifest_if_exists(&name, &reference).await? {
        Ok(StatusCode::ACCEPTED.into_response())
    } else {
        Err(Error::DistributionSpecError(DistributionErrorCode::ManifestUnknown))
    }
}
