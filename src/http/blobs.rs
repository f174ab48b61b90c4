use std::collections::HashMap;

use axum::extract::{Path, Query, State, TypedHeader};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::errors::{DistributionErrorCode, Error};
use crate::http::headers::ContentRange;
use crate::http::AppState;
use crate::oci_digest::OciDigest;
use crate::validate::validate_repository_name;
use crate::Result;

fn upload_location(registry_url: &str, session_id: &str, next_chunk: i64) -> String {
    format!("{registry_url}/v2/uploads/{session_id}/{next_chunk}")
}

pub async fn head_blob(
    State(state): State<AppState>,
    Path((name, digest)): Path<(String, String)>,
) -> Result<Response> {
    validate_repository_name(&name)?;
    if !state.store.has_blob(&digest).await? {
        return Err(Error::DistributionSpecError(DistributionErrorCode::BlobUnknown));
    }
    let blob = state.store.get_blob(&digest).await?;
    Ok((
        StatusCode::OK,
        [
            ("Content-Length", blob.size.to_string()),
            ("Docker-Content-Digest", digest),
        ],
    )
        .into_response())
}

pub async fn get_blob(
    State(state): State<AppState>,
    Path((name, reference)): Path<(String, String)>,
) -> Result<Response> {
    validate_repository_name(&name)?;
    let digest = state.store.resolve_blob_reference(&name, &reference).await?;
    let blob = state.store.get_blob(&digest).await?;
    Ok((
        StatusCode::OK,
        [
            ("Content-Length", blob.size.to_string()),
            ("Docker-Content-Digest", blob.digest.clone()),
        ],
        blob.content,
    )
        .into_response())
}

/// `POST /v2/<name>/blobs/uploads[/]`. A
/// `?digest=` monolithic upload short-circuits to `201` only when the
/// blob is already known (dedup) or the posted body itself hashes to the
/// declared digest. Any other case -- including no body at all -- starts
/// a normal chunked session; a partial body that didn't match becomes
/// that session's chunk 0 rather than being discarded, so the client can
/// continue the upload exactly where it left off.
pub async fn start_upload(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response> {
    validate_repository_name(&name)?;
    let declared = params.get("digest");

    if let Some(declared) = declared {
        if state.store.has_blob(declared).await? {
            return Ok((
                StatusCode::CREATED,
                [("Docker-Content-Digest", declared.clone())],
            )
                .into_response());
        }

        if !body.is_empty() {
            let computed: OciDigest = body.as_ref().into();
            if &String::from(&computed) == declared {
                let session_id = state.store.create_session(Some(declared)).await?;
                state.store.add_blob_chunk(&session_id, 0, &body).await?;
                let (digest, _size) = state.store.finalize_blob(&session_id, declared).await?;
                state.store.discard_session(&session_id).await?;
                return Ok((
                    StatusCode::CREATED,
                    [
                        ("Location", state.config.registry_url()),
                        ("Docker-Content-Digest", digest),
                    ],
                )
                    .into_response());
            }
        }
    }

    let session_id = state.store.create_session(declared.map(|s| s.as_str())).await?;
    let mut next = 0i64;
    if !body.is_empty() {
        state.store.add_blob_chunk(&session_id, 0, &body).await?;
        next = 1;
    }

    Ok((
        StatusCode::ACCEPTED,
        [
            ("Location", upload_location(&state.config.registry_url(), &session_id, next)),
            ("Docker-Upload-UUID", session_id),
        ],
    )
        .into_response())
}

pub async fn patch_chunk(
    State(state): State<AppState>,
    Path((session_id, chunk_number)): Path<(String, i64)>,
    content_range: Option<TypedHeader<ContentRange>>,
    body: Bytes,
) -> Result<Response> {
    let expected = state.store.next_chunk_number(&session_id).await?;
    if chunk_number != expected {
        return Err(Error::DistributionSpecError(DistributionErrorCode::BlobUploadInvalid));
    }

    let total = state.store.add_blob_chunk(&session_id, chunk_number, &body).await?;

    // clients that declare Content-Range must agree with the byte offset
    // the server already has on file for this session.
    if let Some(TypedHeader(range)) = content_range {
        let before = total - body.len() as i64;
        if range.start as i64 != before {
            return Err(Error::DistributionSpecError(DistributionErrorCode::BlobUploadInvalid));
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        [
            (
                "Location",
                upload_location(&state.config.registry_url(), &session_id, chunk_number + 1),
            ),
            ("Range", format!("0-{total}")),
            ("Docker-Upload-UUID", session_id),
        ],
    )
        .into_response())
}

pub async fn finalize_upload(
    State(state): State<AppState>,
    Path((session_id, chunk_number)): Path<(String, i64)>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response> {
    let declared = params
        .get("digest")
        .ok_or(Error::MissingQueryParameter("digest"))?;

    if !body.is_empty() {
        state.store.add_blob_chunk(&session_id, chunk_number, &body).await?;
    }

    let (digest, _size) = state.store.finalize_blob(&session_id, declared).await?;
    state.store.discard_session(&session_id).await?;

    Ok((
        StatusCode::CREATED,
        [
            ("Location", state.config.registry_url()),
            ("Docker-Content-Digest", digest),
        ],
    )
        .into_response())
}
