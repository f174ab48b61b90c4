use serde_json::Value;
use sqlx::Row;

use crate::errors::{DistributionErrorCode, Error};
use crate::oci_digest::OciDigest;
use crate::store::types::ManifestRow;
use crate::store::Store;
use crate::Result;

pub const MEDIA_TYPE_DOCKER_MANIFEST_V2: &str =
    "application/vnd.docker.distribution.manifest.v2+json";
pub const MEDIA_TYPE_DOCKER_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

fn is_index_type(media_type: &str) -> bool {
    matches!(media_type, MEDIA_TYPE_DOCKER_MANIFEST_LIST | MEDIA_TYPE_OCI_INDEX)
}

/// Reads `schemaVersion`/`mediaType` to tell a single-image manifest from
/// an index/manifest-list, then collects the referenced digests:
/// `config.digest`, each `layers[*].digest`, and (for index/list types)
/// each `manifests[*].digest`. Every extracted digest is validated as
/// `algorithm:hex`.
pub fn extract_blob_references(media_type: &str, body: &[u8]) -> Result<Vec<String>> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| Error::DistributionSpecError(DistributionErrorCode::ManifestInvalid))?;

    let mut digests = Vec::new();

    if is_index_type(media_type) {
        if let Some(manifests) = value.get("manifests").and_then(Value::as_array) {
            for m in manifests {
                if let Some(d) = m.get("digest").and_then(Value::as_str) {
                    digests.push(d.to_string());
                }
            }
        }
    } else {
        if let Some(d) = value
            .get("config")
            .and_then(|c| c.get("digest"))
            .and_then(Value::as_str)
        {
            digests.push(d.to_string());
        }
        if let Some(layers) = value.get("layers").and_then(Value::as_array) {
            for l in layers {
                if let Some(d) = l.get("digest").and_then(Value::as_str) {
                    digests.push(d.to_string());
                }
            }
        }
    }

    for d in &digests {
        let _: OciDigest = d.as_str().try_into()?;
    }

    Ok(digests)
}

/// Best-effort media type detection: explicit `mediaType` field wins;
/// otherwise presence of a `manifests` array tells an index apart from a
/// single-image Docker v2 manifest.
pub fn detect_media_type(body: &[u8]) -> Result<String> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| Error::DistributionSpecError(DistributionErrorCode::ManifestInvalid))?;

    if let Some(mt) = value.get("mediaType").and_then(Value::as_str) {
        return Ok(mt.to_string());
    }

    if value.get("manifests").is_some() {
        Ok(MEDIA_TYPE_DOCKER_MANIFEST_LIST.to_string())
    } else {
        Ok(MEDIA_TYPE_DOCKER_MANIFEST_V2.to_string())
    }
}

async fn insert_manifest_row(
    conn: &mut sqlx::SqliteConnection,
    repository: &str,
    reference: &str,
    digest: &str,
    media_type: &str,
    body: &[u8],
) -> Result<i64> {
    let row = sqlx::query(
        "INSERT INTO manifests (repository, reference, digest, media_type, body) \
         VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(repository)
    .bind(reference)
    .bind(digest)
    .bind(media_type)
    .bind(body)
    .fetch_one(conn)
    .await?;
    Ok(row.try_get("id")?)
}

async fn insert_refs(
    conn: &mut sqlx::SqliteConnection,
    manifest_id: i64,
    refs: &[String],
) -> Result<()> {
    for r in refs {
        sqlx::query("INSERT OR IGNORE INTO manifest_refs (manifest_id, blob_digest) VALUES (?, ?)")
            .bind(manifest_id)
            .bind(r)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

impl Store {
    /// `addManifest`: replaces any existing body at `(repo, reference)`
    /// atomically, materializes a second row keyed by the manifest's own
    /// digest (skipped when pushing directly by digest, since that would
    /// collide with the tag row), and records its blob references. All
    /// within one transaction, so GC never observes a manifest without
    /// its references or vice versa.
    pub async fn add_manifest(
        &self,
        repository: &str,
        reference: &str,
        media_type: &str,
        body: Vec<u8>,
        require_blobs: bool,
    ) -> Result<String> {
        let digest = OciDigest::from(body.as_slice());
        let digest_string = String::from(&digest);

        let refs = extract_blob_references(media_type, &body)?;

        if require_blobs {
            let index = is_index_type(media_type);
            for r in &refs {
                let present = if index {
                    self.has_manifest_by_digest(repository, r).await?
                } else {
                    self.has_blob(r).await?
                };
                if !present {
                    return Err(Error::DistributionSpecError(
                        DistributionErrorCode::ManifestBlobUnknown,
                    ));
                }
            }
        }

        let mut tx = self.db().pool().begin().await?;

        sqlx::query("DELETE FROM manifests WHERE repository = ? AND reference = ?")
            .bind(repository)
            .bind(reference)
            .execute(&mut *tx)
            .await?;

        let tag_id =
            insert_manifest_row(&mut tx, repository, reference, &digest_string, media_type, &body)
                .await?;
        insert_refs(&mut tx, tag_id, &refs).await?;

        if reference != digest_string {
            sqlx::query("DELETE FROM manifests WHERE repository = ? AND reference = ?")
                .bind(repository)
                .bind(&digest_string)
                .execute(&mut *tx)
                .await?;

            let digest_id = insert_manifest_row(
                &mut tx,
                repository,
                &digest_string,
                &digest_string,
                media_type,
                &body,
            )
            .await?;
            insert_refs(&mut tx, digest_id, &refs).await?;
        }

        tx.commit().await?;
        Ok(digest_string)
    }

    pub async fn get_manifest(&self, repository: &str, reference: &str) -> Result<ManifestRow> {
        let row = sqlx::query(
            "SELECT repository, reference, digest, media_type, body FROM manifests \
             WHERE repository = ? AND reference = ?",
        )
        .bind(repository)
        .bind(reference)
        .fetch_optional(self.db().pool())
        .await?
        .ok_or_else(|| {
            Error::DistributionSpecError(DistributionErrorCode::ManifestUnknown)
        })?;

        Ok(ManifestRow {
            repository: row.try_get("repository")?,
            reference: row.try_get("reference")?,
            digest: row.try_get("digest")?,
            media_type: row.try_get("media_type")?,
            body: row.try_get("body")?,
        })
    }

    pub async fn has_manifest(&self, repository: &str, reference: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM manifests WHERE repository = ? AND reference = ?")
            .bind(repository)
            .bind(reference)
            .fetch_optional(self.db().pool())
            .await?;
        Ok(row.is_some())
    }

    async fn has_manifest_by_digest(&self, repository: &str, digest: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM manifests WHERE repository = ? AND digest = ?")
            .bind(repository)
            .bind(digest)
            .fetch_optional(self.db().pool())
            .await?;
        Ok(row.is_some())
    }

    pub async fn digest_for_manifest(&self, repository: &str, reference: &str) -> Result<String> {
        let row = sqlx::query("SELECT digest FROM manifests WHERE repository = ? AND reference = ?")
            .bind(repository)
            .bind(reference)
            .fetch_optional(self.db().pool())
            .await?
            .ok_or_else(|| {
                Error::DistributionSpecError(DistributionErrorCode::ManifestUnknown)
            })?;
        Ok(row.try_get("digest")?)
    }

    /// `removeManifestIfExists`: atomic check-and-delete. Returns `true`
    /// iff this call performed the delete -- the concurrency-correctness
    /// anchor: N concurrent callers on the same key yield exactly one
    /// `true`. SQLite's single-writer lock makes this hold without any
    /// extra coordination: only one transaction's `DELETE` can observe
    /// and remove the row.
    pub async fn remove_manifest_if_exists(&self, repository: &str, reference: &str) -> Result<bool> {
        let mut tx = self.db().pool().begin().await?;

        let existing = sqlx::query("SELECT digest FROM manifests WHERE repository = ? AND reference = ?")
            .bind(repository)
            .bind(reference)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(existing) = existing else {
            tx.commit().await?;
            return Ok(false);
        };
        let digest: String = existing.try_get("digest")?;

        let result = sqlx::query("DELETE FROM manifests WHERE repository = ? AND reference = ?")
            .bind(repository)
            .bind(reference)
            .execute(&mut *tx)
            .await?;

        // if `reference` was the tag row, also drop the sibling digest row
        // iff no other reference still points at the same digest.
        if reference != digest {
            let siblings = sqlx::query(
                "SELECT 1 FROM manifests WHERE repository = ? AND digest = ? AND reference != ?",
            )
            .bind(repository)
            .bind(&digest)
            .bind(&digest)
            .fetch_optional(&mut *tx)
            .await?;
            if siblings.is_none() {
                sqlx::query("DELETE FROM manifests WHERE repository = ? AND reference = ?")
                    .bind(repository)
                    .bind(&digest)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_repository(&self, repository: &str) -> Result<i64> {
        let result = sqlx::query("DELETE FROM manifests WHERE repository = ?")
            .bind(repository)
            .execute(self.db().pool())
            .await?;
        Ok(result.rows_affected() as i64)
    }

    pub async fn list_repositories(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT repository FROM manifests ORDER BY repository ASC")
            .fetch_all(self.db().pool())
            .await?;
        rows.into_iter()
            .map(|r| r.try_get::<String, _>("repository").map_err(Error::from))
            .collect()
    }

    /// Lists tags only -- rows whose `reference` is itself the manifest's
    /// digest are the digest-keyed siblings, not user-facing tags.
    pub async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT reference FROM manifests WHERE repository = ? AND reference != digest ORDER BY reference ASC",
        )
        .bind(repository)
        .fetch_all(self.db().pool())
        .await?;
        rows.into_iter()
            .map(|r| r.try_get::<String, _>("reference").map_err(Error::from))
            .collect()
    }
}
