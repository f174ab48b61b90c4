use sqlx::Row;

use crate::errors::Error;
use crate::oci_digest::OciDigest;
use crate::store::types::BlobContent;
use crate::store::Store;
use crate::Result;

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(de) if de.code().as_deref() == Some("2067") || de.message().contains("UNIQUE constraint failed"))
}

impl Store {
    /// `hasBlob(digest) -> bool` -- single indexed lookup.
    pub async fn has_blob(&self, digest: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM blobs WHERE digest = ?")
            .bind(digest)
            .fetch_optional(self.db().pool())
            .await?;
        Ok(row.is_some())
    }

    pub async fn get_blob(&self, digest: &str) -> Result<BlobContent> {
        let row = sqlx::query("SELECT digest, size, content FROM blobs WHERE digest = ?")
            .bind(digest)
            .fetch_optional(self.db().pool())
            .await?
            .ok_or_else(|| Error::DistributionSpecError(crate::errors::DistributionErrorCode::BlobUnknown))?;

        Ok(BlobContent {
            digest: row.try_get("digest")?,
            size: row.try_get("size")?,
            content: row.try_get("content")?,
        })
    }

    /// Resolves a `blobs/<reference>` path segment: if it parses as an OCI
    /// digest it is used directly, otherwise it is treated as a manifest
    /// tag and resolved to that manifest's own digest.
    pub async fn resolve_blob_reference(&self, repository: &str, reference: &str) -> Result<String> {
        match OciDigest::try_from(reference) {
            Ok(d) => Ok(String::from(&d)),
            Err(_) => self.digest_for_manifest(repository, reference).await,
        }
    }

    /// `nextSessionLocation(sid) -> "sid/N"` -- next chunk number is
    /// `max(chunk_number)+1`, or `0` if the session has no chunks yet.
    pub async fn next_chunk_number(&self, session_id: &str) -> Result<i64> {
        let row = sqlx::query("SELECT MAX(chunk_number) AS m FROM chunks WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(self.db().pool())
            .await?;
        let max: Option<i64> = row.try_get("m")?;
        Ok(max.map(|n| n + 1).unwrap_or(0))
    }

    /// `addBlobChunk(sid, chunkNumber, bytes) -> bytesWritten` -- fails if
    /// `(sid, chunkNumber)` already exists; returns the session's
    /// cumulative bytes uploaded so far.
    pub async fn add_blob_chunk(
        &self,
        session_id: &str,
        chunk_number: i64,
        bytes: &[u8],
    ) -> Result<i64> {
        if !self.session_exists(session_id).await? {
            return Err(Error::SessionNotFound(session_id.to_string()));
        }

        let insert = sqlx::query(
            "INSERT INTO chunks (session_id, chunk_number, content, size) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(chunk_number)
        .bind(bytes)
        .bind(bytes.len() as i64)
        .execute(self.db().pool())
        .await;

        match insert {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(Error::DuplicateChunk(chunk_number, session_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        }

        sqlx::query("UPDATE upload_sessions SET last_activity_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), chunk_count = chunk_count + 1 WHERE session_id = ?")
            .bind(session_id)
            .execute(self.db().pool())
            .await?;

        let row = sqlx::query("SELECT COALESCE(SUM(size), 0) AS total FROM chunks WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(self.db().pool())
            .await?;
        let total: i64 = row.try_get("total")?;
        Ok(total)
    }

    /// `finalizeBlob(sid, declaredDigest) -> ()`: reads chunks in order,
    /// verifies the computed digest, then either dedups against an
    /// existing blob or inserts a new one. Always clears the session's
    /// chunks on success; the caller is responsible for the session row
    /// itself (PUT finalize deletes it once this returns `Ok`).
    pub async fn finalize_blob(&self, session_id: &str, declared_digest: &str) -> Result<(String, i64)> {
        let declared: OciDigest = declared_digest.try_into()?;

        let mut tx = self.db().pool().begin().await?;

        let rows = sqlx::query("SELECT content FROM chunks WHERE session_id = ? ORDER BY chunk_number ASC")
            .bind(session_id)
            .fetch_all(&mut *tx)
            .await?;

        if rows.is_empty() {
            let exists = sqlx::query("SELECT 1 FROM upload_sessions WHERE session_id = ?")
                .bind(session_id)
                .fetch_optional(&mut *tx)
                .await?;
            if exists.is_none() {
                return Err(Error::SessionNotFound(session_id.to_string()));
            }
        }

        let mut assembled = Vec::new();
        let mut digester = declared.digester();
        for row in &rows {
            let chunk: Vec<u8> = row.try_get("content")?;
            digester.update(&chunk);
            assembled.extend_from_slice(&chunk);
        }
        let computed = digester.finalize_hex();

        if computed != declared.encoded() {
            return Err(Error::DigestMismatch);
        }

        let size = assembled.len() as i64;
        let digest_string = String::from(&declared);

        sqlx::query("INSERT INTO blobs (digest, size, content) VALUES (?, ?, ?) ON CONFLICT(digest) DO NOTHING")
            .bind(&digest_string)
            .bind(size)
            .bind(&assembled)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM chunks WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok((digest_string, size))
    }

    /// `eachBlob(visitor)` -- bounded iteration for admin endpoints.
    /// Modeled as a plain `Vec` return rather than a visitor callback: the
    /// catalog of digests is never large enough to justify a streaming
    /// interface here.
    pub async fn list_blob_digests(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT digest FROM blobs ORDER BY digest ASC")
            .fetch_all(self.db().pool())
            .await?;
        rows.into_iter()
            .map(|r| r.try_get::<String, _>("digest").map_err(Error::from))
            .collect()
    }
}
