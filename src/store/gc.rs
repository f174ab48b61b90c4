use std::time::Duration;

use sqlx::Row;

use crate::store::types::GcResult;
use crate::store::Store;
use crate::Result;

impl Store {
    /// Runs entirely inside one transaction so the snapshot GC acts on
    /// can never be invalidated by a concurrent manifest write: compute
    /// `Orphans = Blob \ Referenced`, sum their size, delete them, then
    /// optionally sweep abandoned upload sessions. Manifests are never
    /// touched by GC (`manifestsRemoved` is always `0`).
    pub async fn garbage_collect(&self, session_ttl: Duration) -> Result<GcResult> {
        let mut tx = self.db().pool().begin().await?;

        let orphans = sqlx::query(
            "SELECT digest, size FROM blobs \
             WHERE digest NOT IN (SELECT DISTINCT blob_digest FROM manifest_refs)",
        )
        .fetch_all(&mut *tx)
        .await?;

        let mut space_freed: i64 = 0;
        let mut blobs_removed: i64 = 0;
        for row in &orphans {
            let digest: String = row.try_get("digest")?;
            let size: i64 = row.try_get("size")?;
            sqlx::query("DELETE FROM blobs WHERE digest = ?")
                .bind(&digest)
                .execute(&mut *tx)
                .await?;
            space_freed += size;
            blobs_removed += 1;
        }

        let cutoff_secs = session_ttl.as_secs_f64();
        let expired = sqlx::query(
            "SELECT session_id FROM upload_sessions \
             WHERE (strftime('%s', 'now') - strftime('%s', last_activity_at)) > ?",
        )
        .bind(cutoff_secs)
        .fetch_all(&mut *tx)
        .await?;
        let orphaned_sessions = expired.len() as i64;
        for row in expired {
            let session_id: String = row.try_get("session_id")?;
            sqlx::query("DELETE FROM upload_sessions WHERE session_id = ?")
                .bind(session_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(GcResult {
            blobs_removed,
            space_freed,
            manifests_removed: 0,
            orphaned_sessions,
        })
    }

    /// Same computation as [`Store::garbage_collect`] without the deletes
    /// -- the dry-run stats endpoint.
    pub async fn garbage_collect_stats(&self, session_ttl: Duration) -> Result<GcResult> {
        let orphans = sqlx::query(
            "SELECT COALESCE(SUM(size), 0) AS total_size, COUNT(*) AS total_count FROM blobs \
             WHERE digest NOT IN (SELECT DISTINCT blob_digest FROM manifest_refs)",
        )
        .fetch_one(self.db().pool())
        .await?;

        let space_freed: i64 = orphans.try_get("total_size")?;
        let blobs_removed: i64 = orphans.try_get("total_count")?;

        let cutoff_secs = session_ttl.as_secs_f64();
        let expired = sqlx::query(
            "SELECT COUNT(*) AS c FROM upload_sessions \
             WHERE (strftime('%s', 'now') - strftime('%s', last_activity_at)) > ?",
        )
        .bind(cutoff_secs)
        .fetch_one(self.db().pool())
        .await?;
        let orphaned_sessions: i64 = expired.try_get("c")?;

        Ok(GcResult {
            blobs_removed,
            space_freed,
            manifests_removed: 0,
            orphaned_sessions,
        })
    }
}
