use std::time::Duration;

use sqlx::Row;
use uuid::Uuid;

use crate::store::Store;
use crate::Result;

impl Store {
    /// Generates an unguessable (128-bit random v4 UUID) session id and
    /// creates its `upload_sessions` row.
    pub async fn create_session(&self, declared_digest: Option<&str>) -> Result<String> {
        let session_id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO upload_sessions (session_id, declared_digest) VALUES (?, ?)")
            .bind(&session_id)
            .bind(declared_digest)
            .execute(self.db().pool())
            .await?;
        Ok(session_id)
    }

    pub async fn session_exists(&self, session_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM upload_sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(self.db().pool())
            .await?;
        Ok(row.is_some())
    }

    /// Deletes the session row (cascading to its chunks). Used once a
    /// finalize has either succeeded or been aborted for digest mismatch
    /// -- a mismatch leaves the session open for retry instead, so
    /// callers only invoke this on success or explicit abandonment.
    pub async fn discard_session(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM upload_sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(self.db().pool())
            .await?;
        Ok(())
    }

    /// Deletes sessions (and, via `ON DELETE CASCADE`, their chunks) whose
    /// `last_activity_at` is older than `ttl`. Runs under a transaction so
    /// a concurrent finalize can't race a sweep of the same session.
    pub async fn sweep_expired_sessions(&self, ttl: Duration) -> Result<i64> {
        let cutoff_secs = ttl.as_secs_f64();
        let mut tx = self.db().pool().begin().await?;

        let rows = sqlx::query(
            "SELECT session_id FROM upload_sessions \
             WHERE (strftime('%s', 'now') - strftime('%s', last_activity_at)) > ?",
        )
        .bind(cutoff_secs)
        .fetch_all(&mut *tx)
        .await?;

        let count = rows.len() as i64;
        for row in rows {
            let session_id: String = row.try_get("session_id")?;
            sqlx::query("DELETE FROM upload_sessions WHERE session_id = ?")
                .bind(session_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(count)
    }
}
