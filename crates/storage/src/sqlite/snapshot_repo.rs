use exam_core::model::{ExamId, SessionSnapshot};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, ser};
use crate::repository::{SnapshotStore, StorageError};

#[async_trait::async_trait]
impl SnapshotStore for SqliteRepository {
    async fn save(
        &self,
        exam_id: ExamId,
        snapshot: &SessionSnapshot,
    ) -> Result<(), StorageError> {
        let exam_id = id_i64("exam_id", exam_id.value())?;
        let payload = serde_json::to_string(snapshot).map_err(ser)?;
        let saved_at = snapshot.last_saved_at.unwrap_or_else(chrono::Utc::now);

        sqlx::query(
            r"
                INSERT INTO session_snapshots (exam_id, payload, saved_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT (exam_id) DO UPDATE SET
                    payload = excluded.payload,
                    saved_at = excluded.saved_at
            ",
        )
        .bind(exam_id)
        .bind(payload)
        .bind(saved_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn load(&self, exam_id: ExamId) -> Result<Option<SessionSnapshot>, StorageError> {
        let exam_id = id_i64("exam_id", exam_id.value())?;
        let row = sqlx::query("SELECT payload FROM session_snapshots WHERE exam_id = ?1")
            .bind(exam_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let payload: String = row.try_get("payload").map_err(ser)?;

        // An undecodable snapshot reads as absent; the caller starts a fresh
        // session instead of failing the exam flow.
        Ok(serde_json::from_str(&payload).ok())
    }

    async fn clear(&self, exam_id: ExamId) -> Result<(), StorageError> {
        let exam_id = id_i64("exam_id", exam_id.value())?;
        sqlx::query("DELETE FROM session_snapshots WHERE exam_id = ?1")
            .bind(exam_id)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }

    async fn has(&self, exam_id: ExamId) -> Result<bool, StorageError> {
        let exam_id = id_i64("exam_id", exam_id.value())?;
        let row = sqlx::query("SELECT 1 FROM session_snapshots WHERE exam_id = ?1")
            .bind(exam_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        Ok(row.is_some())
    }
}
