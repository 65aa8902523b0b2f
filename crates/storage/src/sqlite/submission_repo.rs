use exam_core::model::UserId;
use exam_core::stats::HistoryEntry;
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, kind_from_str, kind_to_str, ser};
use crate::repository::{StorageError, SubmissionHistoryRepository};

fn map_history_row(row: &sqlx::sqlite::SqliteRow) -> Result<HistoryEntry, StorageError> {
    let duration_raw: i64 = row.try_get("duration_minutes").map_err(ser)?;
    let duration_minutes = u32::try_from(duration_raw).map_err(|_| {
        StorageError::Serialization(format!("invalid duration_minutes: {duration_raw}"))
    })?;

    Ok(HistoryEntry {
        subject: row.try_get("subject").map_err(ser)?,
        score: row.try_get("score").map_err(ser)?,
        max_score: row.try_get("max_score").map_err(ser)?,
        duration_minutes,
        kind: kind_from_str(row.try_get::<&str, _>("kind").map_err(ser)?)?,
        submitted_at: row.try_get("submitted_at").map_err(ser)?,
    })
}

#[async_trait::async_trait]
impl SubmissionHistoryRepository for SqliteRepository {
    async fn append_submission(
        &self,
        user_id: UserId,
        entry: &HistoryEntry,
    ) -> Result<(), StorageError> {
        let user_id = id_i64("user_id", user_id.value())?;

        sqlx::query(
            r"
                INSERT INTO submission_history (
                    user_id, subject, score, max_score,
                    duration_minutes, kind, submitted_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(user_id)
        .bind(&entry.subject)
        .bind(entry.score)
        .bind(entry.max_score)
        .bind(i64::from(entry.duration_minutes))
        .bind(kind_to_str(entry.kind))
        .bind(entry.submitted_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn list_submissions(&self, user_id: UserId) -> Result<Vec<HistoryEntry>, StorageError> {
        let user_id = id_i64("user_id", user_id.value())?;

        let rows = sqlx::query(
            r"
                SELECT subject, score, max_score, duration_minutes, kind, submitted_at
                FROM submission_history
                WHERE user_id = ?1
                ORDER BY submitted_at DESC, id DESC
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_history_row).collect()
    }
}
