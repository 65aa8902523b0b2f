use exam_core::model::{ContestId, ContestParticipation, SubjectProgress, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    conn, contest_id_from_i64, id_i64, ser, status_from_str, status_to_str, user_id_from_i64,
};
use crate::repository::{ParticipationRepository, StorageError};

fn map_participation_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ContestParticipation, StorageError> {
    let contest_id = contest_id_from_i64(row.try_get::<i64, _>("contest_id").map_err(ser)?)?;
    let user_id = user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?;
    let enrolled_at = row.try_get("enrolled_at").map_err(ser)?;
    let status = status_from_str(row.try_get::<&str, _>("status").map_err(ser)?)?;
    let rank = row
        .try_get::<Option<i64>, _>("rank")
        .map_err(ser)?
        .map(|raw| {
            u32::try_from(raw)
                .map_err(|_| StorageError::Serialization(format!("invalid rank: {raw}")))
        })
        .transpose()?;
    let subjects: Vec<SubjectProgress> =
        serde_json::from_str(row.try_get::<&str, _>("subjects").map_err(ser)?).map_err(ser)?;

    ContestParticipation::from_persisted(contest_id, user_id, enrolled_at, subjects, status, rank)
        .map_err(ser)
}

#[async_trait::async_trait]
impl ParticipationRepository for SqliteRepository {
    async fn upsert_participation(
        &self,
        participation: &ContestParticipation,
    ) -> Result<(), StorageError> {
        let contest_id = id_i64("contest_id", participation.contest_id().value())?;
        let user_id = id_i64("user_id", participation.user_id().value())?;
        let subjects = serde_json::to_string(participation.subjects()).map_err(ser)?;

        sqlx::query(
            r"
                INSERT INTO contest_participations (
                    contest_id, user_id, enrolled_at, status, rank, subjects
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT (contest_id, user_id) DO UPDATE SET
                    enrolled_at = excluded.enrolled_at,
                    status = excluded.status,
                    rank = excluded.rank,
                    subjects = excluded.subjects
            ",
        )
        .bind(contest_id)
        .bind(user_id)
        .bind(participation.enrolled_at())
        .bind(status_to_str(participation.status()))
        .bind(participation.rank().map(i64::from))
        .bind(subjects)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_participation(
        &self,
        contest_id: ContestId,
        user_id: UserId,
    ) -> Result<Option<ContestParticipation>, StorageError> {
        let contest_id = id_i64("contest_id", contest_id.value())?;
        let user_id = id_i64("user_id", user_id.value())?;

        let row = sqlx::query(
            r"
                SELECT contest_id, user_id, enrolled_at, status, rank, subjects
                FROM contest_participations
                WHERE contest_id = ?1 AND user_id = ?2
            ",
        )
        .bind(contest_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_participation_row).transpose()
    }

    async fn list_for_contest(
        &self,
        contest_id: ContestId,
    ) -> Result<Vec<ContestParticipation>, StorageError> {
        let contest_id = id_i64("contest_id", contest_id.value())?;

        let rows = sqlx::query(
            r"
                SELECT contest_id, user_id, enrolled_at, status, rank, subjects
                FROM contest_participations
                WHERE contest_id = ?1
                ORDER BY enrolled_at ASC
            ",
        )
        .bind(contest_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_participation_row).collect()
    }
}
