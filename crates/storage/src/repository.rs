use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use exam_core::model::{ContestId, ContestParticipation, ExamId, SessionSnapshot, UserId};
use exam_core::stats::HistoryEntry;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Key/value store for session snapshots, partitioned by exam id.
///
/// Keys never overlap across sessions, so no cross-session coordination is
/// required. Durability beyond the current process is not guaranteed and
/// must not be assumed by callers.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist or overwrite the snapshot for `exam_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails. Autosaving callers swallow
    /// and log this; a lost autosave must never interrupt the exam.
    async fn save(&self, exam_id: ExamId, snapshot: &SessionSnapshot)
    -> Result<(), StorageError>;

    /// Fetch the snapshot for `exam_id`.
    ///
    /// A missing or undecodable record yields `Ok(None)`; corruption is
    /// handled by starting a fresh session, not by failing the caller.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` only for store-level failures.
    async fn load(&self, exam_id: ExamId) -> Result<Option<SessionSnapshot>, StorageError>;

    /// Drop the snapshot for `exam_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete fails.
    async fn clear(&self, exam_id: ExamId) -> Result<(), StorageError>;

    /// Whether a snapshot exists for `exam_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn has(&self, exam_id: ExamId) -> Result<bool, StorageError>;
}

/// Repository contract for contest participations.
#[async_trait]
pub trait ParticipationRepository: Send + Sync {
    /// Persist or update a participation.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the participation cannot be stored.
    async fn upsert_participation(
        &self,
        participation: &ContestParticipation,
    ) -> Result<(), StorageError>;

    /// Fetch one user's participation in a contest.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for store-level failures.
    async fn get_participation(
        &self,
        contest_id: ContestId,
        user_id: UserId,
    ) -> Result<Option<ContestParticipation>, StorageError>;

    /// All participations in a contest, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for store-level failures.
    async fn list_for_contest(
        &self,
        contest_id: ContestId,
    ) -> Result<Vec<ContestParticipation>, StorageError>;
}

/// Repository contract for finalized submission history rows.
#[async_trait]
pub trait SubmissionHistoryRepository: Send + Sync {
    /// Append one finalized submission to a user's history.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    async fn append_submission(
        &self,
        user_id: UserId,
        entry: &HistoryEntry,
    ) -> Result<(), StorageError>;

    /// A user's full history, most recent submission first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for store-level failures.
    async fn list_submissions(&self, user_id: UserId) -> Result<Vec<HistoryEntry>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    snapshots: Arc<Mutex<HashMap<ExamId, SessionSnapshot>>>,
    participations: Arc<Mutex<HashMap<(ContestId, UserId), ContestParticipation>>>,
    submissions: Arc<Mutex<HashMap<UserId, Vec<HistoryEntry>>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned<T>(err: std::sync::PoisonError<T>) -> StorageError {
        StorageError::Connection(err.to_string())
    }
}

#[async_trait]
impl SnapshotStore for InMemoryRepository {
    async fn save(
        &self,
        exam_id: ExamId,
        snapshot: &SessionSnapshot,
    ) -> Result<(), StorageError> {
        let mut guard = self.snapshots.lock().map_err(Self::poisoned)?;
        guard.insert(exam_id, snapshot.clone());
        Ok(())
    }

    async fn load(&self, exam_id: ExamId) -> Result<Option<SessionSnapshot>, StorageError> {
        let guard = self.snapshots.lock().map_err(Self::poisoned)?;
        Ok(guard.get(&exam_id).cloned())
    }

    async fn clear(&self, exam_id: ExamId) -> Result<(), StorageError> {
        let mut guard = self.snapshots.lock().map_err(Self::poisoned)?;
        guard.remove(&exam_id);
        Ok(())
    }

    async fn has(&self, exam_id: ExamId) -> Result<bool, StorageError> {
        let guard = self.snapshots.lock().map_err(Self::poisoned)?;
        Ok(guard.contains_key(&exam_id))
    }
}

#[async_trait]
impl ParticipationRepository for InMemoryRepository {
    async fn upsert_participation(
        &self,
        participation: &ContestParticipation,
    ) -> Result<(), StorageError> {
        let mut guard = self.participations.lock().map_err(Self::poisoned)?;
        guard.insert(
            (participation.contest_id(), participation.user_id()),
            participation.clone(),
        );
        Ok(())
    }

    async fn get_participation(
        &self,
        contest_id: ContestId,
        user_id: UserId,
    ) -> Result<Option<ContestParticipation>, StorageError> {
        let guard = self.participations.lock().map_err(Self::poisoned)?;
        Ok(guard.get(&(contest_id, user_id)).cloned())
    }

    async fn list_for_contest(
        &self,
        contest_id: ContestId,
    ) -> Result<Vec<ContestParticipation>, StorageError> {
        let guard = self.participations.lock().map_err(Self::poisoned)?;
        Ok(guard
            .values()
            .filter(|p| p.contest_id() == contest_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SubmissionHistoryRepository for InMemoryRepository {
    async fn append_submission(
        &self,
        user_id: UserId,
        entry: &HistoryEntry,
    ) -> Result<(), StorageError> {
        let mut guard = self.submissions.lock().map_err(Self::poisoned)?;
        guard.entry(user_id).or_default().push(entry.clone());
        Ok(())
    }

    async fn list_submissions(&self, user_id: UserId) -> Result<Vec<HistoryEntry>, StorageError> {
        let guard = self.submissions.lock().map_err(Self::poisoned)?;
        let mut entries = guard.get(&user_id).cloned().unwrap_or_default();
        // Ties on submitted_at resolve to the later append, matching the
        // SQLite backend's id DESC ordering.
        entries.reverse();
        entries.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(entries)
    }
}

/// Aggregates the storage concerns behind trait objects for backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub snapshots: Arc<dyn SnapshotStore>,
    pub participations: Arc<dyn ParticipationRepository>,
    pub submissions: Arc<dyn SubmissionHistoryRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let snapshots: Arc<dyn SnapshotStore> = Arc::new(repo.clone());
        let participations: Arc<dyn ParticipationRepository> = Arc::new(repo.clone());
        let submissions: Arc<dyn SubmissionHistoryRepository> = Arc::new(repo);
        Self {
            snapshots,
            participations,
            submissions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use exam_core::model::{
        AnswerValue, ContestDefinition, ContestSubject, ExamBlueprint, ExamSession, QuestionId,
    };
    use exam_core::stats::SubmissionKind;
    use exam_core::time::fixed_now;

    fn snapshot_for(exam: u64) -> SessionSnapshot {
        let blueprint = ExamBlueprint::new(
            ExamId::new(exam),
            "Math",
            600,
            vec![QuestionId::new(1), QuestionId::new(2)],
        )
        .unwrap();
        let mut session = ExamSession::new(blueprint);
        session.start(fixed_now()).unwrap();
        session
            .set_answer(QuestionId::new(1), AnswerValue::Text("x = 4".into()), fixed_now())
            .unwrap();
        session.snapshot(fixed_now())
    }

    #[tokio::test]
    async fn snapshot_store_round_trips_by_exam() {
        let repo = InMemoryRepository::new();
        let snapshot = snapshot_for(1);

        assert!(!repo.has(ExamId::new(1)).await.unwrap());
        repo.save(ExamId::new(1), &snapshot).await.unwrap();
        assert!(repo.has(ExamId::new(1)).await.unwrap());

        let loaded = repo.load(ExamId::new(1)).await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        assert!(repo.load(ExamId::new(2)).await.unwrap().is_none());

        repo.clear(ExamId::new(1)).await.unwrap();
        assert!(!repo.has(ExamId::new(1)).await.unwrap());
    }

    #[tokio::test]
    async fn participations_are_listed_per_contest() {
        let repo = InMemoryRepository::new();
        let definition = ContestDefinition::new(
            ContestId::new(9),
            vec![ContestSubject {
                exam_id: ExamId::new(1),
                weight: 1.0,
            }],
        )
        .unwrap();

        for user in 1..=3 {
            let participation = ContestParticipation::enroll(
                &definition,
                UserId::new(user),
                fixed_now() + Duration::seconds(user as i64),
            );
            repo.upsert_participation(&participation).await.unwrap();
        }

        let listed = repo.list_for_contest(ContestId::new(9)).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert!(
            repo.get_participation(ContestId::new(9), UserId::new(2))
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            repo.list_for_contest(ContestId::new(10))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn history_is_returned_most_recent_first() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        for (offset, subject) in [(0, "Math"), (120, "Physics"), (60, "Chemistry")] {
            repo.append_submission(
                user,
                &HistoryEntry {
                    subject: subject.into(),
                    score: 7.0,
                    max_score: 10.0,
                    duration_minutes: 30,
                    kind: SubmissionKind::GlobalPractice,
                    submitted_at: fixed_now() + Duration::seconds(offset),
                },
            )
            .await
            .unwrap();
        }

        let history = repo.list_submissions(user).await.unwrap();
        let subjects: Vec<&str> = history.iter().map(|e| e.subject.as_str()).collect();
        assert_eq!(subjects, vec!["Physics", "Chemistry", "Math"]);
    }

    #[tokio::test]
    async fn simultaneous_submissions_list_the_later_append_first() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        for subject in ["Math", "Physics", "Chemistry"] {
            repo.append_submission(
                user,
                &HistoryEntry {
                    subject: subject.into(),
                    score: 7.0,
                    max_score: 10.0,
                    duration_minutes: 30,
                    kind: SubmissionKind::GlobalPractice,
                    submitted_at: fixed_now(),
                },
            )
            .await
            .unwrap();
        }

        let history = repo.list_submissions(user).await.unwrap();
        let subjects: Vec<&str> = history.iter().map(|e| e.subject.as_str()).collect();
        assert_eq!(subjects, vec!["Chemistry", "Physics", "Math"]);
    }
}
