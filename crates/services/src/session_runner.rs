//! Drives an exam session through its lifecycle: resume, autosave, timer
//! ticks, explicit and implicit submission.

use std::sync::Arc;

use tracing::{info, warn};

use exam_core::model::{
    ContestId, ExamBlueprint, ExamSession, SessionError, SessionStatus, TickOutcome, UserId,
};
use exam_core::time::Clock;
use storage::repository::SnapshotStore;

use crate::error::RunnerError;
use crate::grading::GradedResult;
use crate::submission::SubmissionPipeline;

/// One timer advance, plus the graded result if this tick forced the
/// implicit expiry submit.
#[derive(Debug)]
pub struct TickAdvance {
    pub outcome: TickOutcome,
    pub graded: Option<GradedResult>,
}

/// Orchestrates one exam session against the snapshot store and the
/// submission pipeline.
///
/// The runner owns no session state itself; callers hold the `ExamSession`
/// and pass it in, so the same runner serves any number of sequential
/// sessions.
pub struct SessionRunner {
    clock: Clock,
    snapshots: Arc<dyn SnapshotStore>,
    pipeline: SubmissionPipeline,
}

impl SessionRunner {
    #[must_use]
    pub fn new(clock: Clock, snapshots: Arc<dyn SnapshotStore>, pipeline: SubmissionPipeline) -> Self {
        Self {
            clock,
            snapshots,
            pipeline,
        }
    }

    /// Resume the session saved for this exam, or start fresh.
    ///
    /// A snapshot that fails validation is discarded with a warning; the
    /// test-taker gets a clean session rather than an error screen.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::Storage` when the snapshot store itself fails.
    pub async fn resume_or_start(
        &self,
        blueprint: ExamBlueprint,
    ) -> Result<ExamSession, RunnerError> {
        let exam_id = blueprint.exam_id();
        if let Some(snapshot) = self.snapshots.load(exam_id).await? {
            match ExamSession::restore(blueprint.clone(), snapshot) {
                Ok(session) => {
                    info!(%exam_id, status = ?session.status(), "resumed session from snapshot");
                    return Ok(session);
                }
                Err(err) => {
                    warn!(%exam_id, error = %err, "discarding unusable snapshot");
                    if let Err(clear_err) = self.snapshots.clear(exam_id).await {
                        warn!(%exam_id, error = %clear_err, "failed to clear unusable snapshot");
                    }
                }
            }
        }
        Ok(ExamSession::new(blueprint))
    }

    /// Persist the session's current state.
    ///
    /// Autosave failures are logged and swallowed: losing one save interval
    /// is acceptable, interrupting the exam is not.
    pub async fn autosave(&self, session: &mut ExamSession) {
        let exam_id = session.exam_id();
        let snapshot = session.snapshot(self.clock.now());
        if let Err(err) = self.snapshots.save(exam_id, &snapshot).await {
            warn!(%exam_id, error = %err, "autosave failed");
        }
    }

    /// Advance the timer once.
    ///
    /// On the tick that expires the session, whatever answers exist are
    /// submitted immediately; the session stays `Expired` either way.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::SubmissionFailed` when the expiry submit could
    /// not reach the grader; retry via [`SessionRunner::submit`].
    pub async fn tick(
        &self,
        session: &mut ExamSession,
        user_id: UserId,
        contest_id: Option<ContestId>,
    ) -> Result<TickAdvance, RunnerError> {
        let outcome = session.tick(self.clock.now());
        let graded = match outcome {
            TickOutcome::Expired { just_expired: true } => {
                info!(exam_id = %session.exam_id(), %user_id, "time expired, submitting");
                Some(self.submit(session, user_id, contest_id).await?)
            }
            _ => None,
        };
        Ok(TickAdvance { outcome, graded })
    }

    /// Submit the session's answers for grading.
    ///
    /// The snapshot is flushed first so a crash mid-submit loses nothing.
    /// On success the session closes and its snapshot is cleared. On grader
    /// failure the session keeps its answers (status `Submitting`, or
    /// `Expired` for the implicit path) and a retry resends the identical
    /// payload.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::Session` for invalid lifecycle states and
    /// `RunnerError::SubmissionFailed` for grader failures.
    pub async fn submit(
        &self,
        session: &mut ExamSession,
        user_id: UserId,
        contest_id: Option<ContestId>,
    ) -> Result<GradedResult, RunnerError> {
        self.autosave(session).await;

        let payload = self.pipeline.build_payload(session, user_id, contest_id)?;
        if session.status() == SessionStatus::InProgress {
            session.begin_submit()?;
        } else if session.status() != SessionStatus::Submitting
            && session.status() != SessionStatus::Expired
        {
            return Err(RunnerError::Session(SessionError::InvalidTransition {
                operation: "submit",
                status: session.status(),
            }));
        }

        match self.pipeline.submit(&payload).await {
            Ok(result) => {
                session.complete_submit()?;
                let exam_id = session.exam_id();
                if let Err(err) = self.snapshots.clear(exam_id).await {
                    warn!(%exam_id, error = %err, "failed to clear snapshot after submit");
                }
                info!(
                    %exam_id,
                    %user_id,
                    submission_id = %result.submission_id,
                    score = result.objective_score,
                    "submission graded"
                );
                Ok(result)
            }
            Err(err) => {
                warn!(
                    exam_id = %session.exam_id(),
                    %user_id,
                    error = %err,
                    "submission failed, session kept for retry"
                );
                Err(RunnerError::SubmissionFailed(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use exam_core::model::{
        AnswerValue, ExamId, QuestionId, SessionSnapshot, SubmissionId,
    };
    use exam_core::time::{fixed_clock, fixed_now};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use storage::repository::{InMemoryRepository, StorageError};
    use uuid::Uuid;

    use crate::error::GradingError;
    use crate::grading::{GradingClient, IdempotencyKey, SubmissionPayload};

    struct FakeGrader {
        fail: AtomicBool,
        seen: Mutex<Vec<IdempotencyKey>>,
    }

    impl FakeGrader {
        fn new() -> Self {
            Self {
                fail: AtomicBool::new(false),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn set_failing(&self, failing: bool) {
            self.fail.store(failing, Ordering::SeqCst);
        }

        fn keys(&self) -> Vec<IdempotencyKey> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GradingClient for FakeGrader {
        async fn grade(&self, payload: &SubmissionPayload) -> Result<GradedResult, GradingError> {
            self.seen.lock().unwrap().push(payload.idempotency_key());
            if self.fail.load(Ordering::SeqCst) {
                return Err(GradingError::InvalidResponse("boom".into()));
            }
            Ok(GradedResult {
                submission_id: SubmissionId::new(Uuid::new_v4()),
                objective_score: payload.answers.len() as f64,
                final_score: None,
                per_question: Vec::new(),
            })
        }
    }

    struct FailingStore;

    #[async_trait]
    impl SnapshotStore for FailingStore {
        async fn save(
            &self,
            _exam_id: ExamId,
            _snapshot: &SessionSnapshot,
        ) -> Result<(), StorageError> {
            Err(StorageError::Connection("offline".into()))
        }

        async fn load(&self, _exam_id: ExamId) -> Result<Option<SessionSnapshot>, StorageError> {
            Ok(None)
        }

        async fn clear(&self, _exam_id: ExamId) -> Result<(), StorageError> {
            Err(StorageError::Connection("offline".into()))
        }

        async fn has(&self, _exam_id: ExamId) -> Result<bool, StorageError> {
            Ok(false)
        }
    }

    fn blueprint() -> ExamBlueprint {
        let questions = (1..=3).map(QuestionId::new).collect();
        ExamBlueprint::new(ExamId::new(5), "Chemistry", 900, questions).unwrap()
    }

    fn runner_with(
        grader: Arc<FakeGrader>,
        snapshots: Arc<dyn SnapshotStore>,
        clock: Clock,
    ) -> SessionRunner {
        SessionRunner::new(clock, snapshots, SubmissionPipeline::new(grader))
    }

    #[tokio::test]
    async fn resume_restores_the_saved_session() {
        let repo = Arc::new(InMemoryRepository::new());
        let grader = Arc::new(FakeGrader::new());
        let runner = runner_with(grader, repo.clone(), fixed_clock());

        let mut session = runner.resume_or_start(blueprint()).await.unwrap();
        session.start(fixed_now()).unwrap();
        session
            .set_answer(QuestionId::new(1), AnswerValue::Text("H2O".into()), fixed_now())
            .unwrap();
        runner.autosave(&mut session).await;

        let resumed = runner.resume_or_start(blueprint()).await.unwrap();
        assert_eq!(resumed.status(), SessionStatus::InProgress);
        assert_eq!(resumed.answered_count(), 1);
        assert_eq!(resumed.started_at(), session.started_at());
    }

    #[tokio::test]
    async fn unusable_snapshot_falls_back_to_a_fresh_session() {
        let repo = Arc::new(InMemoryRepository::new());
        let grader = Arc::new(FakeGrader::new());
        let runner = runner_with(grader, repo.clone(), fixed_clock());

        // A snapshot saved under a different exam's definition.
        let other = ExamBlueprint::new(
            ExamId::new(5),
            "Chemistry",
            120,
            vec![QuestionId::new(9)],
        )
        .unwrap();
        let mut foreign = ExamSession::new(other);
        foreign.start(fixed_now()).unwrap();
        repo.save(ExamId::new(5), &foreign.snapshot(fixed_now()))
            .await
            .unwrap();

        let session = runner.resume_or_start(blueprint()).await.unwrap();
        assert_eq!(session.status(), SessionStatus::NotStarted);
        assert!(!repo.has(ExamId::new(5)).await.unwrap());
    }

    #[tokio::test]
    async fn autosave_failure_never_interrupts_the_session() {
        let grader = Arc::new(FakeGrader::new());
        let runner = runner_with(grader, Arc::new(FailingStore), fixed_clock());

        let mut session = ExamSession::new(blueprint());
        session.start(fixed_now()).unwrap();
        runner.autosave(&mut session).await;

        assert_eq!(session.status(), SessionStatus::InProgress);
        assert!(session.last_saved_at().is_some());
    }

    #[tokio::test]
    async fn successful_submit_closes_and_clears() {
        let repo = Arc::new(InMemoryRepository::new());
        let grader = Arc::new(FakeGrader::new());
        let runner = runner_with(grader.clone(), repo.clone(), fixed_clock());

        let mut session = ExamSession::new(blueprint());
        session.start(fixed_now()).unwrap();
        session
            .set_answer(QuestionId::new(2), AnswerValue::Text("NaCl".into()), fixed_now())
            .unwrap();

        let result = runner
            .submit(&mut session, UserId::new(1), None)
            .await
            .unwrap();
        assert_eq!(result.objective_score, 1.0);
        assert_eq!(session.status(), SessionStatus::Submitted);
        assert!(!repo.has(ExamId::new(5)).await.unwrap());
    }

    #[tokio::test]
    async fn failed_submit_keeps_answers_and_retries_the_same_key() {
        let repo = Arc::new(InMemoryRepository::new());
        let grader = Arc::new(FakeGrader::new());
        let runner = runner_with(grader.clone(), repo.clone(), fixed_clock());

        let mut session = ExamSession::new(blueprint());
        session.start(fixed_now()).unwrap();
        session
            .set_answer(QuestionId::new(1), AnswerValue::Text("Fe".into()), fixed_now())
            .unwrap();

        grader.set_failing(true);
        let err = runner
            .submit(&mut session, UserId::new(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::SubmissionFailed(_)));
        assert_eq!(session.status(), SessionStatus::Submitting);
        assert_eq!(session.answered_count(), 1);
        assert!(repo.has(ExamId::new(5)).await.unwrap());

        grader.set_failing(false);
        runner
            .submit(&mut session, UserId::new(1), None)
            .await
            .unwrap();
        assert_eq!(session.status(), SessionStatus::Submitted);

        let keys = grader.keys();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0], keys[1]);
    }

    #[tokio::test]
    async fn expiring_tick_submits_implicitly() {
        let repo = Arc::new(InMemoryRepository::new());
        let grader = Arc::new(FakeGrader::new());
        let mut clock = fixed_clock();
        clock.advance(Duration::seconds(900));
        let runner = runner_with(grader.clone(), repo.clone(), clock);

        let mut session = ExamSession::new(blueprint());
        session.start(fixed_now()).unwrap();
        session
            .set_answer(QuestionId::new(3), AnswerValue::Text("partial".into()), fixed_now())
            .unwrap();

        let advance = runner
            .tick(&mut session, UserId::new(1), Some(exam_core::model::ContestId::new(2)))
            .await
            .unwrap();
        assert_eq!(advance.outcome, TickOutcome::Expired { just_expired: true });
        assert!(advance.graded.is_some());
        assert_eq!(session.status(), SessionStatus::Expired);

        // The next tick is a plain report, no second submission.
        let advance = runner
            .tick(&mut session, UserId::new(1), None)
            .await
            .unwrap();
        assert_eq!(
            advance.outcome,
            TickOutcome::Expired {
                just_expired: false
            }
        );
        assert!(advance.graded.is_none());
        assert_eq!(grader.keys().len(), 1);
    }
}
