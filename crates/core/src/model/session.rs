use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    AnswerRecord, AnswerValue, ExamBlueprint, ExamId, QuestionId, SessionSnapshot, SnapshotAnswer,
};

/// Lifecycle state of an exam session.
///
/// Transitions are monotonic: once a session is `Submitted` or `Expired` it
/// never returns to an earlier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Submitting,
    Submitted,
    Expired,
}

impl SessionStatus {
    /// Terminal states accept no further mutation.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Submitted | SessionStatus::Expired)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("{operation} is not allowed while the session is {status:?}")]
    InvalidTransition {
        operation: &'static str,
        status: SessionStatus,
    },

    #[error("question {0} is not part of this exam")]
    InvalidQuestion(QuestionId),

    #[error("snapshot is corrupt: {0}")]
    CorruptSnapshot(String),
}

/// Result of driving the session timer forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The timer is not running (not started, or already past `InProgress`).
    Idle,
    Running {
        remaining_seconds: u32,
    },
    /// `just_expired` is true only on the tick that performed the
    /// `InProgress` → `Expired` transition; the caller uses it to trigger
    /// the implicit submit with whatever answers exist.
    Expired {
        just_expired: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredAnswer {
    value: AnswerValue,
    last_modified: DateTime<Utc>,
}

/// One test-taker's attempt at one exam: timer, answers, flags, lifecycle.
///
/// Exactly one `ExamSession` may own a given exam's session at a time; the
/// caller drives it sequentially (no internal locking). Remaining time is
/// always derived from `started_at`, never counted down, so reloads and
/// clock drift cannot desynchronize the timer.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamSession {
    blueprint: ExamBlueprint,
    started_at: Option<DateTime<Utc>>,
    answers: BTreeMap<QuestionId, StoredAnswer>,
    flagged: BTreeSet<QuestionId>,
    current_question_index: usize,
    status: SessionStatus,
    last_saved_at: Option<DateTime<Utc>>,
}

impl ExamSession {
    /// Fresh `NotStarted` session over the given exam definition.
    #[must_use]
    pub fn new(blueprint: ExamBlueprint) -> Self {
        Self {
            blueprint,
            started_at: None,
            answers: BTreeMap::new(),
            flagged: BTreeSet::new(),
            current_question_index: 0,
            status: SessionStatus::NotStarted,
            last_saved_at: None,
        }
    }

    #[must_use]
    pub fn blueprint(&self) -> &ExamBlueprint {
        &self.blueprint
    }

    #[must_use]
    pub fn exam_id(&self) -> ExamId {
        self.blueprint.exam_id()
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.last_saved_at
    }

    fn guard(&self, operation: &'static str) -> Result<(), SessionError> {
        if self.status == SessionStatus::InProgress {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                operation,
                status: self.status,
            })
        }
    }

    fn known_question(&self, question_id: QuestionId) -> Result<(), SessionError> {
        if self.blueprint.contains_question(question_id) {
            Ok(())
        } else {
            Err(SessionError::InvalidQuestion(question_id))
        }
    }

    /// Start the timer and move to `InProgress`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` unless the session is
    /// `NotStarted` (calling `start` twice is a programmer error).
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.status != SessionStatus::NotStarted {
            return Err(SessionError::InvalidTransition {
                operation: "start",
                status: self.status,
            });
        }
        self.started_at = Some(now);
        self.status = SessionStatus::InProgress;
        Ok(())
    }

    /// Insert or overwrite the answer for `question_id`.
    ///
    /// Correctness is the grading collaborator's business; only membership in
    /// the exam's question universe is checked here.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` outside `InProgress` and
    /// `SessionError::InvalidQuestion` for unknown question ids.
    pub fn set_answer(
        &mut self,
        question_id: QuestionId,
        value: AnswerValue,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.guard("set_answer")?;
        self.known_question(question_id)?;
        self.answers.insert(
            question_id,
            StoredAnswer {
                value,
                last_modified: now,
            },
        );
        Ok(())
    }

    /// Flip the review flag on `question_id`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` outside `InProgress` and
    /// `SessionError::InvalidQuestion` for unknown question ids.
    pub fn toggle_flag(&mut self, question_id: QuestionId) -> Result<(), SessionError> {
        self.guard("toggle_flag")?;
        self.known_question(question_id)?;
        if !self.flagged.remove(&question_id) {
            self.flagged.insert(question_id);
        }
        Ok(())
    }

    /// The answer captured for `question_id`, if any.
    #[must_use]
    pub fn answer(&self, question_id: QuestionId) -> Option<AnswerRecord> {
        self.answers.get(&question_id).map(|stored| AnswerRecord {
            question_id,
            value: stored.value.clone(),
            flagged: self.flagged.contains(&question_id),
            last_modified: stored.last_modified,
        })
    }

    /// All captured answers, ordered by question id.
    pub fn answers(&self) -> impl Iterator<Item = AnswerRecord> + '_ {
        self.answers.iter().map(|(question_id, stored)| AnswerRecord {
            question_id: *question_id,
            value: stored.value.clone(),
            flagged: self.flagged.contains(question_id),
            last_modified: stored.last_modified,
        })
    }

    #[must_use]
    pub fn flagged_questions(&self) -> &BTreeSet<QuestionId> {
        &self.flagged
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    #[must_use]
    pub fn flagged_count(&self) -> usize {
        self.flagged.len()
    }

    #[must_use]
    pub fn unanswered_count(&self) -> usize {
        self.blueprint.question_count().saturating_sub(self.answers.len())
    }

    #[must_use]
    pub fn current_question_index(&self) -> usize {
        self.current_question_index
    }

    /// Question currently in front of the test-taker.
    #[must_use]
    pub fn current_question(&self) -> Option<QuestionId> {
        self.blueprint.questions().get(self.current_question_index).copied()
    }

    /// Jump to the question at `index`. Out-of-range indices are ignored.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` outside `InProgress`.
    pub fn go_to_question(&mut self, index: usize) -> Result<(), SessionError> {
        self.guard("go_to_question")?;
        if index < self.blueprint.question_count() {
            self.current_question_index = index;
        }
        Ok(())
    }

    /// Advance to the next question, stopping at the last one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` outside `InProgress`.
    pub fn next_question(&mut self) -> Result<(), SessionError> {
        self.guard("next_question")?;
        if self.current_question_index + 1 < self.blueprint.question_count() {
            self.current_question_index += 1;
        }
        Ok(())
    }

    /// Step back to the previous question, stopping at the first one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` outside `InProgress`.
    pub fn previous_question(&mut self) -> Result<(), SessionError> {
        self.guard("previous_question")?;
        self.current_question_index = self.current_question_index.saturating_sub(1);
        Ok(())
    }

    /// Seconds left on the timer at `now`, derived rather than stored.
    ///
    /// Before `start` this is the full duration.
    #[must_use]
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u32 {
        let Some(started_at) = self.started_at else {
            return self.blueprint.duration_seconds();
        };
        let elapsed = (now - started_at).num_seconds().max(0);
        let duration = i64::from(self.blueprint.duration_seconds());
        u32::try_from((duration - elapsed).max(0)).unwrap_or(0)
    }

    /// Drive the timer. Never blocks; called from an external periodic timer.
    ///
    /// Forces `InProgress` → `Expired` exactly once when the remaining time
    /// reaches zero. Repeated ticks on an expired session report
    /// `just_expired: false`.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        match self.status {
            SessionStatus::InProgress => {
                let remaining_seconds = self.remaining_seconds(now);
                if remaining_seconds == 0 {
                    self.status = SessionStatus::Expired;
                    TickOutcome::Expired { just_expired: true }
                } else {
                    TickOutcome::Running { remaining_seconds }
                }
            }
            SessionStatus::Expired => TickOutcome::Expired {
                just_expired: false,
            },
            SessionStatus::NotStarted | SessionStatus::Submitting | SessionStatus::Submitted => {
                TickOutcome::Idle
            }
        }
    }

    /// Move to `Submitting` ahead of handing the payload to the pipeline.
    ///
    /// Expired sessions submit implicitly without passing through
    /// `Submitting`; they stay `Expired`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` outside `InProgress`.
    pub fn begin_submit(&mut self) -> Result<(), SessionError> {
        self.guard("begin_submit")?;
        self.status = SessionStatus::Submitting;
        Ok(())
    }

    /// Record a successful submission.
    ///
    /// From `Submitting` this moves to `Submitted`; an `Expired` session
    /// stays `Expired` (terminal states are never left).
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` from any other state.
    pub fn complete_submit(&mut self) -> Result<(), SessionError> {
        match self.status {
            SessionStatus::Submitting => {
                self.status = SessionStatus::Submitted;
                Ok(())
            }
            SessionStatus::Expired => Ok(()),
            status => Err(SessionError::InvalidTransition {
                operation: "complete_submit",
                status,
            }),
        }
    }

    /// Serialize the session for the snapshot store, stamping `last_saved_at`.
    pub fn snapshot(&mut self, now: DateTime<Utc>) -> SessionSnapshot {
        self.last_saved_at = Some(now);
        SessionSnapshot {
            exam_id: self.blueprint.exam_id(),
            started_at: self.started_at,
            duration_seconds: self.blueprint.duration_seconds(),
            answers: self
                .answers
                .iter()
                .map(|(question_id, stored)| {
                    (
                        *question_id,
                        SnapshotAnswer {
                            value: stored.value.clone(),
                            flagged: self.flagged.contains(question_id),
                            last_modified: stored.last_modified,
                        },
                    )
                })
                .collect(),
            flagged_questions: self.flagged.iter().copied().collect(),
            current_question_index: self.current_question_index,
            status: self.status,
            last_saved_at: self.last_saved_at,
        }
    }

    /// Rebuild a session from a persisted snapshot.
    ///
    /// Callers fall back to a fresh `NotStarted` session when this fails;
    /// a corrupt snapshot must never crash the exam flow.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::CorruptSnapshot` when the snapshot was taken
    /// for a different exam, references unknown questions, or is internally
    /// inconsistent.
    pub fn restore(
        blueprint: ExamBlueprint,
        snapshot: SessionSnapshot,
    ) -> Result<Self, SessionError> {
        if snapshot.exam_id != blueprint.exam_id() {
            return Err(SessionError::CorruptSnapshot(format!(
                "snapshot is for exam {}, not {}",
                snapshot.exam_id,
                blueprint.exam_id()
            )));
        }
        if snapshot.duration_seconds != blueprint.duration_seconds() {
            return Err(SessionError::CorruptSnapshot(
                "duration does not match the exam definition".into(),
            ));
        }
        if snapshot.status != SessionStatus::NotStarted && snapshot.started_at.is_none() {
            return Err(SessionError::CorruptSnapshot(
                "missing started_at for a started session".into(),
            ));
        }

        let mut answers = BTreeMap::new();
        for (question_id, entry) in snapshot.answers {
            if !blueprint.contains_question(question_id) {
                return Err(SessionError::CorruptSnapshot(format!(
                    "answer for unknown question {question_id}"
                )));
            }
            answers.insert(
                question_id,
                StoredAnswer {
                    value: entry.value,
                    last_modified: entry.last_modified,
                },
            );
        }

        let mut flagged = BTreeSet::new();
        for question_id in snapshot.flagged_questions {
            if !blueprint.contains_question(question_id) {
                return Err(SessionError::CorruptSnapshot(format!(
                    "flag on unknown question {question_id}"
                )));
            }
            flagged.insert(question_id);
        }

        let last_index = blueprint.question_count().saturating_sub(1);
        Ok(Self {
            current_question_index: snapshot.current_question_index.min(last_index),
            blueprint,
            started_at: snapshot.started_at,
            answers,
            flagged,
            status: snapshot.status,
            last_saved_at: snapshot.last_saved_at,
        })
    }
}
