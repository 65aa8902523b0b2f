use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ContestId, ExamId, UserId};

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ContestError {
    #[error("contest has no subjects")]
    EmptySubjects,

    #[error("subject weight must not be negative")]
    NegativeWeight,

    #[error("no subject at order {0}")]
    UnknownSubject(usize),

    #[error("subject at order {order} is locked until its predecessors are submitted")]
    OutOfOrder { order: usize },

    #[error("participation has been invalidated")]
    Invalidated,

    #[error("participation is already finalized")]
    Finalized,

    #[error("subject at order {order} is {status:?}, expected {expected:?}")]
    WrongSubjectStatus {
        order: usize,
        status: SubjectStatus,
        expected: SubjectStatus,
    },
}

/// One `(exam, weight)` slot in a contest definition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContestSubject {
    pub exam_id: ExamId,
    pub weight: f64,
}

/// Immutable ordered list of subjects defining a contest.
///
/// Supplied by the catalog collaborator; the order is fixed at definition
/// time and drives the sequential-unlock rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ContestDefinition {
    contest_id: ContestId,
    subjects: Vec<ContestSubject>,
}

impl ContestDefinition {
    /// # Errors
    ///
    /// Returns `ContestError::EmptySubjects` for an empty list and
    /// `ContestError::NegativeWeight` if any weight is below zero.
    pub fn new(
        contest_id: ContestId,
        subjects: Vec<ContestSubject>,
    ) -> Result<Self, ContestError> {
        if subjects.is_empty() {
            return Err(ContestError::EmptySubjects);
        }
        if subjects.iter().any(|s| s.weight < 0.0) {
            return Err(ContestError::NegativeWeight);
        }
        Ok(Self {
            contest_id,
            subjects,
        })
    }

    #[must_use]
    pub fn contest_id(&self) -> ContestId {
        self.contest_id
    }

    #[must_use]
    pub fn subjects(&self) -> &[ContestSubject] {
        &self.subjects
    }

    #[must_use]
    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }
}

/// Lifecycle of one subject slot within a participation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectStatus {
    Pending,
    InProgress,
    Submitted,
}

/// A participant's progress through one contest subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectProgress {
    pub exam_id: ExamId,
    pub order: usize,
    pub weight: f64,
    pub status: SubjectStatus,
    pub score: Option<f64>,
}

/// Overall state of a participation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipationStatus {
    Active,
    Completed,
    /// Integrity violation; terminal, score reads as zero, excluded from
    /// leaderboards.
    Invalidated,
}

/// A user's enrollment and aggregate progress in one contest.
///
/// Sole owner of the ordering and completion fields; session machines only
/// report their terminal status upward through the contest service.
#[derive(Debug, Clone, PartialEq)]
pub struct ContestParticipation {
    contest_id: ContestId,
    user_id: UserId,
    enrolled_at: DateTime<Utc>,
    subjects: Vec<SubjectProgress>,
    status: ParticipationStatus,
    rank: Option<u32>,
}

impl ContestParticipation {
    /// Enroll a user, deriving the subject slots from the definition.
    #[must_use]
    pub fn enroll(
        definition: &ContestDefinition,
        user_id: UserId,
        enrolled_at: DateTime<Utc>,
    ) -> Self {
        let subjects = definition
            .subjects()
            .iter()
            .enumerate()
            .map(|(order, subject)| SubjectProgress {
                exam_id: subject.exam_id,
                order,
                weight: subject.weight,
                status: SubjectStatus::Pending,
                score: None,
            })
            .collect();
        Self {
            contest_id: definition.contest_id(),
            user_id,
            enrolled_at,
            subjects,
            status: ParticipationStatus::Active,
            rank: None,
        }
    }

    /// Rehydrate a participation from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ContestError::EmptySubjects` if the subject list is empty.
    pub fn from_persisted(
        contest_id: ContestId,
        user_id: UserId,
        enrolled_at: DateTime<Utc>,
        subjects: Vec<SubjectProgress>,
        status: ParticipationStatus,
        rank: Option<u32>,
    ) -> Result<Self, ContestError> {
        if subjects.is_empty() {
            return Err(ContestError::EmptySubjects);
        }
        Ok(Self {
            contest_id,
            user_id,
            enrolled_at,
            subjects,
            status,
            rank,
        })
    }

    #[must_use]
    pub fn contest_id(&self) -> ContestId {
        self.contest_id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn enrolled_at(&self) -> DateTime<Utc> {
        self.enrolled_at
    }

    #[must_use]
    pub fn status(&self) -> ParticipationStatus {
        self.status
    }

    #[must_use]
    pub fn subjects(&self) -> &[SubjectProgress] {
        &self.subjects
    }

    #[must_use]
    pub fn rank(&self) -> Option<u32> {
        self.rank
    }

    /// Assigned by the leaderboard computation.
    pub fn set_rank(&mut self, rank: u32) {
        self.rank = Some(rank);
    }

    /// Number of subjects submitted so far.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.subjects
            .iter()
            .filter(|s| s.status == SubjectStatus::Submitted)
            .count()
    }

    /// Weighted sum of submitted subject scores.
    ///
    /// Unsubmitted subjects contribute 0; an invalidated participation
    /// always reads as 0.
    #[must_use]
    pub fn total_score(&self) -> f64 {
        if self.status == ParticipationStatus::Invalidated {
            return 0.0;
        }
        self.subjects
            .iter()
            .filter(|s| s.status == SubjectStatus::Submitted)
            .map(|s| s.score.unwrap_or(0.0) * s.weight)
            .sum()
    }

    /// True iff every subject before `order` has been submitted.
    #[must_use]
    pub fn can_enter(&self, order: usize) -> bool {
        if self.status == ParticipationStatus::Invalidated {
            return false;
        }
        order < self.subjects.len()
            && self.subjects[..order]
                .iter()
                .all(|s| s.status == SubjectStatus::Submitted)
    }

    /// Mark the subject at `order` as entered, enforcing sequential unlock.
    ///
    /// # Errors
    ///
    /// `ContestError::OutOfOrder` if a predecessor is not yet submitted,
    /// `ContestError::Invalidated`/`Finalized` for terminal participations,
    /// `ContestError::UnknownSubject` for a bad order, and
    /// `ContestError::WrongSubjectStatus` if the subject already ran.
    pub fn begin_subject(&mut self, order: usize) -> Result<ExamId, ContestError> {
        match self.status {
            ParticipationStatus::Invalidated => return Err(ContestError::Invalidated),
            ParticipationStatus::Completed => return Err(ContestError::Finalized),
            ParticipationStatus::Active => {}
        }
        if order >= self.subjects.len() {
            return Err(ContestError::UnknownSubject(order));
        }
        if !self.can_enter(order) {
            return Err(ContestError::OutOfOrder { order });
        }
        let subject = &mut self.subjects[order];
        if subject.status != SubjectStatus::Pending {
            return Err(ContestError::WrongSubjectStatus {
                order,
                status: subject.status,
                expected: SubjectStatus::Pending,
            });
        }
        subject.status = SubjectStatus::InProgress;
        Ok(subject.exam_id)
    }

    /// Record a submitted subject score and advance the participation.
    ///
    /// Finalizes the participation once every subject is submitted; the
    /// total score is immutable from that point.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`Self::begin_subject`], expecting the subject to be
    /// `InProgress`.
    pub fn record_submitted(&mut self, order: usize, score: f64) -> Result<(), ContestError> {
        match self.status {
            ParticipationStatus::Invalidated => return Err(ContestError::Invalidated),
            ParticipationStatus::Completed => return Err(ContestError::Finalized),
            ParticipationStatus::Active => {}
        }
        let subject = self
            .subjects
            .get_mut(order)
            .ok_or(ContestError::UnknownSubject(order))?;
        if subject.status != SubjectStatus::InProgress {
            return Err(ContestError::WrongSubjectStatus {
                order,
                status: subject.status,
                expected: SubjectStatus::InProgress,
            });
        }
        subject.status = SubjectStatus::Submitted;
        subject.score = Some(score);

        if self.completed_count() == self.subjects.len() {
            self.status = ParticipationStatus::Completed;
        }
        Ok(())
    }

    /// Apply an integrity-violation signal: one-way, zeroes the readable
    /// score, excludes the participation from leaderboards. Idempotent.
    pub fn invalidate(&mut self) {
        self.status = ParticipationStatus::Invalidated;
        self.rank = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn definition() -> ContestDefinition {
        ContestDefinition::new(
            ContestId::new(1),
            vec![
                ContestSubject {
                    exam_id: ExamId::new(10),
                    weight: 1.0,
                },
                ContestSubject {
                    exam_id: ExamId::new(11),
                    weight: 2.0,
                },
                ContestSubject {
                    exam_id: ExamId::new(12),
                    weight: 1.0,
                },
            ],
        )
        .unwrap()
    }

    fn enrolled() -> ContestParticipation {
        ContestParticipation::enroll(&definition(), UserId::new(5), fixed_now())
    }

    #[test]
    fn subjects_unlock_in_order() {
        let mut participation = enrolled();
        assert!(participation.can_enter(0));
        assert!(!participation.can_enter(1));

        let err = participation.begin_subject(1).unwrap_err();
        assert_eq!(err, ContestError::OutOfOrder { order: 1 });

        assert_eq!(participation.begin_subject(0).unwrap(), ExamId::new(10));
        participation.record_submitted(0, 8.0).unwrap();
        assert!(participation.can_enter(1));
        assert!(!participation.can_enter(2));
    }

    #[test]
    fn total_score_is_weighted() {
        let mut participation = enrolled();
        participation.begin_subject(0).unwrap();
        participation.record_submitted(0, 8.0).unwrap();
        assert!((participation.total_score() - 8.0).abs() < f64::EPSILON);

        participation.begin_subject(1).unwrap();
        participation.record_submitted(1, 5.0).unwrap();
        // 8 * 1 + 5 * 2
        assert!((participation.total_score() - 18.0).abs() < f64::EPSILON);
        assert_eq!(participation.completed_count(), 2);
        assert_eq!(participation.status(), ParticipationStatus::Active);
    }

    #[test]
    fn finalizes_after_the_last_subject() {
        let mut participation = enrolled();
        for (order, score) in [(0, 8.0), (1, 5.0), (2, 9.0)] {
            participation.begin_subject(order).unwrap();
            participation.record_submitted(order, score).unwrap();
        }
        assert_eq!(participation.status(), ParticipationStatus::Completed);
        assert_eq!(participation.completed_count(), 3);

        let err = participation.begin_subject(0).unwrap_err();
        assert_eq!(err, ContestError::Finalized);
    }

    #[test]
    fn invalidation_is_terminal_and_zeroes_the_score() {
        let mut participation = enrolled();
        participation.begin_subject(0).unwrap();
        participation.record_submitted(0, 9.5).unwrap();

        participation.invalidate();
        assert_eq!(participation.status(), ParticipationStatus::Invalidated);
        assert_eq!(participation.total_score(), 0.0);
        assert!(!participation.can_enter(1));
        assert_eq!(
            participation.begin_subject(1).unwrap_err(),
            ContestError::Invalidated
        );

        // No recovery path.
        participation.invalidate();
        assert_eq!(participation.status(), ParticipationStatus::Invalidated);
    }

    #[test]
    fn double_submission_of_a_subject_is_rejected() {
        let mut participation = enrolled();
        participation.begin_subject(0).unwrap();
        participation.record_submitted(0, 7.0).unwrap();
        let err = participation.record_submitted(0, 9.0).unwrap_err();
        assert_eq!(
            err,
            ContestError::WrongSubjectStatus {
                order: 0,
                status: SubjectStatus::Submitted,
                expected: SubjectStatus::InProgress,
            }
        );
    }

    #[test]
    fn definitions_reject_bad_weights() {
        let err = ContestDefinition::new(
            ContestId::new(1),
            vec![ContestSubject {
                exam_id: ExamId::new(1),
                weight: -0.5,
            }],
        )
        .unwrap_err();
        assert_eq!(err, ContestError::NegativeWeight);
    }
}
