use std::collections::BTreeSet;

use thiserror::Error;

use crate::model::{ExamId, QuestionId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamError {
    #[error("exam duration must be greater than zero")]
    ZeroDuration,

    #[error("exam has no questions")]
    EmptyQuestionSet,
}

/// Immutable definition of one exam, supplied by the catalog collaborator.
///
/// Carries the question-id universe so sessions can validate answer keys
/// without knowing anything about question content or grading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamBlueprint {
    exam_id: ExamId,
    subject: String,
    duration_seconds: u32,
    questions: Vec<QuestionId>,
    question_set: BTreeSet<QuestionId>,
}

impl ExamBlueprint {
    /// Build a blueprint from the catalog's ordered question list.
    ///
    /// Duplicate question ids collapse; the original order is kept for
    /// navigation.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::ZeroDuration` or `ExamError::EmptyQuestionSet`.
    pub fn new(
        exam_id: ExamId,
        subject: impl Into<String>,
        duration_seconds: u32,
        questions: Vec<QuestionId>,
    ) -> Result<Self, ExamError> {
        if duration_seconds == 0 {
            return Err(ExamError::ZeroDuration);
        }
        if questions.is_empty() {
            return Err(ExamError::EmptyQuestionSet);
        }
        let question_set: BTreeSet<QuestionId> = questions.iter().copied().collect();
        Ok(Self {
            exam_id,
            subject: subject.into(),
            duration_seconds,
            questions,
            question_set,
        })
    }

    #[must_use]
    pub fn exam_id(&self) -> ExamId {
        self.exam_id
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn duration_seconds(&self) -> u32 {
        self.duration_seconds
    }

    /// Questions in presentation order.
    #[must_use]
    pub fn questions(&self) -> &[QuestionId] {
        &self.questions
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    /// Returns true if `question_id` belongs to this exam.
    #[must_use]
    pub fn contains_question(&self, question_id: QuestionId) -> bool {
        self.question_set.contains(&question_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qs(ids: &[u64]) -> Vec<QuestionId> {
        ids.iter().copied().map(QuestionId::new).collect()
    }

    #[test]
    fn rejects_degenerate_definitions() {
        assert_eq!(
            ExamBlueprint::new(ExamId::new(1), "Math", 0, qs(&[1])).unwrap_err(),
            ExamError::ZeroDuration
        );
        assert_eq!(
            ExamBlueprint::new(ExamId::new(1), "Math", 600, Vec::new()).unwrap_err(),
            ExamError::EmptyQuestionSet
        );
    }

    #[test]
    fn membership_checks_use_the_question_universe() {
        let exam = ExamBlueprint::new(ExamId::new(1), "Math", 600, qs(&[10, 11, 12])).unwrap();
        assert!(exam.contains_question(QuestionId::new(11)));
        assert!(!exam.contains_question(QuestionId::new(99)));
        assert_eq!(exam.question_count(), 3);
    }
}
