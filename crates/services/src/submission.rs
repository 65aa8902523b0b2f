use std::sync::Arc;

use tracing::debug;

use exam_core::model::{AnswerValue, ContestId, ExamSession, SessionError, UserId};

use crate::error::GradingError;
use crate::grading::{GradedResult, GradingClient, PayloadAnswer, SubmissionPayload};

/// Validates and normalizes a session into a submission payload and hands it
/// to the grading collaborator.
///
/// The pipeline does not deduplicate; it only guarantees that a retry sends
/// the identical `(exam, user, started_at)` triple, so an idempotent grader
/// sees one logical submission.
#[derive(Clone)]
pub struct SubmissionPipeline {
    grader: Arc<dyn GradingClient>,
}

impl SubmissionPipeline {
    #[must_use]
    pub fn new(grader: Arc<dyn GradingClient>) -> Self {
        Self { grader }
    }

    /// Normalize the session's answers into a transport-neutral payload.
    ///
    /// Selected-option answers become an ordered option-id sequence (always
    /// a sequence, even for single choice); free-text answers populate the
    /// text field instead. Answer correctness is not inspected here.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` if the session was never
    /// started (there is no idempotency triple without `started_at`).
    pub fn build_payload(
        &self,
        session: &ExamSession,
        user_id: UserId,
        contest_id: Option<ContestId>,
    ) -> Result<SubmissionPayload, SessionError> {
        let started_at = session
            .started_at()
            .ok_or(SessionError::InvalidTransition {
                operation: "submit",
                status: session.status(),
            })?;

        let answers = session
            .answers()
            .map(|record| match record.value {
                AnswerValue::Selected(options) => PayloadAnswer {
                    question_id: record.question_id,
                    selected_options: options,
                    answer_text: None,
                },
                AnswerValue::Text(text) => PayloadAnswer {
                    question_id: record.question_id,
                    selected_options: Vec::new(),
                    answer_text: Some(text),
                },
            })
            .collect();

        Ok(SubmissionPayload {
            exam_id: session.exam_id(),
            user_id,
            contest_id,
            started_at,
            answers,
        })
    }

    /// Hand the payload to the grading collaborator.
    ///
    /// # Errors
    ///
    /// Returns `GradingError` from the collaborator; the caller may retry
    /// with the same payload.
    pub async fn submit(&self, payload: &SubmissionPayload) -> Result<GradedResult, GradingError> {
        debug!(
            exam_id = %payload.exam_id,
            user_id = %payload.user_id,
            answers = payload.answers.len(),
            "dispatching submission"
        );
        self.grader.grade(payload).await
    }
}
