//! Boundary with the external grading collaborator.
//!
//! The core never grades anything: it normalizes a session into a payload,
//! tags it with a stable idempotency triple, and hands it off. The
//! collaborator is expected to treat a repeated triple as a no-op returning
//! the previously computed result.

use std::env;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use exam_core::model::{ContestId, ExamId, OptionId, QuestionId, SubmissionId, UserId};

use crate::error::GradingError;

/// Stable identity of a submission attempt, resent unchanged on retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyKey {
    pub exam_id: ExamId,
    pub user_id: UserId,
    pub started_at: DateTime<Utc>,
}

/// One normalized answer on the wire.
///
/// Selected options are always a sequence, even for single choice, so the
/// wire shape stays uniform; exactly one of the two fields carries content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadAnswer {
    pub question_id: QuestionId,
    pub selected_options: Vec<OptionId>,
    pub answer_text: Option<String>,
}

/// Transport-neutral submission payload handed to the grading collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionPayload {
    pub exam_id: ExamId,
    pub user_id: UserId,
    pub contest_id: Option<ContestId>,
    pub started_at: DateTime<Utc>,
    pub answers: Vec<PayloadAnswer>,
}

impl SubmissionPayload {
    /// The `(exam, user, started_at)` triple identifying this attempt.
    #[must_use]
    pub fn idempotency_key(&self) -> IdempotencyKey {
        IdempotencyKey {
            exam_id: self.exam_id,
            user_id: self.user_id,
            started_at: self.started_at,
        }
    }
}

/// Per-question outcome reported back by the grader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionFeedback {
    pub question_id: QuestionId,
    pub score: f64,
    pub feedback: Option<String>,
}

/// Scored result returned by the grading collaborator.
///
/// `final_score` is absent while manual grading is still pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedResult {
    pub submission_id: SubmissionId,
    pub objective_score: f64,
    pub final_score: Option<f64>,
    pub per_question: Vec<QuestionFeedback>,
}

/// The external grading collaborator.
#[async_trait]
pub trait GradingClient: Send + Sync {
    /// Grade one submission payload.
    ///
    /// # Errors
    ///
    /// Returns `GradingError` when the collaborator is unreachable, rejects
    /// the request, or answers with something undecodable.
    async fn grade(&self, payload: &SubmissionPayload) -> Result<GradedResult, GradingError>;
}

#[derive(Clone, Debug)]
pub struct HttpGraderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl HttpGraderConfig {
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("EXAM_GRADER_BASE_URL").ok()?;
        if base_url.trim().is_empty() {
            return None;
        }
        let api_key = env::var("EXAM_GRADER_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        Some(Self { base_url, api_key })
    }
}

/// HTTP implementation of [`GradingClient`], posting the payload as JSON.
#[derive(Clone)]
pub struct HttpGradingClient {
    client: Client,
    config: Option<HttpGraderConfig>,
}

impl HttpGradingClient {
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(HttpGraderConfig::from_env())
    }

    #[must_use]
    pub fn new(config: Option<HttpGraderConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.is_some()
    }
}

#[async_trait]
impl GradingClient for HttpGradingClient {
    async fn grade(&self, payload: &SubmissionPayload) -> Result<GradedResult, GradingError> {
        let config = self.config.as_ref().ok_or(GradingError::Disabled)?;

        let url = format!("{}/submissions", config.base_url.trim_end_matches('/'));
        let mut request = self.client.post(url).json(payload);
        if let Some(api_key) = &config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(GradingError::HttpStatus(response.status()));
        }

        let result: GradedResult = response
            .json()
            .await
            .map_err(|err| GradingError::InvalidResponse(err.to_string()))?;
        Ok(result)
    }
}
