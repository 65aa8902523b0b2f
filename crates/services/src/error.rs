//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::{ContestError, SessionError};
use storage::repository::StorageError;

/// Errors emitted by the grading collaborator boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GradingError {
    #[error("grading service is not configured")]
    Disabled,
    #[error("grading request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("grading service returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Errors emitted by `SessionRunner`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunnerError {
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The grading collaborator was unreachable or errored. Retryable: the
    /// session stays `Submitting` and its answers are never lost.
    #[error("submission failed")]
    SubmissionFailed(#[source] GradingError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ContestService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ContestServiceError {
    #[error(transparent)]
    Contest(#[from] ContestError),

    #[error("no participation for this contest and user")]
    NotEnrolled,

    #[error(transparent)]
    Storage(#[from] StorageError),
}
