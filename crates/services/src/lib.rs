#![forbid(unsafe_code)]

pub mod contest_service;
pub mod error;
pub mod grading;
pub mod session_runner;
pub mod stats_service;
pub mod submission;

pub use exam_core::Clock;

pub use contest_service::ContestService;
pub use error::{ContestServiceError, GradingError, RunnerError};
pub use grading::{
    GradedResult, GradingClient, HttpGraderConfig, HttpGradingClient, IdempotencyKey,
    PayloadAnswer, QuestionFeedback, SubmissionPayload,
};
pub use session_runner::{SessionRunner, TickAdvance};
pub use stats_service::StatsService;
pub use submission::SubmissionPipeline;
