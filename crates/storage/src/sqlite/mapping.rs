use exam_core::model::{ContestId, ParticipationStatus, UserId};
use exam_core::stats::SubmissionKind;

use crate::repository::StorageError;

pub(super) fn id_i64(field: &'static str, value: u64) -> Result<i64, StorageError> {
    i64::try_from(value).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(super) fn ser<E: core::fmt::Display>(err: E) -> StorageError {
    StorageError::Serialization(err.to_string())
}

pub(super) fn conn<E: core::fmt::Display>(err: E) -> StorageError {
    StorageError::Connection(err.to_string())
}

pub(super) fn contest_id_from_i64(value: i64) -> Result<ContestId, StorageError> {
    u64::try_from(value)
        .map(ContestId::new)
        .map_err(|_| StorageError::Serialization(format!("invalid contest_id: {value}")))
}

pub(super) fn user_id_from_i64(value: i64) -> Result<UserId, StorageError> {
    u64::try_from(value)
        .map(UserId::new)
        .map_err(|_| StorageError::Serialization(format!("invalid user_id: {value}")))
}

pub(super) fn status_to_str(status: ParticipationStatus) -> &'static str {
    match status {
        ParticipationStatus::Active => "active",
        ParticipationStatus::Completed => "completed",
        ParticipationStatus::Invalidated => "invalidated",
    }
}

pub(super) fn status_from_str(raw: &str) -> Result<ParticipationStatus, StorageError> {
    match raw {
        "active" => Ok(ParticipationStatus::Active),
        "completed" => Ok(ParticipationStatus::Completed),
        "invalidated" => Ok(ParticipationStatus::Invalidated),
        other => Err(StorageError::Serialization(format!(
            "invalid participation status: {other}"
        ))),
    }
}

pub(super) fn kind_to_str(kind: SubmissionKind) -> &'static str {
    match kind {
        SubmissionKind::Contest => "contest",
        SubmissionKind::ClassPractice => "practice_class",
        SubmissionKind::GlobalPractice => "practice_global",
    }
}

pub(super) fn kind_from_str(raw: &str) -> Result<SubmissionKind, StorageError> {
    match raw {
        "contest" => Ok(SubmissionKind::Contest),
        "practice_class" => Ok(SubmissionKind::ClassPractice),
        "practice_global" => Ok(SubmissionKind::GlobalPractice),
        other => Err(StorageError::Serialization(format!(
            "invalid submission kind: {other}"
        ))),
    }
}
