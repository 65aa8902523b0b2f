use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{AnswerValue, ExamId, QuestionId, SessionStatus};

/// Persisted answer entry inside a [`SessionSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotAnswer {
    pub value: AnswerValue,
    pub flagged: bool,
    pub last_modified: DateTime<Utc>,
}

/// Serialized, restorable copy of a session's in-progress state.
///
/// Map and set fields are encoded as ordered pair/element lists so the
/// snapshot store never has to understand native associative types. The
/// encoding is order-stable: entries are sorted by question id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub exam_id: ExamId,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_seconds: u32,
    pub answers: Vec<(QuestionId, SnapshotAnswer)>,
    pub flagged_questions: Vec<QuestionId>,
    pub current_question_index: usize,
    pub status: SessionStatus,
    pub last_saved_at: Option<DateTime<Utc>>,
}
