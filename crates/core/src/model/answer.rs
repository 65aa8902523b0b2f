use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{OptionId, QuestionId};

/// The value a test-taker supplied for one question.
///
/// Exactly one form is populated: selected option ids for choice questions
/// (always a sequence, even for single choice) or free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerValue {
    Selected(Vec<OptionId>),
    Text(String),
}

impl AnswerValue {
    /// Single-choice convenience constructor.
    #[must_use]
    pub fn selected_one(option: OptionId) -> Self {
        Self::Selected(vec![option])
    }

    /// Returns true when the value carries no actual answer content.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            AnswerValue::Selected(options) => options.is_empty(),
            AnswerValue::Text(text) => text.trim().is_empty(),
        }
    }
}

/// One question's captured answer inside a session.
///
/// Owned by its `ExamSession`; mutated only through the session's
/// `set_answer` and `toggle_flag` operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    pub question_id: QuestionId,
    pub value: AnswerValue,
    pub flagged: bool,
    pub last_modified: DateTime<Utc>,
}
