mod answer;
mod contest;
mod exam;
mod ids;
mod session;
mod snapshot;

pub use answer::{AnswerRecord, AnswerValue};
pub use contest::{
    ContestDefinition, ContestError, ContestParticipation, ContestSubject, ParticipationStatus,
    SubjectProgress, SubjectStatus,
};
pub use exam::{ExamBlueprint, ExamError};
pub use ids::{ContestId, ExamId, OptionId, ParseIdError, QuestionId, SubmissionId, UserId};
pub use session::{ExamSession, SessionError, SessionStatus, TickOutcome};
pub use snapshot::{SessionSnapshot, SnapshotAnswer};
