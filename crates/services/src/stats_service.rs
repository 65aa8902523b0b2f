//! Submission history recording and stats rollup over the repository.

use std::sync::Arc;

use tracing::debug;

use exam_core::model::UserId;
use exam_core::stats::{HistoryEntry, HistoryStats, summarize};
use storage::repository::{StorageError, SubmissionHistoryRepository};

/// Read side of a student's submission history.
///
/// Stats are recomputed from the full history on every call; nothing is
/// cached here.
pub struct StatsService {
    submissions: Arc<dyn SubmissionHistoryRepository>,
}

impl StatsService {
    #[must_use]
    pub fn new(submissions: Arc<dyn SubmissionHistoryRepository>) -> Self {
        Self { submissions }
    }

    /// Append one finalized submission to the user's history.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    pub async fn record_submission(
        &self,
        user_id: UserId,
        entry: &HistoryEntry,
    ) -> Result<(), StorageError> {
        self.submissions.append_submission(user_id, entry).await?;
        debug!(%user_id, subject = %entry.subject, score = entry.score, "history recorded");
        Ok(())
    }

    /// The user's full history, most recent submission first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for store-level failures.
    pub async fn history(&self, user_id: UserId) -> Result<Vec<HistoryEntry>, StorageError> {
        self.submissions.list_submissions(user_id).await
    }

    /// Roll the user's history up into summary statistics.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for store-level failures.
    pub async fn history_stats(&self, user_id: UserId) -> Result<HistoryStats, StorageError> {
        let entries = self.submissions.list_submissions(user_id).await?;
        Ok(summarize(&entries))
    }
}
