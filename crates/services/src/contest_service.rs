//! Enrollment, sequential subject unlock, and leaderboard computation over
//! the participation repository.

use std::sync::Arc;

use tracing::{info, warn};

use exam_core::leaderboard::{LeaderboardEntry, rank_participations};
use exam_core::model::{ContestDefinition, ContestId, ContestParticipation, ExamId, UserId};
use exam_core::time::Clock;
use storage::repository::ParticipationRepository;

use crate::error::ContestServiceError;

/// Orchestrates contest participations against their repository.
pub struct ContestService {
    clock: Clock,
    participations: Arc<dyn ParticipationRepository>,
}

impl ContestService {
    #[must_use]
    pub fn new(clock: Clock, participations: Arc<dyn ParticipationRepository>) -> Self {
        Self {
            clock,
            participations,
        }
    }

    /// Enroll a user in a contest. Idempotent: re-enrolling returns the
    /// existing participation untouched, progress intact.
    ///
    /// # Errors
    ///
    /// Returns `ContestServiceError::Storage` for repository failures.
    pub async fn enroll(
        &self,
        definition: &ContestDefinition,
        user_id: UserId,
    ) -> Result<ContestParticipation, ContestServiceError> {
        let contest_id = definition.contest_id();
        if let Some(existing) = self
            .participations
            .get_participation(contest_id, user_id)
            .await?
        {
            return Ok(existing);
        }

        let participation = ContestParticipation::enroll(definition, user_id, self.clock.now());
        self.participations
            .upsert_participation(&participation)
            .await?;
        info!(%contest_id, %user_id, "enrolled in contest");
        Ok(participation)
    }

    async fn load(
        &self,
        contest_id: ContestId,
        user_id: UserId,
    ) -> Result<ContestParticipation, ContestServiceError> {
        self.participations
            .get_participation(contest_id, user_id)
            .await?
            .ok_or(ContestServiceError::NotEnrolled)
    }

    /// Enter the subject at `order`, enforcing sequential unlock.
    ///
    /// Returns the exam to run for that subject.
    ///
    /// # Errors
    ///
    /// `ContestServiceError::NotEnrolled` for unknown participations, plus
    /// the `ContestError` taxonomy for locked or already-run subjects.
    pub async fn begin_subject(
        &self,
        contest_id: ContestId,
        user_id: UserId,
        order: usize,
    ) -> Result<ExamId, ContestServiceError> {
        let mut participation = self.load(contest_id, user_id).await?;
        let exam_id = participation.begin_subject(order)?;
        self.participations
            .upsert_participation(&participation)
            .await?;
        Ok(exam_id)
    }

    /// Record a graded subject score, finalizing the participation when it
    /// was the last one.
    ///
    /// # Errors
    ///
    /// `ContestServiceError::NotEnrolled` for unknown participations, plus
    /// the `ContestError` taxonomy for out-of-lifecycle subjects.
    pub async fn record_result(
        &self,
        contest_id: ContestId,
        user_id: UserId,
        order: usize,
        score: f64,
    ) -> Result<ContestParticipation, ContestServiceError> {
        let mut participation = self.load(contest_id, user_id).await?;
        participation.record_submitted(order, score)?;
        self.participations
            .upsert_participation(&participation)
            .await?;
        info!(
            %contest_id,
            %user_id,
            order,
            score,
            status = ?participation.status(),
            "subject result recorded"
        );
        Ok(participation)
    }

    /// Apply an integrity-violation signal to a participation. One-way.
    ///
    /// # Errors
    ///
    /// `ContestServiceError::NotEnrolled` for unknown participations.
    pub async fn invalidate(
        &self,
        contest_id: ContestId,
        user_id: UserId,
    ) -> Result<(), ContestServiceError> {
        let mut participation = self.load(contest_id, user_id).await?;
        participation.invalidate();
        self.participations
            .upsert_participation(&participation)
            .await?;
        warn!(%contest_id, %user_id, "participation invalidated");
        Ok(())
    }

    /// Compute the contest leaderboard and persist the assigned ranks.
    ///
    /// # Errors
    ///
    /// Returns `ContestServiceError::Storage` for repository failures.
    pub async fn leaderboard(
        &self,
        contest_id: ContestId,
    ) -> Result<Vec<LeaderboardEntry>, ContestServiceError> {
        let participations = self.participations.list_for_contest(contest_id).await?;
        let board = rank_participations(&participations);

        for entry in &board {
            if let Some(mut participation) = self
                .participations
                .get_participation(contest_id, entry.user_id)
                .await?
            {
                participation.set_rank(entry.rank);
                self.participations
                    .upsert_participation(&participation)
                    .await?;
            }
        }
        Ok(board)
    }
}
