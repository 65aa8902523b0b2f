//! Rank and percentile computation over finalized contest participations.

use crate::model::{ContestParticipation, ParticipationStatus, UserId};

/// One row of a contest leaderboard.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub total_score: f64,
    pub completed_count: usize,
    /// 1-based dense rank; strictly increasing with no gaps.
    pub rank: u32,
    /// `100 * (1 - (rank - 1) / n)`, clamped to `[0, 100]`.
    pub percentile: f64,
}

/// Rank participations by total score, earlier enrollment winning ties.
///
/// Invalidated participations are excluded before ranking. `enrolled_at` is
/// unique per participation, so the ordering is total and deterministic; the
/// user id only backstops pathological equal-timestamp data.
#[must_use]
pub fn rank_participations(participations: &[ContestParticipation]) -> Vec<LeaderboardEntry> {
    let mut eligible: Vec<&ContestParticipation> = participations
        .iter()
        .filter(|p| p.status() != ParticipationStatus::Invalidated)
        .collect();

    eligible.sort_by(|a, b| {
        b.total_score()
            .total_cmp(&a.total_score())
            .then_with(|| a.enrolled_at().cmp(&b.enrolled_at()))
            .then_with(|| a.user_id().cmp(&b.user_id()))
    });

    let total = eligible.len();
    eligible
        .into_iter()
        .enumerate()
        .map(|(index, participation)| {
            let rank = index as u32 + 1;
            LeaderboardEntry {
                user_id: participation.user_id(),
                total_score: participation.total_score(),
                completed_count: participation.completed_count(),
                rank,
                percentile: percentile_for(rank, total),
            }
        })
        .collect()
}

fn percentile_for(rank: u32, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = 100.0 * (1.0 - f64::from(rank - 1) / total as f64);
    raw.clamp(0.0, 100.0)
}
