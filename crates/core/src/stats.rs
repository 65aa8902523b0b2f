//! Rollup of a student's submission history into summary statistics.
//!
//! Pure aggregation: recomputed fresh on every call, no incremental state.
//! Callers may cache the result externally if they care.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of assessment a finalized submission belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionKind {
    Contest,
    ClassPractice,
    GlobalPractice,
}

/// One finalized submission in a student's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub subject: String,
    pub score: f64,
    pub max_score: f64,
    pub duration_minutes: u32,
    pub kind: SubmissionKind,
    pub submitted_at: DateTime<Utc>,
}

/// Summary statistics over a full submission history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryStats {
    pub total_exams: usize,
    pub avg_score: f64,
    pub total_contests: usize,
    pub total_practice: usize,
    pub highest_score: f64,
    /// Subject with the highest average score; `None` on an empty history.
    pub best_subject: Option<String>,
    pub total_time_minutes: u64,
}

/// Roll the history up into [`HistoryStats`].
///
/// `avg_score` is 0 on an empty history (no division by zero). Best subject
/// is the highest average; ties go to the subject with more entries, then
/// lexicographically by name.
#[must_use]
pub fn summarize(entries: &[HistoryEntry]) -> HistoryStats {
    let total_exams = entries.len();
    let mut sum_score = 0.0;
    let mut highest_score: f64 = 0.0;
    let mut total_time_minutes = 0_u64;
    let mut total_contests = 0;
    let mut total_practice = 0;
    let mut by_subject: BTreeMap<&str, (f64, usize)> = BTreeMap::new();

    for entry in entries {
        sum_score += entry.score;
        highest_score = highest_score.max(entry.score);
        total_time_minutes += u64::from(entry.duration_minutes);
        match entry.kind {
            SubmissionKind::Contest => total_contests += 1,
            SubmissionKind::ClassPractice | SubmissionKind::GlobalPractice => total_practice += 1,
        }
        let slot = by_subject.entry(entry.subject.as_str()).or_insert((0.0, 0));
        slot.0 += entry.score;
        slot.1 += 1;
    }

    let avg_score = if total_exams > 0 {
        sum_score / total_exams as f64
    } else {
        0.0
    };

    HistoryStats {
        total_exams,
        avg_score,
        total_contests,
        total_practice,
        highest_score,
        best_subject: best_subject(&by_subject),
        total_time_minutes,
    }
}

fn best_subject(by_subject: &BTreeMap<&str, (f64, usize)>) -> Option<String> {
    let mut best: Option<(&str, f64, usize)> = None;
    for (subject, (sum, count)) in by_subject {
        let avg = sum / *count as f64;
        let candidate = (*subject, avg, *count);
        best = match best {
            None => Some(candidate),
            Some(current) => {
                // BTreeMap iterates subjects in lexicographic order, so on a
                // full tie the earlier (smaller) name is kept.
                let better = avg > current.1 || (avg == current.1 && *count > current.2);
                if better { Some(candidate) } else { Some(current) }
            }
        };
    }
    best.map(|(subject, _, _)| subject.to_owned())
}
