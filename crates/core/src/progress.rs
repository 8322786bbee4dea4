use std::collections::BTreeSet;

use crate::model::LessonId;

/// Course-level completion derived from completed lesson ids.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CourseProgress {
    pub completed: usize,
    pub total: usize,
    pub percent: f64,
}

impl CourseProgress {
    /// Deduplicates `completed_ids` before counting.
    #[must_use]
    pub fn compute(completed_ids: impl IntoIterator<Item = LessonId>, total: usize) -> Self {
        let unique: BTreeSet<LessonId> = completed_ids.into_iter().collect();
        let completed = unique.len();
        Self {
            completed,
            total,
            percent: percent_of(completed, total),
        }
    }

    /// Percentage rounded half away from zero, for display.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn rounded_percent(&self) -> u8 {
        // percent is clamped to [0, 100]
        self.percent.round() as u8
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed >= self.total
    }
}

/// Completion percentage in `[0, 100]`. `total == 0` yields `0`.
#[must_use]
pub fn completion_percent(completed_ids: impl IntoIterator<Item = LessonId>, total: usize) -> f64 {
    CourseProgress::compute(completed_ids, total).percent
}

#[allow(clippy::cast_precision_loss)]
fn percent_of(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (completed as f64 * 100.0 / total as f64).clamp(0.0, 100.0)
}
