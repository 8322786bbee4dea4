use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::model::ids::{CourseId, LessonId};
use crate::model::media::{MediaKind, classify};
use crate::progress::CourseProgress;

//
// ─── COURSE & LESSON ───────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    pub description: Option<String>,
}

/// A single lesson as loaded into a viewing session. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lesson {
    pub id: LessonId,
    pub title: String,
    pub content: String,
    pub media_url: Option<String>,
    pub position: u32,
}

impl Lesson {
    #[must_use]
    pub fn media_kind(&self) -> MediaKind {
        classify(self.media_url.as_deref())
    }
}

/// Acknowledged completion of a lesson.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonCompletion {
    pub lesson_id: LessonId,
    pub completed_at: DateTime<Utc>,
}

//
// ─── COURSE SESSION ────────────────────────────────────────────────────────────
//

/// One learner's view of a course: ordered lessons plus completed lesson ids.
///
/// Lessons are kept in `position` order (stable for equal positions). The
/// completed set never holds duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseSession {
    course: Course,
    lessons: Vec<Lesson>,
    completed: BTreeSet<LessonId>,
}

impl CourseSession {
    #[must_use]
    pub fn new(
        course: Course,
        mut lessons: Vec<Lesson>,
        completed: impl IntoIterator<Item = LessonId>,
    ) -> Self {
        lessons.sort_by_key(|lesson| lesson.position);
        Self {
            course,
            lessons,
            completed: completed.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn course(&self) -> &Course {
        &self.course
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course.id
    }

    #[must_use]
    pub fn lessons(&self) -> &[Lesson] {
        &self.lessons
    }

    #[must_use]
    pub fn lesson(&self, id: LessonId) -> Option<&Lesson> {
        self.lessons.iter().find(|lesson| lesson.id == id)
    }

    #[must_use]
    pub fn first_lesson(&self) -> Option<&Lesson> {
        self.lessons.first()
    }

    /// The lesson following `id` in course order, if any.
    #[must_use]
    pub fn next_lesson(&self, id: LessonId) -> Option<&Lesson> {
        let idx = self.lessons.iter().position(|lesson| lesson.id == id)?;
        self.lessons.get(idx + 1)
    }

    #[must_use]
    pub fn completed_ids(&self) -> &BTreeSet<LessonId> {
        &self.completed
    }

    #[must_use]
    pub fn is_completed(&self, id: LessonId) -> bool {
        self.completed.contains(&id)
    }

    /// Adds a completed lesson id. Returns `true` if it was not already present.
    pub fn mark_completed(&mut self, id: LessonId) -> bool {
        self.completed.insert(id)
    }

    /// Replace the completed set with an authoritative list from the server.
    pub fn sync_completed(&mut self, ids: impl IntoIterator<Item = LessonId>) {
        self.completed = ids.into_iter().collect();
    }

    /// Fresh progress derived from the current completed set.
    #[must_use]
    pub fn progress(&self) -> CourseProgress {
        CourseProgress::compute(self.completed.iter().copied(), self.lessons.len())
    }
}
