use std::sync::Arc;

use api::QuizApi;
use lms_core::model::{LessonId, Quiz, QuizDraft};

use crate::error::AuthoringError;

/// Instructor-side quiz editing: validates drafts and saves them.
#[derive(Clone)]
pub struct QuizAuthoring {
    quizzes: Arc<dyn QuizApi>,
}

impl QuizAuthoring {
    #[must_use]
    pub fn new(quizzes: Arc<dyn QuizApi>) -> Self {
        Self { quizzes }
    }

    /// Validate `draft` and save it as the quiz of `lesson_id`.
    ///
    /// # Errors
    ///
    /// Returns `AuthoringError::Draft` without a network call when the draft
    /// is invalid, or `AuthoringError::Api` when saving fails.
    pub async fn save(&self, lesson_id: LessonId, draft: QuizDraft) -> Result<Quiz, AuthoringError> {
        let authored = draft.validate()?;
        let saved = self.quizzes.save_quiz(lesson_id, &authored).await?;
        tracing::info!(
            %lesson_id,
            quiz_id = %saved.id,
            questions = saved.question_count(),
            "quiz saved"
        );
        Ok(saved)
    }
}
