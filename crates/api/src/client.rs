use std::sync::Arc;

use async_trait::async_trait;
use lms_core::model::{
    AnswerMap, AuthoredQuiz, CourseId, CourseSession, LessonId, Quiz, QuizId, QuizResult,
};
use thiserror::Error;

/// Errors surfaced by the remote learning API.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ApiError {
    #[error("not found")]
    NotFound,

    /// The server rejected our credentials. The session must end.
    #[error("session expired")]
    Unauthorized,

    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    #[must_use]
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// Short text suitable for a dismissible notice.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { message, .. } if !message.trim().is_empty() => message.clone(),
            ApiError::Unauthorized => "Your session has expired. Please sign in again.".into(),
            ApiError::NotFound => "The requested item no longer exists.".into(),
            _ => "Something went wrong. Please try again.".into(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

/// Server acknowledgement of a lesson completion.
///
/// The server may echo its authoritative list of completed lessons and the new
/// course progress; both are optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionAck {
    pub message: Option<String>,
    pub progress: Option<f64>,
    pub completed_lesson_ids: Option<Vec<LessonId>>,
}

/// Course-viewing endpoints.
#[async_trait]
pub trait CourseApi: Send + Sync {
    /// Fetch a course with its lessons and the learner's completed lesson ids.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the course is missing or the learner is
    /// not enrolled, or other transport errors.
    async fn fetch_course_session(&self, course_id: CourseId) -> Result<CourseSession, ApiError>;

    /// Mark a lesson completed. Idempotent on the server.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    async fn complete_lesson(
        &self,
        course_id: CourseId,
        lesson_id: LessonId,
    ) -> Result<CompletionAck, ApiError>;

    /// Report elapsed viewing time. Best-effort.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    async fn report_heartbeat(&self, course_id: CourseId, seconds: u64) -> Result<(), ApiError>;
}

/// Quiz endpoints.
#[async_trait]
pub trait QuizApi: Send + Sync {
    /// Fetch the quiz attached to a lesson. `Ok(None)` when the lesson has none.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` for transport or server failures. A missing quiz is not an error.
    async fn fetch_quiz(&self, lesson_id: LessonId) -> Result<Option<Quiz>, ApiError>;

    /// Grade a submission.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    async fn submit_quiz(&self, quiz_id: QuizId, answers: &AnswerMap)
    -> Result<QuizResult, ApiError>;

    /// Create or replace the quiz of a lesson.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    async fn save_quiz(&self, lesson_id: LessonId, quiz: &AuthoredQuiz) -> Result<Quiz, ApiError>;
}

/// Aggregates the API traits behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Api {
    pub courses: Arc<dyn CourseApi>,
    pub quizzes: Arc<dyn QuizApi>,
}

impl Api {
    #[must_use]
    pub fn new(courses: Arc<dyn CourseApi>, quizzes: Arc<dyn QuizApi>) -> Self {
        Self { courses, quizzes }
    }

    #[must_use]
    pub fn in_memory(api: &crate::memory::InMemoryApi) -> Self {
        let courses: Arc<dyn CourseApi> = Arc::new(api.clone());
        let quizzes: Arc<dyn QuizApi> = Arc::new(api.clone());
        Self { courses, quizzes }
    }

    /// Build an `Api` talking to the REST backend.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Transport` if the HTTP client cannot be built.
    pub fn http(config: crate::http::ApiConfig) -> Result<Self, ApiError> {
        let api = crate::http::HttpApi::new(config)?;
        let courses: Arc<dyn CourseApi> = Arc::new(api.clone());
        let quizzes: Arc<dyn QuizApi> = Arc::new(api);
        Ok(Self { courses, quizzes })
    }
}
