//! Shared error types for the services crate.

use std::time::Duration;

use thiserror::Error;

use api::ApiError;
use lms_core::model::{LessonId, QuestionId, QuizDraftError};

/// Errors emitted by `QuizSession`.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum QuizSessionError {
    #[error("no quiz is loaded for this lesson")]
    NotLoaded,
    #[error("this quiz has no questions yet")]
    Unauthored,
    #[error("quiz already submitted; reset to try again")]
    AlreadySubmitted,
    #[error("answer all questions before submitting ({answered} of {total} answered)")]
    Incomplete { answered: usize, total: usize },
    #[error("question {0} is not part of this quiz")]
    UnknownQuestion(QuestionId),
    #[error("question {question} has {available} options, got option {option}")]
    OptionOutOfRange {
        question: QuestionId,
        option: usize,
        available: usize,
    },
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl QuizSessionError {
    /// Local validation failures never reached the network.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            QuizSessionError::Incomplete { .. }
                | QuizSessionError::UnknownQuestion(_)
                | QuizSessionError::OptionOutOfRange { .. }
        )
    }
}

/// Errors reported by a `PlayerHost`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PlayerError {
    #[error("player is not available: {0}")]
    Unavailable(String),
    #[error("player runtime was not ready after {0:?}")]
    ReadyTimeout(Duration),
    #[error("player could not attach to {container_id}: {reason}")]
    Attach {
        container_id: String,
        reason: String,
    },
}

/// Errors emitted by `QuizAuthoring`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthoringError {
    #[error(transparent)]
    Draft(#[from] QuizDraftError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors emitted by `CourseViewer`.
///
/// Transient transport failures are turned into notices and do not show up
/// here; only session-ending and caller errors do.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ViewerError {
    #[error("session expired")]
    AuthExpired,
    #[error("lesson {0} is not part of this course")]
    LessonNotFound(LessonId),
    #[error("no lesson is active")]
    NoActiveLesson,
    #[error(transparent)]
    Quiz(#[from] QuizSessionError),
    #[error(transparent)]
    Api(#[from] ApiError),
}
