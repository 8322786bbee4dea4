mod course;
mod ids;
pub mod media;
mod quiz;

pub use ids::{CourseId, LessonId, ParseIdError, QuestionId, QuizId};

pub use course::{Course, CourseSession, Lesson, LessonCompletion};
pub use media::{MediaKind, VideoId, classify};
pub use quiz::{
    AnswerMap, AuthoredQuiz, PassingScore, Question, QuestionDraft, QuestionReview, Quiz,
    QuizDraft, QuizDraftError, QuizResult,
};
