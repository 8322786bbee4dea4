//! Wire shapes of the REST backend and their mapping into domain types.
//!
//! The backend is loose about shapes: ids come as numbers or numeric strings,
//! lists may be missing or `null`. Everything is normalized here so the domain
//! never sees those variations.

use lms_core::model::{
    Course, CourseId, CourseSession, Lesson, LessonId, PassingScore, Question, QuestionId,
    QuestionReview, Quiz, QuizId, QuizResult,
};
use serde::{Deserialize, Serialize};

use crate::client::{ApiError, CompletionAck};

fn decode<E: core::fmt::Display>(e: E) -> ApiError {
    ApiError::Decode(e.to_string())
}

/// Id as sent by the backend: a JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireId {
    Number(u64),
    Text(String),
}

impl WireId {
    fn value(&self, field: &'static str) -> Result<u64, ApiError> {
        match self {
            WireId::Number(v) => Ok(*v),
            WireId::Text(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| ApiError::Decode(format!("{field}: not an id: {s:?}"))),
        }
    }
}

fn lesson_ids(ids: Option<Vec<WireId>>) -> Result<Vec<LessonId>, ApiError> {
    ids.unwrap_or_default()
        .iter()
        .map(|id| id.value("completedLessonIds").map(LessonId::new))
        .collect()
}

//
// ─── COURSE SESSION ────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CourseDto {
    id: WireId,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LessonDto {
    id: WireId,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    media_url: Option<String>,
    #[serde(default)]
    position: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CourseSessionDto {
    course: CourseDto,
    #[serde(default)]
    lessons: Option<Vec<LessonDto>>,
    #[serde(default)]
    completed_lesson_ids: Option<Vec<WireId>>,
}

impl CourseSessionDto {
    pub(crate) fn into_session(self) -> Result<CourseSession, ApiError> {
        let course = Course {
            id: CourseId::new(self.course.id.value("course.id")?),
            title: self.course.title.unwrap_or_default(),
            description: self.course.description,
        };

        let lessons = self
            .lessons
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(idx, dto)| {
                // Lessons without a position keep their server order.
                let fallback = u32::try_from(idx + 1).unwrap_or(u32::MAX);
                Ok(Lesson {
                    id: LessonId::new(dto.id.value("lesson.id")?),
                    title: dto.title.unwrap_or_default(),
                    content: dto.content.unwrap_or_default(),
                    media_url: dto.media_url.filter(|u| !u.trim().is_empty()),
                    position: dto.position.unwrap_or(fallback),
                })
            })
            .collect::<Result<Vec<_>, ApiError>>()?;

        let completed = lesson_ids(self.completed_lesson_ids)?;
        Ok(CourseSession::new(course, lessons, completed))
    }
}

//
// ─── COMPLETION ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CompletionDto {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    completed_lesson_ids: Option<Vec<WireId>>,
}

impl CompletionDto {
    pub(crate) fn into_ack(self) -> Result<CompletionAck, ApiError> {
        let completed_lesson_ids = match self.completed_lesson_ids {
            Some(ids) => Some(lesson_ids(Some(ids))?),
            None => None,
        };
        Ok(CompletionAck {
            message: self.message,
            progress: self.progress,
            completed_lesson_ids,
        })
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct HeartbeatBody {
    pub(crate) seconds: u64,
}

//
// ─── QUIZ ──────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuestionDto {
    id: WireId,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    options: Option<Vec<String>>,
    #[serde(default)]
    correct_option_index: Option<usize>,
}

impl QuestionDto {
    fn into_question(self) -> Result<Question, ApiError> {
        let id = QuestionId::new(self.id.value("question.id")?);
        let correct_option = self.correct_option_index.ok_or_else(|| {
            ApiError::Decode(format!("question {id}: missing correctOptionIndex"))
        })?;
        Ok(Question {
            id,
            text: self.text.unwrap_or_default(),
            options: self.options.unwrap_or_default(),
            correct_option,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuizDto {
    id: WireId,
    #[serde(default)]
    passing_score: Option<i64>,
    #[serde(default)]
    questions: Option<Vec<QuestionDto>>,
}

impl QuizDto {
    pub(crate) fn into_quiz(self, lesson_id: LessonId) -> Result<Quiz, ApiError> {
        let passing_score = match self.passing_score {
            Some(raw) => PassingScore::new(raw).map_err(decode)?,
            None => PassingScore::DEFAULT,
        };
        let questions = self
            .questions
            .unwrap_or_default()
            .into_iter()
            .map(QuestionDto::into_question)
            .collect::<Result<Vec<_>, ApiError>>()?;

        Ok(Quiz {
            id: QuizId::new(self.id.value("quiz.id")?),
            lesson_id,
            passing_score,
            questions,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReviewDto {
    question_id: WireId,
    #[serde(default)]
    question_text: Option<String>,
    #[serde(default)]
    student_answer: Option<usize>,
    correct_answer: usize,
    is_correct: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmissionDto {
    passed: bool,
    score: f64,
    #[serde(default)]
    correct_count: Option<usize>,
    #[serde(default)]
    total_count: Option<usize>,
    #[serde(default)]
    results: Option<Vec<ReviewDto>>,
}

impl SubmissionDto {
    pub(crate) fn into_result(self) -> Result<QuizResult, ApiError> {
        let review = self
            .results
            .unwrap_or_default()
            .into_iter()
            .map(|r| {
                Ok(QuestionReview {
                    question_id: QuestionId::new(r.question_id.value("questionId")?),
                    question_text: r.question_text.unwrap_or_default(),
                    chosen: r.student_answer,
                    correct: r.correct_answer,
                    is_correct: r.is_correct,
                })
            })
            .collect::<Result<Vec<_>, ApiError>>()?;

        let correct_count = self
            .correct_count
            .unwrap_or_else(|| review.iter().filter(|r| r.is_correct).count());
        let total_count = self.total_count.unwrap_or(review.len());

        Ok(QuizResult {
            passed: self.passed,
            score: self.score,
            correct_count,
            total_count,
            review,
        })
    }
}

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Extract the server's `message` field, falling back to the raw body.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.trim().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_session_normalizes_ids_and_missing_lists() {
        let json = r#"{
            "course": {"id": "7", "title": "Rust 101", "description": null},
            "lessons": [
                {"id": 3, "title": "Ownership", "content": "...", "mediaUrl": "https://youtu.be/dQw4w9WgXcQ", "position": 2},
                {"id": "2", "title": "Intro", "content": null, "mediaUrl": "", "position": 1}
            ],
            "completedLessonIds": [2, "2"],
            "progress": 50.0
        }"#;
        let dto: CourseSessionDto = serde_json::from_str(json).unwrap();
        let session = dto.into_session().unwrap();

        assert_eq!(session.course_id(), CourseId::new(7));
        assert_eq!(session.lessons()[0].id, LessonId::new(2));
        assert_eq!(session.lessons()[0].media_url, None);
        assert_eq!(session.completed_ids().len(), 1);
        assert_eq!(session.progress().percent, 50.0);
    }

    #[test]
    fn course_session_without_lessons_is_empty() {
        let json = r#"{"course": {"id": 1}, "lessons": null}"#;
        let dto: CourseSessionDto = serde_json::from_str(json).unwrap();
        let session = dto.into_session().unwrap();
        assert!(session.lessons().is_empty());
        assert_eq!(session.progress().percent, 0.0);
    }

    #[test]
    fn malformed_id_is_a_decode_error() {
        let json = r#"{"course": {"id": "abc"}}"#;
        let dto: CourseSessionDto = serde_json::from_str(json).unwrap();
        assert!(matches!(dto.into_session(), Err(ApiError::Decode(_))));
    }

    #[test]
    fn quiz_defaults_passing_score() {
        let json = r#"{
            "id": 4,
            "lesson": {"id": 3, "title": "Ownership"},
            "questions": [
                {"id": 41, "text": "Who owns?", "options": ["a", "b"], "correctOptionIndex": 1}
            ]
        }"#;
        let dto: QuizDto = serde_json::from_str(json).unwrap();
        let quiz = dto.into_quiz(LessonId::new(3)).unwrap();
        assert_eq!(quiz.passing_score, PassingScore::DEFAULT);
        assert_eq!(quiz.questions[0].correct_option, 1);
        assert_eq!(quiz.lesson_id, LessonId::new(3));
    }

    #[test]
    fn question_with_null_text_still_decodes() {
        let json = r#"{
            "id": 4,
            "questions": [
                {"id": 41, "text": null, "options": null, "correctOptionIndex": 0},
                {"id": 42, "text": "Who borrows?", "options": ["a", "b"], "correctOptionIndex": 1}
            ]
        }"#;
        let dto: QuizDto = serde_json::from_str(json).unwrap();
        let quiz = dto.into_quiz(LessonId::new(3)).unwrap();
        assert_eq!(quiz.questions.len(), 2);
        assert_eq!(quiz.questions[0].text, "");
        assert!(quiz.questions[0].options.is_empty());
    }

    #[test]
    fn question_without_correct_index_names_the_question() {
        let json = r#"{"id": 4, "questions": [{"id": 41, "text": "Q", "correctOptionIndex": null}]}"#;
        let dto: QuizDto = serde_json::from_str(json).unwrap();
        let Err(ApiError::Decode(message)) = dto.into_quiz(LessonId::new(3)) else {
            panic!("expected a decode error");
        };
        assert_eq!(message, "question 41: missing correctOptionIndex");
    }

    #[test]
    fn submission_maps_review_records() {
        let json = r#"{
            "passed": false,
            "score": 50.0,
            "correctCount": 1,
            "totalCount": 2,
            "results": [
                {"questionId": 41, "questionText": "Q1", "studentAnswer": 1, "correctAnswer": 1, "isCorrect": true},
                {"questionId": "42", "questionText": "Q2", "studentAnswer": null, "correctAnswer": 0, "isCorrect": false}
            ]
        }"#;
        let dto: SubmissionDto = serde_json::from_str(json).unwrap();
        let result = dto.into_result().unwrap();
        assert!(!result.passed);
        assert_eq!(result.review.len(), 2);
        assert_eq!(result.review[1].question_id, QuestionId::new(42));
        assert_eq!(result.review[1].chosen, None);
    }

    #[test]
    fn completion_ack_keeps_server_list() {
        let json = r#"{"success": true, "message": "Lesson marked as completed", "progress": 50.0, "completedLessonIds": [1, 1, 3]}"#;
        let dto: CompletionDto = serde_json::from_str(json).unwrap();
        let ack = dto.into_ack().unwrap();
        assert_eq!(
            ack.completed_lesson_ids,
            Some(vec![LessonId::new(1), LessonId::new(1), LessonId::new(3)])
        );
        assert_eq!(ack.progress, Some(50.0));
    }

    #[test]
    fn error_message_prefers_json_message() {
        assert_eq!(
            error_message(r#"{"success": false, "message": "You are not enrolled"}"#),
            "You are not enrolled"
        );
        assert_eq!(error_message("Bad Gateway\n"), "Bad Gateway");
    }
}
