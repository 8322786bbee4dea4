use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use lms_core::model::{
    AnswerMap, AuthoredQuiz, CourseId, CourseSession, LessonId, Question, QuestionId,
    QuestionReview, Quiz, QuizId, QuizResult,
};

use crate::client::{ApiError, CompletionAck, CourseApi, QuizApi};

/// Endpoint selector for failure injection and call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    FetchCourse,
    FetchQuiz,
    SubmitQuiz,
    CompleteLesson,
    Heartbeat,
    SaveQuiz,
}

#[derive(Default)]
struct State {
    sessions: HashMap<CourseId, CourseSession>,
    quizzes: HashMap<LessonId, Quiz>,
    failures: HashMap<Endpoint, VecDeque<ApiError>>,
    calls: HashMap<Endpoint, usize>,
    completions: Vec<(CourseId, LessonId)>,
    submissions: Vec<(QuizId, AnswerMap)>,
    heartbeats: Vec<(CourseId, u64)>,
    next_id: u64,
}

/// In-memory stand-in for the learning backend, for tests and prototyping.
///
/// Grades submissions and records completions like the real server does, counts
/// calls per endpoint, and can be told to fail upcoming calls.
#[derive(Clone)]
pub struct InMemoryApi {
    state: Arc<Mutex<State>>,
}

impl Default for InMemoryApi {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryApi {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                next_id: 10_000,
                ..State::default()
            })),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, ApiError> {
        self.state
            .lock()
            .map_err(|e| ApiError::Transport(e.to_string()))
    }

    /// Seeding and inspection keep working after a panicking test poisoned the lock.
    fn inspect(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_call(&self, endpoint: Endpoint) -> Result<MutexGuard<'_, State>, ApiError> {
        let mut guard = self.lock()?;
        *guard.calls.entry(endpoint).or_default() += 1;
        if let Some(err) = guard
            .failures
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        Ok(guard)
    }

    /// Seed a course session (server-side view, including completed lessons).
    pub fn put_course(&self, session: CourseSession) {
        let mut guard = self.inspect();
        guard.sessions.insert(session.course_id(), session);
    }

    pub fn put_quiz(&self, quiz: Quiz) {
        let mut guard = self.inspect();
        guard.quizzes.insert(quiz.lesson_id, quiz);
    }

    /// Queue an error for the next call to `endpoint`. Errors are consumed in order.
    pub fn push_failure(&self, endpoint: Endpoint, error: ApiError) {
        let mut guard = self.inspect();
        guard.failures.entry(endpoint).or_default().push_back(error);
    }

    /// Number of calls made to `endpoint`, failed ones included.
    #[must_use]
    pub fn calls(&self, endpoint: Endpoint) -> usize {
        let guard = self.inspect();
        guard.calls.get(&endpoint).copied().unwrap_or(0)
    }

    /// Successful completion requests, in order.
    #[must_use]
    pub fn completions(&self) -> Vec<(CourseId, LessonId)> {
        self.inspect().completions.clone()
    }

    #[must_use]
    pub fn submissions(&self) -> Vec<(QuizId, AnswerMap)> {
        self.inspect().submissions.clone()
    }

    #[must_use]
    pub fn heartbeats(&self) -> Vec<(CourseId, u64)> {
        self.inspect().heartbeats.clone()
    }
}

fn grade(quiz: &Quiz, answers: &AnswerMap) -> QuizResult {
    let review: Vec<QuestionReview> = quiz
        .questions
        .iter()
        .map(|q| {
            let chosen = answers.get(q.id);
            QuestionReview {
                question_id: q.id,
                question_text: q.text.clone(),
                chosen,
                correct: q.correct_option,
                is_correct: chosen == Some(q.correct_option),
            }
        })
        .collect();

    let total_count = review.len();
    let correct_count = review.iter().filter(|r| r.is_correct).count();
    #[allow(clippy::cast_precision_loss)]
    let score = correct_count as f64 / total_count as f64 * 100.0;

    QuizResult {
        passed: quiz.passing_score.is_met_by(score),
        score,
        correct_count,
        total_count,
        review,
    }
}

#[async_trait]
impl CourseApi for InMemoryApi {
    async fn fetch_course_session(&self, course_id: CourseId) -> Result<CourseSession, ApiError> {
        let guard = self.begin_call(Endpoint::FetchCourse)?;
        guard
            .sessions
            .get(&course_id)
            .cloned()
            .ok_or(ApiError::NotFound)
    }

    async fn complete_lesson(
        &self,
        course_id: CourseId,
        lesson_id: LessonId,
    ) -> Result<CompletionAck, ApiError> {
        let mut guard = self.begin_call(Endpoint::CompleteLesson)?;
        let session = guard
            .sessions
            .get_mut(&course_id)
            .ok_or(ApiError::NotFound)?;
        if session.lesson(lesson_id).is_none() {
            return Err(ApiError::Status {
                status: 400,
                message: "Lesson not found".into(),
            });
        }
        session.mark_completed(lesson_id);
        let ack = CompletionAck {
            message: Some("Lesson marked as completed".into()),
            progress: Some(session.progress().percent),
            completed_lesson_ids: Some(session.completed_ids().iter().copied().collect()),
        };
        guard.completions.push((course_id, lesson_id));
        Ok(ack)
    }

    async fn report_heartbeat(&self, course_id: CourseId, seconds: u64) -> Result<(), ApiError> {
        let mut guard = self.begin_call(Endpoint::Heartbeat)?;
        guard.heartbeats.push((course_id, seconds));
        Ok(())
    }
}

#[async_trait]
impl QuizApi for InMemoryApi {
    async fn fetch_quiz(&self, lesson_id: LessonId) -> Result<Option<Quiz>, ApiError> {
        let guard = self.begin_call(Endpoint::FetchQuiz)?;
        Ok(guard.quizzes.get(&lesson_id).cloned())
    }

    async fn submit_quiz(
        &self,
        quiz_id: QuizId,
        answers: &AnswerMap,
    ) -> Result<QuizResult, ApiError> {
        let mut guard = self.begin_call(Endpoint::SubmitQuiz)?;
        let quiz = guard
            .quizzes
            .values()
            .find(|q| q.id == quiz_id)
            .cloned()
            .ok_or(ApiError::NotFound)?;
        if !quiz.is_authored() {
            return Err(ApiError::Status {
                status: 400,
                message: "Quiz has no questions".into(),
            });
        }

        let result = grade(&quiz, answers);
        guard.submissions.push((quiz_id, answers.clone()));

        // The server records the lesson as completed on a passing attempt.
        if result.passed {
            if let Some(session) = guard
                .sessions
                .values_mut()
                .find(|s| s.lesson(quiz.lesson_id).is_some())
            {
                session.mark_completed(quiz.lesson_id);
            }
        }
        Ok(result)
    }

    async fn save_quiz(&self, lesson_id: LessonId, quiz: &AuthoredQuiz) -> Result<Quiz, ApiError> {
        let mut guard = self.begin_call(Endpoint::SaveQuiz)?;
        let quiz_id = match guard.quizzes.get(&lesson_id) {
            Some(existing) => existing.id,
            None => {
                guard.next_id += 1;
                QuizId::new(guard.next_id)
            }
        };

        let mut questions = Vec::with_capacity(quiz.questions.len());
        for draft in &quiz.questions {
            guard.next_id += 1;
            questions.push(Question {
                id: QuestionId::new(guard.next_id),
                text: draft.text.clone(),
                options: draft.options.clone(),
                correct_option: draft.correct_option,
            });
        }

        let saved = Quiz {
            id: quiz_id,
            lesson_id,
            passing_score: quiz.passing_score,
            questions,
        };
        guard.quizzes.insert(lesson_id, saved.clone());
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_core::model::{Course, Lesson, PassingScore, QuestionDraft, QuizDraft};

    fn course() -> CourseSession {
        CourseSession::new(
            Course {
                id: CourseId::new(1),
                title: "Course".into(),
                description: None,
            },
            vec![Lesson {
                id: LessonId::new(5),
                title: "Intro".into(),
                content: String::new(),
                media_url: None,
                position: 1,
            }],
            [],
        )
    }

    fn quiz() -> Quiz {
        Quiz {
            id: QuizId::new(3),
            lesson_id: LessonId::new(5),
            passing_score: PassingScore::new(70).unwrap(),
            questions: vec![
                Question {
                    id: QuestionId::new(31),
                    text: "Q1".into(),
                    options: vec!["a".into(), "b".into()],
                    correct_option: 1,
                },
                Question {
                    id: QuestionId::new(32),
                    text: "Q2".into(),
                    options: vec!["a".into(), "b".into()],
                    correct_option: 0,
                },
                Question {
                    id: QuestionId::new(33),
                    text: "Q3".into(),
                    options: vec!["a".into(), "b".into()],
                    correct_option: 0,
                },
            ],
        }
    }

    #[tokio::test]
    async fn grades_like_the_server() {
        let api = InMemoryApi::new();
        api.put_course(course());
        api.put_quiz(quiz());

        let answers: AnswerMap = [
            (QuestionId::new(31), 1),
            (QuestionId::new(32), 0),
            (QuestionId::new(33), 1),
        ]
        .into_iter()
        .collect();
        let result = api.submit_quiz(QuizId::new(3), &answers).await.unwrap();
        assert_eq!(result.correct_count, 2);
        assert_eq!(result.total_count, 3);
        assert!(!result.passed, "66.7% is below 70%");
        assert_eq!(result.review[2].chosen, Some(1));
        assert!(!result.review[2].is_correct);
    }

    #[tokio::test]
    async fn passing_attempt_completes_lesson_server_side() {
        let api = InMemoryApi::new();
        api.put_course(course());
        api.put_quiz(quiz());

        let answers: AnswerMap = [
            (QuestionId::new(31), 1),
            (QuestionId::new(32), 0),
            (QuestionId::new(33), 0),
        ]
        .into_iter()
        .collect();
        let result = api.submit_quiz(QuizId::new(3), &answers).await.unwrap();
        assert!(result.passed);
        let session = api.fetch_course_session(CourseId::new(1)).await.unwrap();
        assert!(session.is_completed(LessonId::new(5)));
    }

    #[tokio::test]
    async fn missing_quiz_is_none() {
        let api = InMemoryApi::new();
        assert_eq!(api.fetch_quiz(LessonId::new(99)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let api = InMemoryApi::new();
        api.put_course(course());
        api.push_failure(Endpoint::CompleteLesson, ApiError::Transport("down".into()));

        let err = api
            .complete_lesson(CourseId::new(1), LessonId::new(5))
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::Transport("down".into()));

        let ack = api
            .complete_lesson(CourseId::new(1), LessonId::new(5))
            .await
            .unwrap();
        assert_eq!(ack.completed_lesson_ids, Some(vec![LessonId::new(5)]));
        assert_eq!(ack.progress, Some(100.0));
        assert_eq!(api.calls(Endpoint::CompleteLesson), 2);
        assert_eq!(api.completions().len(), 1);
    }

    #[tokio::test]
    async fn save_quiz_keeps_quiz_id_on_update() {
        let api = InMemoryApi::new();
        let authored = QuizDraft {
            passing_score: 60,
            questions: vec![QuestionDraft {
                text: "Pick b".into(),
                options: vec!["a".into(), "b".into()],
                correct_option: 1,
            }],
        }
        .validate()
        .unwrap();

        let first = api.save_quiz(LessonId::new(5), &authored).await.unwrap();
        let second = api.save_quiz(LessonId::new(5), &authored).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.questions.len(), 1);
        assert_ne!(first.questions[0].id, second.questions[0].id);
        assert_eq!(
            api.fetch_quiz(LessonId::new(5)).await.unwrap(),
            Some(second)
        );
    }
}
