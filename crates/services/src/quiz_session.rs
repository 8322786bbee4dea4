use std::sync::Arc;

use api::{ApiError, QuizApi};
use lms_core::model::{AnswerMap, LessonId, Question, QuestionId, Quiz, QuizResult};

use crate::error::QuizSessionError;

/// What the lesson's quiz means for completion right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizRequirement {
    /// No quiz, or a quiz without questions.
    NotRequired,
    /// An authored quiz exists and has not been passed.
    Pending,
    Passed,
    /// Loading failed, so whether a quiz exists is unknown.
    Unavailable,
}

#[derive(Debug)]
struct LoadedQuiz {
    quiz: Quiz,
    answers: AnswerMap,
    cursor: usize,
    result: Option<QuizResult>,
}

#[derive(Debug)]
enum QuizState {
    NotLoaded,
    Absent,
    Unavailable(ApiError),
    Loaded(LoadedQuiz),
}

/// Learner-side state of one lesson's quiz: answers, cursor, latest result.
pub struct QuizSession {
    api: Arc<dyn QuizApi>,
    lesson_id: Option<LessonId>,
    state: QuizState,
}

impl QuizSession {
    #[must_use]
    pub fn new(api: Arc<dyn QuizApi>) -> Self {
        Self {
            api,
            lesson_id: None,
            state: QuizState::NotLoaded,
        }
    }

    /// Fetch the quiz of `lesson_id`, replacing whatever was loaded.
    ///
    /// A lesson without a quiz yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `QuizSessionError::Api` on transport or server failures. The
    /// session is then `Unavailable` until the next load.
    pub async fn load(&mut self, lesson_id: LessonId) -> Result<Option<&Quiz>, QuizSessionError> {
        self.clear();
        self.lesson_id = Some(lesson_id);

        match self.api.fetch_quiz(lesson_id).await {
            Ok(Some(quiz)) => {
                tracing::debug!(%lesson_id, questions = quiz.question_count(), "quiz loaded");
                self.state = QuizState::Loaded(LoadedQuiz {
                    quiz,
                    answers: AnswerMap::new(),
                    cursor: 0,
                    result: None,
                });
                Ok(self.quiz())
            }
            Ok(None) => {
                self.state = QuizState::Absent;
                Ok(None)
            }
            Err(err) => {
                tracing::warn!(%lesson_id, error = %err, "quiz could not be loaded");
                self.state = QuizState::Unavailable(err.clone());
                Err(err.into())
            }
        }
    }

    /// Forget the loaded quiz. Used when another lesson becomes active.
    pub fn clear(&mut self) {
        self.lesson_id = None;
        self.state = QuizState::NotLoaded;
    }

    #[must_use]
    pub fn lesson_id(&self) -> Option<LessonId> {
        self.lesson_id
    }

    #[must_use]
    pub fn quiz(&self) -> Option<&Quiz> {
        match &self.state {
            QuizState::Loaded(loaded) => Some(&loaded.quiz),
            _ => None,
        }
    }

    #[must_use]
    pub fn load_error(&self) -> Option<&ApiError> {
        match &self.state {
            QuizState::Unavailable(err) => Some(err),
            _ => None,
        }
    }

    #[must_use]
    pub fn answers(&self) -> Option<&AnswerMap> {
        self.loaded().map(|l| &l.answers)
    }

    #[must_use]
    pub fn result(&self) -> Option<&QuizResult> {
        self.loaded().and_then(|l| l.result.as_ref())
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.loaded().map_or(0, |l| l.cursor)
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.loaded().and_then(|l| l.quiz.questions.get(l.cursor))
    }

    /// Number of quiz questions that have an answer.
    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.loaded().map_or(0, |l| {
            l.quiz
                .questions
                .iter()
                .filter(|q| l.answers.get(q.id).is_some())
                .count()
        })
    }

    #[must_use]
    pub fn requirement(&self) -> QuizRequirement {
        match &self.state {
            QuizState::NotLoaded | QuizState::Unavailable(_) => QuizRequirement::Unavailable,
            QuizState::Absent => QuizRequirement::NotRequired,
            QuizState::Loaded(l) if !l.quiz.is_authored() => QuizRequirement::NotRequired,
            QuizState::Loaded(l) if l.result.as_ref().is_some_and(|r| r.passed) => {
                QuizRequirement::Passed
            }
            QuizState::Loaded(_) => QuizRequirement::Pending,
        }
    }

    /// Record the chosen option for a question, replacing any earlier choice.
    ///
    /// # Errors
    ///
    /// Returns `NotLoaded`, `AlreadySubmitted`, `UnknownQuestion` or
    /// `OptionOutOfRange`.
    pub fn select_option(
        &mut self,
        question_id: QuestionId,
        option: usize,
    ) -> Result<(), QuizSessionError> {
        let loaded = self.loaded_mut()?;
        if loaded.result.is_some() {
            return Err(QuizSessionError::AlreadySubmitted);
        }
        let question = loaded
            .quiz
            .question(question_id)
            .ok_or(QuizSessionError::UnknownQuestion(question_id))?;
        if option >= question.options.len() {
            return Err(QuizSessionError::OptionOutOfRange {
                question: question_id,
                option,
                available: question.options.len(),
            });
        }
        loaded.answers.select(question_id, option);
        Ok(())
    }

    /// Move to the next question; no-op on the last one.
    pub fn advance(&mut self) {
        if let Ok(loaded) = self.loaded_mut() {
            if loaded.cursor + 1 < loaded.quiz.questions.len() {
                loaded.cursor += 1;
            }
        }
    }

    /// Move to the previous question; no-op on the first one.
    pub fn retreat(&mut self) {
        if let Ok(loaded) = self.loaded_mut() {
            loaded.cursor = loaded.cursor.saturating_sub(1);
        }
    }

    /// Send the answers for grading.
    ///
    /// Every question must be answered; otherwise nothing is sent.
    ///
    /// # Errors
    ///
    /// Returns `Incomplete`, `Unauthored`, `AlreadySubmitted` or `NotLoaded`
    /// without a network call, and `Api` when grading fails. A failed call
    /// leaves answers in place for a retry.
    pub async fn submit(&mut self) -> Result<&QuizResult, QuizSessionError> {
        let loaded = match &mut self.state {
            QuizState::Loaded(loaded) => loaded,
            _ => return Err(QuizSessionError::NotLoaded),
        };
        if !loaded.quiz.is_authored() {
            return Err(QuizSessionError::Unauthored);
        }
        if loaded.result.is_some() {
            return Err(QuizSessionError::AlreadySubmitted);
        }

        let total = loaded.quiz.question_count();
        let answered = loaded
            .quiz
            .questions
            .iter()
            .filter(|q| loaded.answers.get(q.id).is_some())
            .count();
        if answered < total {
            return Err(QuizSessionError::Incomplete { answered, total });
        }

        let result = self
            .api
            .submit_quiz(loaded.quiz.id, &loaded.answers)
            .await?;
        tracing::info!(
            quiz_id = %loaded.quiz.id,
            passed = result.passed,
            score = result.score,
            "quiz graded"
        );
        Ok(&*loaded.result.insert(result))
    }

    /// Clear answers and result and go back to the first question.
    pub fn reset(&mut self) {
        if let Ok(loaded) = self.loaded_mut() {
            loaded.answers.clear();
            loaded.result = None;
            loaded.cursor = 0;
        }
    }

    fn loaded(&self) -> Option<&LoadedQuiz> {
        match &self.state {
            QuizState::Loaded(loaded) => Some(loaded),
            _ => None,
        }
    }

    fn loaded_mut(&mut self) -> Result<&mut LoadedQuiz, QuizSessionError> {
        match &mut self.state {
            QuizState::Loaded(loaded) => Ok(loaded),
            _ => Err(QuizSessionError::NotLoaded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api::{Endpoint, InMemoryApi};
    use lms_core::model::{PassingScore, QuizId};

    fn quiz(lesson: u64, questions: usize) -> Quiz {
        Quiz {
            id: QuizId::new(lesson * 10),
            lesson_id: LessonId::new(lesson),
            passing_score: PassingScore::DEFAULT,
            questions: (0..questions)
                .map(|i| Question {
                    id: QuestionId::new(lesson * 100 + i as u64),
                    text: format!("Q{i}"),
                    options: vec!["a".into(), "b".into(), "c".into()],
                    correct_option: 1,
                })
                .collect(),
        }
    }

    fn session(api: &InMemoryApi) -> QuizSession {
        QuizSession::new(Arc::new(api.clone()))
    }

    #[tokio::test]
    async fn missing_quiz_is_not_required() {
        let api = InMemoryApi::new();
        let mut s = session(&api);
        assert!(s.load(LessonId::new(1)).await.unwrap().is_none());
        assert_eq!(s.requirement(), QuizRequirement::NotRequired);
    }

    #[tokio::test]
    async fn load_failure_is_unavailable() {
        let api = InMemoryApi::new();
        api.put_quiz(quiz(1, 2));
        api.push_failure(Endpoint::FetchQuiz, ApiError::Transport("down".into()));
        let mut s = session(&api);

        let err = s.load(LessonId::new(1)).await.unwrap_err();
        assert_eq!(err, QuizSessionError::Api(ApiError::Transport("down".into())));
        assert_eq!(s.requirement(), QuizRequirement::Unavailable);
        assert!(s.load_error().is_some());

        assert!(s.load(LessonId::new(1)).await.unwrap().is_some());
        assert_eq!(s.requirement(), QuizRequirement::Pending);
    }

    #[tokio::test]
    async fn incomplete_submission_issues_no_call() {
        let api = InMemoryApi::new();
        api.put_quiz(quiz(1, 3));
        let mut s = session(&api);
        s.load(LessonId::new(1)).await.unwrap();

        s.select_option(QuestionId::new(100), 1).unwrap();
        s.select_option(QuestionId::new(101), 1).unwrap();
        let err = s.submit().await.unwrap_err();
        assert_eq!(err, QuizSessionError::Incomplete { answered: 2, total: 3 });
        assert!(err.is_validation());
        assert_eq!(api.calls(Endpoint::SubmitQuiz), 0);
    }

    #[tokio::test]
    async fn select_option_validates_bounds() {
        let api = InMemoryApi::new();
        api.put_quiz(quiz(1, 1));
        let mut s = session(&api);
        assert_eq!(
            s.select_option(QuestionId::new(100), 0),
            Err(QuizSessionError::NotLoaded)
        );
        s.load(LessonId::new(1)).await.unwrap();

        assert_eq!(
            s.select_option(QuestionId::new(999), 0),
            Err(QuizSessionError::UnknownQuestion(QuestionId::new(999)))
        );
        assert!(matches!(
            s.select_option(QuestionId::new(100), 3),
            Err(QuizSessionError::OptionOutOfRange { available: 3, .. })
        ));
        s.select_option(QuestionId::new(100), 0).unwrap();
        s.select_option(QuestionId::new(100), 2).unwrap();
        assert_eq!(s.answers().unwrap().get(QuestionId::new(100)), Some(2));
        assert_eq!(s.answered_count(), 1);
    }

    #[tokio::test]
    async fn cursor_is_clamped() {
        let api = InMemoryApi::new();
        api.put_quiz(quiz(1, 2));
        let mut s = session(&api);
        s.load(LessonId::new(1)).await.unwrap();

        s.retreat();
        assert_eq!(s.cursor(), 0);
        s.advance();
        s.advance();
        assert_eq!(s.cursor(), 1);
        assert_eq!(s.current_question().map(|q| q.id), Some(QuestionId::new(101)));
    }

    #[tokio::test]
    async fn passing_then_reset() {
        let api = InMemoryApi::new();
        api.put_quiz(quiz(1, 2));
        let mut s = session(&api);
        s.load(LessonId::new(1)).await.unwrap();
        s.select_option(QuestionId::new(100), 1).unwrap();
        s.select_option(QuestionId::new(101), 1).unwrap();

        let result = s.submit().await.unwrap();
        assert!(result.passed);
        assert_eq!(result.score, 100.0);
        assert_eq!(s.requirement(), QuizRequirement::Passed);
        assert_eq!(s.submit().await.unwrap_err(), QuizSessionError::AlreadySubmitted);

        s.advance();
        s.reset();
        assert!(s.result().is_none());
        assert_eq!(s.answered_count(), 0);
        assert_eq!(s.cursor(), 0);
        assert_eq!(s.requirement(), QuizRequirement::Pending);
    }

    #[tokio::test]
    async fn failed_attempt_keeps_quiz_pending() {
        let api = InMemoryApi::new();
        api.put_quiz(quiz(1, 2));
        let mut s = session(&api);
        s.load(LessonId::new(1)).await.unwrap();
        s.select_option(QuestionId::new(100), 1).unwrap();
        s.select_option(QuestionId::new(101), 0).unwrap();

        let result = s.submit().await.unwrap();
        assert!(!result.passed);
        assert_eq!(s.requirement(), QuizRequirement::Pending);
    }

    #[tokio::test]
    async fn unauthored_quiz_cannot_be_submitted() {
        let api = InMemoryApi::new();
        api.put_quiz(quiz(1, 0));
        let mut s = session(&api);
        s.load(LessonId::new(1)).await.unwrap();

        assert_eq!(s.requirement(), QuizRequirement::NotRequired);
        assert_eq!(s.submit().await.unwrap_err(), QuizSessionError::Unauthored);
        assert_eq!(api.calls(Endpoint::SubmitQuiz), 0);
    }

    #[tokio::test]
    async fn grading_failure_keeps_answers() {
        let api = InMemoryApi::new();
        api.put_quiz(quiz(1, 1));
        api.push_failure(Endpoint::SubmitQuiz, ApiError::Transport("reset".into()));
        let mut s = session(&api);
        s.load(LessonId::new(1)).await.unwrap();
        s.select_option(QuestionId::new(100), 1).unwrap();

        assert!(matches!(s.submit().await, Err(QuizSessionError::Api(_))));
        assert_eq!(s.answered_count(), 1);
        assert!(s.submit().await.unwrap().passed);
    }
}
