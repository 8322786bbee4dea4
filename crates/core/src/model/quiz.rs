use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{LessonId, QuestionId, QuizId};

//
// ─── ERRORS (authoring validation) ─────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizDraftError {
    #[error("a quiz needs at least one question")]
    NoQuestions,

    #[error("question {index} has no text")]
    EmptyQuestionText { index: usize },

    #[error("option {option} of question {question} is empty")]
    EmptyOption { question: usize, option: usize },

    #[error("question {index} needs at least two distinct options")]
    TooFewDistinctOptions { index: usize },

    #[error("question {index} marks a correct option that does not exist")]
    CorrectOptionOutOfRange { index: usize },

    #[error("passing score must be between 0 and 100, got {0}")]
    PassingScoreOutOfRange(i64),
}

//
// ─── PASSING SCORE ─────────────────────────────────────────────────────────────
//

/// Percentage threshold in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct PassingScore(u8);

impl PassingScore {
    pub const DEFAULT: PassingScore = PassingScore(70);

    /// # Errors
    ///
    /// Returns `QuizDraftError::PassingScoreOutOfRange` outside `0..=100`.
    pub fn new(raw: i64) -> Result<Self, QuizDraftError> {
        match u8::try_from(raw) {
            Ok(v) if v <= 100 => Ok(Self(v)),
            _ => Err(QuizDraftError::PassingScoreOutOfRange(raw)),
        }
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn is_met_by(self, score: f64) -> bool {
        score >= f64::from(self.0)
    }
}

impl Default for PassingScore {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<i64> for PassingScore {
    type Error = QuizDraftError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<PassingScore> for u8 {
    fn from(score: PassingScore) -> Self {
        score.0
    }
}

//
// ─── QUIZ ──────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    pub options: Vec<String>,
    pub correct_option: usize,
}

impl Question {
    #[must_use]
    pub fn option(&self, index: usize) -> Option<&str> {
        self.options.get(index).map(String::as_str)
    }
}

/// A lesson's assessment, consumed read-only by the learner flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quiz {
    pub id: QuizId,
    pub lesson_id: LessonId,
    pub passing_score: PassingScore,
    pub questions: Vec<Question>,
}

impl Quiz {
    /// A quiz without questions has not been authored yet and does not gate anything.
    #[must_use]
    pub fn is_authored(&self) -> bool {
        !self.questions.is_empty()
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }
}

//
// ─── ANSWERS & RESULTS ─────────────────────────────────────────────────────────
//

/// Learner's chosen option per question. One entry per question id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerMap(BTreeMap<QuestionId, usize>);

impl AnswerMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the answer for `question`.
    pub fn select(&mut self, question: QuestionId, option: usize) {
        self.0.insert(question, option);
    }

    #[must_use]
    pub fn get(&self, question: QuestionId) -> Option<usize> {
        self.0.get(&question).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (QuestionId, usize)> + '_ {
        self.0.iter().map(|(q, o)| (*q, *o))
    }
}

impl FromIterator<(QuestionId, usize)> for AnswerMap {
    fn from_iter<I: IntoIterator<Item = (QuestionId, usize)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionReview {
    pub question_id: QuestionId,
    pub question_text: String,
    pub chosen: Option<usize>,
    pub correct: usize,
    pub is_correct: bool,
}

/// Grading outcome for one submission. Produced by the grading service.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizResult {
    pub passed: bool,
    pub score: f64,
    pub correct_count: usize,
    pub total_count: usize,
    pub review: Vec<QuestionReview>,
}

//
// ─── AUTHORING DRAFT ───────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDraft {
    pub text: String,
    pub options: Vec<String>,
    #[serde(rename = "correctOptionIndex")]
    pub correct_option: usize,
}

/// Unvalidated quiz as edited by an instructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizDraft {
    pub passing_score: i64,
    pub questions: Vec<QuestionDraft>,
}

/// A draft that passed validation and can be saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthoredQuiz {
    pub passing_score: PassingScore,
    pub questions: Vec<QuestionDraft>,
}

impl QuizDraft {
    /// # Errors
    ///
    /// Returns the first `QuizDraftError` found, in question order.
    pub fn validate(self) -> Result<AuthoredQuiz, QuizDraftError> {
        let passing_score = PassingScore::new(self.passing_score)?;
        if self.questions.is_empty() {
            return Err(QuizDraftError::NoQuestions);
        }

        for (index, question) in self.questions.iter().enumerate() {
            if question.text.trim().is_empty() {
                return Err(QuizDraftError::EmptyQuestionText { index });
            }
            if let Some(option) = question.options.iter().position(|o| o.trim().is_empty()) {
                return Err(QuizDraftError::EmptyOption {
                    question: index,
                    option,
                });
            }
            let distinct: BTreeSet<String> = question
                .options
                .iter()
                .map(|o| o.trim().to_lowercase())
                .collect();
            if distinct.len() < 2 {
                return Err(QuizDraftError::TooFewDistinctOptions { index });
            }
            if question.correct_option >= question.options.len() {
                return Err(QuizDraftError::CorrectOptionOutOfRange { index });
            }
        }

        Ok(AuthoredQuiz {
            passing_score,
            questions: self.questions,
        })
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
