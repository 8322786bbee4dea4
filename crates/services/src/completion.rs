use std::collections::BTreeSet;

use api::{ApiError, CompletionAck};
use lms_core::Clock;
use lms_core::model::{CourseSession, LessonCompletion, LessonId};

use crate::quiz_session::QuizRequirement;

/// Why a completion attempt was refused. Guidance for the learner, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocker {
    FinishVideo,
    PassQuiz,
    QuizUnavailable,
}

impl Blocker {
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Blocker::FinishVideo => "Finish the video first.",
            Blocker::PassQuiz => "Pass the quiz first.",
            Blocker::QuizUnavailable => "The quiz could not be loaded. Reopen the lesson to try again.",
        }
    }
}

/// Snapshot of the lesson-local preconditions, taken when completion is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionConditions {
    /// Media is a streaming video, so playback has to finish first.
    pub playback_gated: bool,
    pub playback_finished: bool,
    pub quiz: QuizRequirement,
}

/// Permission to issue one completion request. Hand it back to
/// [`CompletionGate::finish`] with the response.
#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub struct CompletionTicket {
    lesson_id: LessonId,
}

impl CompletionTicket {
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum GateDecision {
    Proceed(CompletionTicket),
    AlreadyCompleted,
    InFlight,
    Blocked(Blocker),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    NotCompleted,
    Completing,
    Completed,
}

/// Result of a full completion attempt as seen by the viewer.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    Completed(LessonCompletion),
    AlreadyCompleted,
    InFlight,
    Blocked(Blocker),
    /// The request failed; the lesson is back to `NotCompleted` and may be retried.
    Failed(ApiError),
}

/// Decides whether a lesson may be completed and applies acknowledgements.
///
/// The completed set lives in the `CourseSession` passed to each call; the
/// gate itself only tracks requests in flight. A ticket that is never handed
/// back keeps its lesson `Completing`, so callers must not drop the future
/// between `begin` and `finish`.
#[derive(Debug, Default)]
pub struct CompletionGate {
    clock: Clock,
    in_flight: BTreeSet<LessonId>,
    history: Vec<LessonCompletion>,
}

impl CompletionGate {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            in_flight: BTreeSet::new(),
            history: Vec::new(),
        }
    }

    #[must_use]
    pub fn state(&self, session: &CourseSession, lesson_id: LessonId) -> GateState {
        if session.is_completed(lesson_id) {
            GateState::Completed
        } else if self.in_flight.contains(&lesson_id) {
            GateState::Completing
        } else {
            GateState::NotCompleted
        }
    }

    /// Check preconditions and, if they hold, move the lesson to `Completing`.
    pub fn begin(
        &mut self,
        session: &CourseSession,
        lesson_id: LessonId,
        conditions: CompletionConditions,
    ) -> GateDecision {
        match self.state(session, lesson_id) {
            GateState::Completed => return GateDecision::AlreadyCompleted,
            GateState::Completing => return GateDecision::InFlight,
            GateState::NotCompleted => {}
        }

        if conditions.playback_gated && !conditions.playback_finished {
            return GateDecision::Blocked(Blocker::FinishVideo);
        }
        match conditions.quiz {
            QuizRequirement::Pending => return GateDecision::Blocked(Blocker::PassQuiz),
            QuizRequirement::Unavailable => {
                return GateDecision::Blocked(Blocker::QuizUnavailable);
            }
            QuizRequirement::NotRequired | QuizRequirement::Passed => {}
        }

        self.in_flight.insert(lesson_id);
        GateDecision::Proceed(CompletionTicket { lesson_id })
    }

    /// Apply the server's answer to a completion request.
    ///
    /// On success the lesson joins the completed set, which is replaced by the
    /// server's list when one comes back. On failure the lesson returns to
    /// `NotCompleted`.
    ///
    /// # Errors
    ///
    /// Passes the request's `ApiError` through.
    pub fn finish(
        &mut self,
        ticket: CompletionTicket,
        session: &mut CourseSession,
        response: Result<CompletionAck, ApiError>,
    ) -> Result<LessonCompletion, ApiError> {
        let lesson_id = ticket.lesson_id;
        self.in_flight.remove(&lesson_id);

        let ack = response?;
        if let Some(ids) = ack.completed_lesson_ids {
            session.sync_completed(ids);
        }
        session.mark_completed(lesson_id);

        let completion = LessonCompletion {
            lesson_id,
            completed_at: self.clock.now(),
        };
        self.history.push(completion.clone());
        Ok(completion)
    }

    /// Completions acknowledged through this gate, oldest first.
    #[must_use]
    pub fn history(&self) -> &[LessonCompletion] {
        &self.history
    }
}
