use std::sync::Arc;

use api::{Api, ApiError};
use lms_core::model::{
    Course, CourseId, CourseSession, Lesson, LessonCompletion, LessonId, QuestionId, QuizResult,
};
use lms_core::{Clock, CourseProgress};

use crate::completion::{
    CompletionConditions, CompletionGate, CompletionOutcome, GateDecision, GateState,
};
use crate::config::ViewerConfig;
use crate::error::{QuizSessionError, ViewerError};
use crate::events::{EventQueue, Notice, ViewerEvent};
use crate::heartbeat::Heartbeat;
use crate::playback::{AttachmentToken, PlaybackWatcher, PlayerHost, PlayerState, WatchState};
use crate::quiz_session::{QuizRequirement, QuizSession};

/// One learner's viewing session of a course.
///
/// Owns the course session, the active lesson's quiz and player, the
/// completion gate, the heartbeat and the event queue. All operations take
/// `&mut self`, so handlers run one at a time.
///
/// Transient API failures become [`Notice`]s in the event queue. A rejected
/// credential ends the session: [`ViewerEvent::SignedOut`] is queued, the
/// heartbeat and player are torn down, and every later call returns
/// [`ViewerError::AuthExpired`].
pub struct CourseViewer {
    api: Api,
    session: CourseSession,
    active: Option<LessonId>,
    quiz: QuizSession,
    watcher: PlaybackWatcher,
    gate: CompletionGate,
    heartbeat: Option<Heartbeat>,
    events: EventQueue,
    signed_out: bool,
}

impl CourseViewer {
    /// Load a course, start the heartbeat and activate the first lesson not yet
    /// completed (or the first lesson when all are done).
    ///
    /// # Errors
    ///
    /// Returns `ViewerError::AuthExpired` when credentials are rejected and
    /// `ViewerError::Api` when the course cannot be loaded.
    pub async fn open(
        api: Api,
        player: Arc<dyn PlayerHost>,
        config: ViewerConfig,
        clock: Clock,
        course_id: CourseId,
    ) -> Result<Self, ViewerError> {
        let session = match api.courses.fetch_course_session(course_id).await {
            Ok(session) => session,
            Err(err) if err.is_auth_expired() => return Err(ViewerError::AuthExpired),
            Err(err) => return Err(err.into()),
        };
        tracing::info!(
            %course_id,
            lessons = session.lessons().len(),
            completed = session.completed_ids().len(),
            "course opened"
        );

        let heartbeat = Heartbeat::start(
            Arc::clone(&api.courses),
            course_id,
            config.heartbeat_interval,
        );
        let start = session
            .lessons()
            .iter()
            .find(|lesson| !session.is_completed(lesson.id))
            .or_else(|| session.first_lesson())
            .map(|lesson| lesson.id);

        let mut viewer = Self {
            quiz: QuizSession::new(Arc::clone(&api.quizzes)),
            watcher: PlaybackWatcher::new(player, config.player_ready_timeout),
            gate: CompletionGate::new(clock),
            heartbeat: Some(heartbeat),
            events: EventQueue::new(),
            active: None,
            signed_out: false,
            session,
            api,
        };
        if let Some(lesson_id) = start {
            viewer.activate_lesson(lesson_id).await?;
        }
        Ok(viewer)
    }

    #[must_use]
    pub fn course(&self) -> &Course {
        self.session.course()
    }

    #[must_use]
    pub fn session(&self) -> &CourseSession {
        &self.session
    }

    #[must_use]
    pub fn active_lesson(&self) -> Option<&Lesson> {
        self.active.and_then(|id| self.session.lesson(id))
    }

    /// Progress computed from the current completed set.
    #[must_use]
    pub fn progress(&self) -> CourseProgress {
        self.session.progress()
    }

    #[must_use]
    pub fn quiz(&self) -> &QuizSession {
        &self.quiz
    }

    #[must_use]
    pub fn player(&self) -> &PlaybackWatcher {
        &self.watcher
    }

    #[must_use]
    pub fn gate_state(&self, lesson_id: LessonId) -> GateState {
        self.gate.state(&self.session, lesson_id)
    }

    /// Completions acknowledged during this session.
    #[must_use]
    pub fn completions(&self) -> &[LessonCompletion] {
        self.gate.history()
    }

    #[must_use]
    pub fn is_signed_out(&self) -> bool {
        self.signed_out
    }

    #[must_use]
    pub fn is_heartbeat_running(&self) -> bool {
        self.heartbeat.as_ref().is_some_and(Heartbeat::is_running)
    }

    /// Take all pending events for rendering.
    pub fn drain_events(&mut self) -> Vec<ViewerEvent> {
        self.events.drain()
    }

    /// Make `lesson_id` the active lesson.
    ///
    /// The previous player is destroyed and the quiz state dropped before
    /// anything is loaded for the new lesson. The player mounts in the
    /// background, so the quiz is loaded without waiting on it. Re-selecting
    /// the active lesson only retries a quiz that failed to load.
    ///
    /// # Errors
    ///
    /// Returns `LessonNotFound` for ids outside the course and `AuthExpired`
    /// once the session has ended.
    pub async fn activate_lesson(&mut self, lesson_id: LessonId) -> Result<(), ViewerError> {
        self.ensure_signed_in()?;
        let lesson = self
            .session
            .lesson(lesson_id)
            .cloned()
            .ok_or(ViewerError::LessonNotFound(lesson_id))?;

        if self.active == Some(lesson_id) {
            self.watcher.attach(&lesson);
            if self.quiz.load_error().is_some() {
                self.load_quiz(lesson_id).await?;
            }
            return Ok(());
        }

        self.watcher.reset();
        self.quiz.clear();
        self.active = Some(lesson_id);
        tracing::info!(%lesson_id, title = %lesson.title, "lesson activated");

        self.watcher.attach(&lesson);
        self.load_quiz(lesson_id).await
    }

    /// Wait until the active lesson's player has mounted or given up waiting
    /// on the runtime. Other operations never wait on the player.
    pub async fn await_player(&mut self) -> WatchState {
        self.watcher.wait_attached().await
    }

    /// Activate the lesson after the active one. `Ok(None)` on the last lesson.
    ///
    /// # Errors
    ///
    /// See [`CourseViewer::activate_lesson`].
    pub async fn select_next(&mut self) -> Result<Option<LessonId>, ViewerError> {
        let Some(current) = self.active else {
            return Err(ViewerError::NoActiveLesson);
        };
        let Some(next) = self.session.next_lesson(current).map(|l| l.id) else {
            return Ok(None);
        };
        self.activate_lesson(next).await?;
        Ok(Some(next))
    }

    /// Activate the lesson before the active one. `Ok(None)` on the first lesson.
    ///
    /// # Errors
    ///
    /// See [`CourseViewer::activate_lesson`].
    pub async fn select_previous(&mut self) -> Result<Option<LessonId>, ViewerError> {
        let Some(current) = self.active else {
            return Err(ViewerError::NoActiveLesson);
        };
        let lessons = self.session.lessons();
        let previous = lessons
            .iter()
            .position(|l| l.id == current)
            .and_then(|idx| idx.checked_sub(1))
            .and_then(|idx| lessons.get(idx))
            .map(|l| l.id);
        let Some(previous) = previous else {
            return Ok(None);
        };
        self.activate_lesson(previous).await?;
        Ok(Some(previous))
    }

    /// Feed a player state change reported by the host.
    ///
    /// The first end of the active lesson's video either asks for the quiz or
    /// attempts completion. Changes from stale players are ignored.
    ///
    /// # Errors
    ///
    /// Returns `AuthExpired` if completing the lesson hits rejected credentials.
    pub async fn handle_player_state(
        &mut self,
        token: AttachmentToken,
        state: PlayerState,
    ) -> Result<Option<CompletionOutcome>, ViewerError> {
        if self.signed_out {
            return Ok(None);
        }
        let Some(ended) = self.watcher.on_state_change(token, state) else {
            return Ok(None);
        };
        tracing::info!(lesson_id = %ended.lesson_id, "playback ended");

        if self.quiz.requirement() == QuizRequirement::Pending {
            self.events
                .push(ViewerEvent::AssessmentRequested(ended.lesson_id));
            return Ok(None);
        }
        self.attempt_complete().await.map(Some)
    }

    /// Restart the active lesson's ended video. A granted completion stays.
    pub fn replay(&mut self) -> bool {
        self.watcher.replay()
    }

    /// # Errors
    ///
    /// See [`QuizSession::select_option`].
    pub fn select_option(
        &mut self,
        question_id: QuestionId,
        option: usize,
    ) -> Result<(), ViewerError> {
        self.ensure_signed_in()?;
        Ok(self.quiz.select_option(question_id, option)?)
    }

    pub fn next_question(&mut self) {
        self.quiz.advance();
    }

    pub fn previous_question(&mut self) {
        self.quiz.retreat();
    }

    /// Clear the last attempt so the quiz can be taken again.
    pub fn retry_quiz(&mut self) {
        self.quiz.reset();
    }

    /// Submit the active lesson's quiz. A pass immediately attempts completion.
    ///
    /// Returns `Ok(None)` when grading failed in transit; a notice is queued
    /// and the answers are kept.
    ///
    /// # Errors
    ///
    /// Returns `ViewerError::Quiz` for local validation failures and
    /// `AuthExpired` when credentials are rejected.
    pub async fn submit_quiz(&mut self) -> Result<Option<QuizResult>, ViewerError> {
        self.ensure_signed_in()?;
        let result = match self.quiz.submit().await.cloned() {
            Ok(result) => result,
            Err(QuizSessionError::Api(err)) => {
                self.surface(err)?;
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        if result.passed {
            self.events.notify(Notice::success(format!(
                "Quiz passed with {:.0}%.",
                result.score
            )));
            self.attempt_complete().await?;
        } else {
            let required = self.quiz.quiz().map_or(0, |q| q.passing_score.value());
            self.events.notify(Notice::warning(format!(
                "You scored {:.0}%. {required}% is needed to pass.",
                result.score
            )));
        }
        Ok(Some(result))
    }

    /// Try to complete the active lesson.
    ///
    /// Blocked attempts and repeated attempts never reach the network. The
    /// completed check reads the live course session.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveLesson` without an active lesson and `AuthExpired`
    /// when credentials are rejected. Other request failures come back as
    /// `CompletionOutcome::Failed`.
    pub async fn attempt_complete(&mut self) -> Result<CompletionOutcome, ViewerError> {
        self.ensure_signed_in()?;
        let lesson_id = self.active.ok_or(ViewerError::NoActiveLesson)?;
        let conditions = self.conditions(lesson_id)?;

        let ticket = match self.gate.begin(&self.session, lesson_id, conditions) {
            GateDecision::Proceed(ticket) => ticket,
            GateDecision::AlreadyCompleted => return Ok(CompletionOutcome::AlreadyCompleted),
            GateDecision::InFlight => return Ok(CompletionOutcome::InFlight),
            GateDecision::Blocked(blocker) => {
                tracing::debug!(%lesson_id, ?blocker, "completion blocked");
                self.events.notify(Notice::info(blocker.message()));
                return Ok(CompletionOutcome::Blocked(blocker));
            }
        };

        let course_id = self.session.course_id();
        let response = self.api.courses.complete_lesson(course_id, lesson_id).await;
        let message = response.as_ref().ok().and_then(|ack| ack.message.clone());

        match self.gate.finish(ticket, &mut self.session, response) {
            Ok(completion) => {
                let progress = self.session.progress();
                tracing::info!(%lesson_id, percent = progress.percent, "lesson completed");
                self.events.notify(Notice::success(
                    message.unwrap_or_else(|| "Lesson completed.".into()),
                ));
                self.events.push(ViewerEvent::LessonCompleted {
                    lesson_id,
                    progress,
                });
                Ok(CompletionOutcome::Completed(completion))
            }
            Err(err) => {
                tracing::warn!(%lesson_id, error = %err, "lesson completion failed");
                self.surface(err.clone())?;
                Ok(CompletionOutcome::Failed(err))
            }
        }
    }

    /// Stop the heartbeat and tear down the active lesson.
    pub fn close(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop();
        }
        self.watcher.reset();
        self.quiz.clear();
        self.active = None;
    }

    fn conditions(&self, lesson_id: LessonId) -> Result<CompletionConditions, ViewerError> {
        let lesson = self
            .session
            .lesson(lesson_id)
            .ok_or(ViewerError::LessonNotFound(lesson_id))?;
        let quiz = if self.quiz.lesson_id() == Some(lesson_id) {
            self.quiz.requirement()
        } else {
            QuizRequirement::Unavailable
        };
        Ok(CompletionConditions {
            playback_gated: lesson.media_kind().is_playback_gated(),
            playback_finished: self.watcher.has_finished(lesson_id),
            quiz,
        })
    }

    async fn load_quiz(&mut self, lesson_id: LessonId) -> Result<(), ViewerError> {
        match self.quiz.load(lesson_id).await.map(|_| ()) {
            Ok(()) => Ok(()),
            Err(QuizSessionError::Api(err)) => self.surface(err),
            Err(err) => Err(err.into()),
        }
    }

    /// Turn an API failure into a notice, or end the session on rejected credentials.
    fn surface(&mut self, err: ApiError) -> Result<(), ViewerError> {
        if err.is_auth_expired() {
            self.sign_out();
            return Err(ViewerError::AuthExpired);
        }
        self.events.notify(Notice::error(err.user_message()));
        Ok(())
    }

    fn sign_out(&mut self) {
        if self.signed_out {
            return;
        }
        tracing::warn!(
            course_id = %self.session.course_id(),
            "credentials rejected, ending session"
        );
        self.signed_out = true;
        self.close();
        self.events.push(ViewerEvent::SignedOut);
    }

    fn ensure_signed_in(&self) -> Result<(), ViewerError> {
        if self.signed_out {
            Err(ViewerError::AuthExpired)
        } else {
            Ok(())
        }
    }
}

impl Drop for CourseViewer {
    fn drop(&mut self) {
        self.close();
    }
}
