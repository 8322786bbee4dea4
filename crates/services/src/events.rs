use std::collections::VecDeque;

use lms_core::CourseProgress;
use lms_core::model::LessonId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Dismissible message for the learner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    #[must_use]
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, message)
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }
}

/// Something the renderer should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    Notice(Notice),
    /// Playback finished and the lesson's quiz still has to be passed.
    AssessmentRequested(LessonId),
    LessonCompleted {
        lesson_id: LessonId,
        progress: CourseProgress,
    },
    /// Credentials were rejected; the session is over.
    SignedOut,
}

/// FIFO of viewer events, drained by whoever renders them.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<ViewerEvent>,
}

impl EventQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ViewerEvent) {
        self.events.push_back(event);
    }

    pub fn notify(&mut self, notice: Notice) {
        self.push(ViewerEvent::Notice(notice));
    }

    /// Takes all pending events in emission order.
    pub fn drain(&mut self) -> Vec<ViewerEvent> {
        self.events.drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
