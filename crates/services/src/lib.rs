#![forbid(unsafe_code)]

pub mod authoring;
pub mod completion;
pub mod config;
pub mod error;
pub mod events;
pub mod heartbeat;
pub mod playback;
pub mod quiz_session;
pub mod viewer;

pub use lms_core::Clock;

pub use authoring::QuizAuthoring;
pub use completion::{
    Blocker, CompletionConditions, CompletionGate, CompletionOutcome, CompletionTicket,
    GateDecision, GateState,
};
pub use config::ViewerConfig;
pub use error::{AuthoringError, PlayerError, QuizSessionError, ViewerError};
pub use events::{EventQueue, Notice, NoticeLevel, ViewerEvent};
pub use heartbeat::Heartbeat;
pub use playback::{
    AttachRequest, AttachmentToken, PlaybackEnded, PlaybackWatcher, PlayerHandle, PlayerHost,
    PlayerState, WatchState,
};
pub use quiz_session::{QuizRequirement, QuizSession};
pub use viewer::CourseViewer;
