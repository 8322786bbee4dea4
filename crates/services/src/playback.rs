//! Bridge between an external, callback-driven video player and the lesson flow.
//!
//! The watcher turns the player's coarse state changes into a single
//! [`PlaybackEnded`] per lesson activation. Every attachment is stamped with an
//! [`AttachmentToken`]; state changes carrying any other token are dropped, so a
//! late `Ended` from a torn-down player cannot reach the next lesson.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lms_core::model::{Lesson, LessonId, MediaKind, VideoId};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinHandle;

use crate::error::PlayerError;

/// Coarse state reported by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Playing,
    Paused,
    Ended,
}

/// Generation stamp of one player attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttachmentToken(u64);

impl AttachmentToken {
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AttachmentToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything the host needs to mount a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachRequest {
    pub token: AttachmentToken,
    pub container_id: String,
    pub video_id: VideoId,
}

/// Element id the player is mounted into for a lesson.
#[must_use]
pub fn container_id(lesson_id: LessonId) -> String {
    format!("lesson-player-{lesson_id}")
}

/// External player runtime.
///
/// The host reports state changes back through
/// [`CourseViewer::handle_player_state`](crate::CourseViewer::handle_player_state)
/// together with the token of the request that created the player.
#[async_trait]
pub trait PlayerHost: Send + Sync {
    /// Resolves once the player runtime is loaded.
    async fn ready(&self) -> Result<(), PlayerError>;

    /// Mount a player for `request.video_id` into `request.container_id`.
    fn attach(&self, request: AttachRequest) -> Result<Box<dyn PlayerHandle>, PlayerError>;
}

/// A mounted player instance.
pub trait PlayerHandle: Send {
    fn seek_to(&mut self, seconds: f64);
    fn play(&mut self);
    /// Unmount and stop delivering state changes.
    fn destroy(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Attached,
    Playing,
    Paused,
    Ended,
}

/// Emitted once per activation when the video first reaches its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackEnded {
    pub lesson_id: LessonId,
}

type Mounted = Result<Box<dyn PlayerHandle>, PlayerError>;

enum Mount {
    /// The runtime is being waited on in a background task.
    Pending {
        rx: oneshot::Receiver<Mounted>,
        task: JoinHandle<()>,
    },
    Ready(Box<dyn PlayerHandle>),
    Failed,
}

struct Activation {
    lesson_id: LessonId,
    token: AttachmentToken,
    mount: Mount,
    state: WatchState,
    /// The player currently sits at the end. Cleared by replay.
    ended: bool,
    /// The video reached its end at least once during this activation.
    finished: bool,
}

impl Activation {
    fn settle(&mut self, received: Option<Mounted>) {
        match received {
            Some(Ok(handle)) => {
                self.mount = Mount::Ready(handle);
                if self.state == WatchState::Idle {
                    self.state = WatchState::Attached;
                }
                tracing::debug!(
                    lesson_id = %self.lesson_id,
                    token = %self.token,
                    "player attached"
                );
            }
            Some(Err(_)) | None => self.mount = Mount::Failed,
        }
    }

    /// Pick up the background result if it has arrived.
    fn poll(&mut self) {
        let received = match &mut self.mount {
            Mount::Pending { rx, .. } => match rx.try_recv() {
                Ok(mounted) => Some(mounted),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Closed) => None,
            },
            Mount::Ready(_) | Mount::Failed => return,
        };
        self.settle(received);
    }
}

/// Waits for the runtime and mounts the player, off the caller's task.
async fn mount(
    host: Arc<dyn PlayerHost>,
    ready_timeout: Duration,
    request: AttachRequest,
    lesson_id: LessonId,
    tx: oneshot::Sender<Mounted>,
) {
    let mounted = match tokio::time::timeout(ready_timeout, host.ready()).await {
        Ok(Ok(())) => host.attach(request),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(PlayerError::ReadyTimeout(ready_timeout)),
    };
    if let Err(err) = &mounted {
        tracing::warn!(%lesson_id, error = %err, "player unavailable");
    }
    // The activation was torn down while we were mounting.
    if let Err(Ok(mut handle)) = tx.send(mounted) {
        handle.destroy();
    }
}

pub struct PlaybackWatcher {
    host: Arc<dyn PlayerHost>,
    ready_timeout: Duration,
    generation: u64,
    active: Option<Activation>,
}

impl PlaybackWatcher {
    #[must_use]
    pub fn new(host: Arc<dyn PlayerHost>, ready_timeout: Duration) -> Self {
        Self {
            host,
            ready_timeout,
            generation: 0,
            active: None,
        }
    }

    /// Destroy the current player, if any, and forget the activation.
    ///
    /// A player still waiting on the runtime is cancelled; one that finishes
    /// mounting anyway is destroyed by its own task.
    pub fn reset(&mut self) {
        let Some(activation) = self.active.take() else {
            return;
        };
        tracing::debug!(
            lesson_id = %activation.lesson_id,
            token = %activation.token,
            "player detached"
        );
        match activation.mount {
            Mount::Ready(mut handle) => handle.destroy(),
            Mount::Pending { mut rx, task } => {
                rx.close();
                task.abort();
                if let Ok(Ok(mut handle)) = rx.try_recv() {
                    handle.destroy();
                }
            }
            Mount::Failed => {}
        }
    }

    /// Start attaching a player for `lesson` if its media is a streaming video.
    ///
    /// Returns without waiting: the runtime is awaited in the background, for
    /// at most the configured timeout, and the player mounts once it is ready.
    /// Re-attaching the lesson that is already active never restarts the wait,
    /// even after it timed out. Any other attachment is torn down first.
    pub fn attach(&mut self, lesson: &Lesson) -> WatchState {
        if let Some(active) = self.active.as_mut().filter(|a| a.lesson_id == lesson.id) {
            active.poll();
            return active.state;
        }
        self.reset();

        let MediaKind::StreamingVideo(video_id) = lesson.media_kind() else {
            return WatchState::Idle;
        };

        self.generation += 1;
        let token = AttachmentToken(self.generation);
        let request = AttachRequest {
            token,
            container_id: container_id(lesson.id),
            video_id,
        };
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(mount(
            Arc::clone(&self.host),
            self.ready_timeout,
            request,
            lesson.id,
            tx,
        ));
        tracing::debug!(lesson_id = %lesson.id, %token, "waiting for player runtime");

        self.active = Some(Activation {
            lesson_id: lesson.id,
            token,
            mount: Mount::Pending { rx, task },
            state: WatchState::Idle,
            ended: false,
            finished: false,
        });
        WatchState::Idle
    }

    /// Wait until the active player has mounted or given up.
    pub async fn wait_attached(&mut self) -> WatchState {
        let Some(active) = self.active.as_mut() else {
            return WatchState::Idle;
        };
        let received = match &mut active.mount {
            Mount::Pending { rx, .. } => rx.await.ok(),
            Mount::Ready(_) | Mount::Failed => return active.state,
        };
        active.settle(received);
        active.state
    }

    /// Feed a state change from the player.
    ///
    /// Returns `Some` only for the first `Ended` of the current activation.
    /// Changes stamped with a stale token, from a player that failed to mount,
    /// or arriving after the end before a replay, are ignored.
    pub fn on_state_change(
        &mut self,
        token: AttachmentToken,
        state: PlayerState,
    ) -> Option<PlaybackEnded> {
        let Some(active) = self.active.as_mut().filter(|a| a.token == token) else {
            tracing::debug!(%token, ?state, "ignoring state change from stale player");
            return None;
        };
        // The token only reaches the host through a mount, so a matching
        // change may arrive before the mounted handle does.
        active.poll();
        if matches!(active.mount, Mount::Failed) || active.state == WatchState::Ended {
            return None;
        }

        match state {
            PlayerState::Playing => active.state = WatchState::Playing,
            PlayerState::Paused => active.state = WatchState::Paused,
            PlayerState::Ended => {
                active.state = WatchState::Ended;
                active.ended = true;
                if !active.finished {
                    active.finished = true;
                    return Some(PlaybackEnded {
                        lesson_id: active.lesson_id,
                    });
                }
            }
        }
        None
    }

    /// Restart an ended video from the beginning.
    ///
    /// Clears the `ended` flag; the activation stays finished and no second
    /// `PlaybackEnded` is emitted. Returns `false` unless the video had ended.
    pub fn replay(&mut self) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        active.poll();
        if active.state != WatchState::Ended {
            return false;
        }
        let Mount::Ready(handle) = &mut active.mount else {
            return false;
        };
        handle.seek_to(0.0);
        handle.play();
        active.state = WatchState::Playing;
        active.ended = false;
        true
    }

    /// `Idle` until the player has mounted.
    #[must_use]
    pub fn state(&self) -> WatchState {
        self.active.as_ref().map_or(WatchState::Idle, |a| a.state)
    }

    #[must_use]
    pub fn lesson_id(&self) -> Option<LessonId> {
        self.active.as_ref().map(|a| a.lesson_id)
    }

    #[must_use]
    pub fn token(&self) -> Option<AttachmentToken> {
        self.active.as_ref().map(|a| a.token)
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.ended)
    }

    /// Whether `lesson_id`'s video played to the end during this activation.
    #[must_use]
    pub fn has_finished(&self, lesson_id: LessonId) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.lesson_id == lesson_id && a.finished)
    }
}

impl Drop for PlaybackWatcher {
    fn drop(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Attach(AttachRequest),
        Seek(f64),
        Play,
        Destroy(AttachmentToken),
    }

    #[derive(Clone, Default)]
    struct FakeHost {
        calls: Arc<Mutex<Vec<Call>>>,
        never_ready: bool,
    }

    struct FakeHandle {
        token: AttachmentToken,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl PlayerHandle for FakeHandle {
        fn seek_to(&mut self, seconds: f64) {
            self.calls.lock().unwrap().push(Call::Seek(seconds));
        }
        fn play(&mut self) {
            self.calls.lock().unwrap().push(Call::Play);
        }
        fn destroy(&mut self) {
            self.calls.lock().unwrap().push(Call::Destroy(self.token));
        }
    }

    #[async_trait]
    impl PlayerHost for FakeHost {
        async fn ready(&self) -> Result<(), PlayerError> {
            if self.never_ready {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        fn attach(&self, request: AttachRequest) -> Result<Box<dyn PlayerHandle>, PlayerError> {
            let token = request.token;
            self.calls.lock().unwrap().push(Call::Attach(request));
            Ok(Box::new(FakeHandle {
                token,
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    fn lesson(id: u64, media: Option<&str>) -> Lesson {
        Lesson {
            id: LessonId::new(id),
            title: format!("Lesson {id}"),
            content: String::new(),
            media_url: media.map(str::to_owned),
            position: 1,
        }
    }

    const VIDEO: &str = "https://youtu.be/dQw4w9WgXcQ";

    fn watcher(host: &FakeHost) -> PlaybackWatcher {
        PlaybackWatcher::new(Arc::new(host.clone()), Duration::from_secs(10))
    }

    async fn mounted(w: &mut PlaybackWatcher, lesson: &Lesson) -> WatchState {
        w.attach(lesson);
        w.wait_attached().await
    }

    #[tokio::test]
    async fn attaches_streaming_video_with_container_id() {
        let host = FakeHost::default();
        let mut w = watcher(&host);

        assert_eq!(w.attach(&lesson(7, Some(VIDEO))), WatchState::Idle);
        assert_eq!(w.wait_attached().await, WatchState::Attached);
        let calls = host.calls.lock().unwrap().clone();
        let Call::Attach(request) = &calls[0] else {
            panic!("expected attach, got {calls:?}");
        };
        assert_eq!(request.container_id, "lesson-player-7");
        assert_eq!(request.video_id.as_str(), "dQw4w9WgXcQ");
    }

    #[tokio::test]
    async fn non_streaming_media_is_inert() {
        let host = FakeHost::default();
        let mut w = watcher(&host);
        assert_eq!(mounted(&mut w, &lesson(1, Some("lecture.pdf"))).await, WatchState::Idle);
        assert_eq!(mounted(&mut w, &lesson(2, None)).await, WatchState::Idle);
        assert!(host.calls.lock().unwrap().is_empty());
        assert!(w.token().is_none());
    }

    #[tokio::test]
    async fn ended_is_emitted_once() {
        let host = FakeHost::default();
        let mut w = watcher(&host);
        mounted(&mut w, &lesson(1, Some(VIDEO))).await;
        let token = w.token().unwrap();

        assert!(!w.is_ended());
        assert_eq!(w.on_state_change(token, PlayerState::Playing), None);
        assert_eq!(
            w.on_state_change(token, PlayerState::Ended),
            Some(PlaybackEnded {
                lesson_id: LessonId::new(1)
            })
        );
        assert_eq!(w.on_state_change(token, PlayerState::Ended), None);
        assert!(w.is_ended());
        assert!(w.has_finished(LessonId::new(1)));
    }

    #[tokio::test]
    async fn replay_clears_flag_without_rearming() {
        let host = FakeHost::default();
        let mut w = watcher(&host);
        mounted(&mut w, &lesson(1, Some(VIDEO))).await;
        let token = w.token().unwrap();
        w.on_state_change(token, PlayerState::Playing);
        w.on_state_change(token, PlayerState::Ended);

        assert!(w.replay());
        assert!(!w.is_ended());
        assert_eq!(w.state(), WatchState::Playing);
        assert!(w.has_finished(LessonId::new(1)));

        assert_eq!(w.on_state_change(token, PlayerState::Ended), None);
        let calls = host.calls.lock().unwrap().clone();
        assert!(calls.contains(&Call::Seek(0.0)));
        assert!(calls.contains(&Call::Play));
    }

    #[tokio::test]
    async fn replay_requires_ended_video() {
        let host = FakeHost::default();
        let mut w = watcher(&host);
        assert!(!w.replay());
        mounted(&mut w, &lesson(1, Some(VIDEO))).await;
        assert!(!w.replay());
    }

    #[tokio::test]
    async fn switching_lessons_detaches_and_ignores_stale_events() {
        let host = FakeHost::default();
        let mut w = watcher(&host);
        mounted(&mut w, &lesson(1, Some(VIDEO))).await;
        let old = w.token().unwrap();
        w.on_state_change(old, PlayerState::Playing);

        mounted(
            &mut w,
            &lesson(2, Some("https://www.youtube.com/watch?v=AbCdEfGhIjK")),
        )
        .await;
        let new = w.token().unwrap();
        assert_ne!(old, new);
        assert!(host.calls.lock().unwrap().contains(&Call::Destroy(old)));

        assert_eq!(w.on_state_change(old, PlayerState::Ended), None);
        assert!(!w.is_ended());
        assert!(!w.has_finished(LessonId::new(1)));
    }

    #[tokio::test]
    async fn reattaching_same_lesson_is_noop() {
        let host = FakeHost::default();
        let mut w = watcher(&host);
        let l = lesson(1, Some(VIDEO));
        mounted(&mut w, &l).await;
        let token = w.token();
        assert_eq!(w.attach(&l), WatchState::Attached);
        assert_eq!(w.token(), token);
        assert_eq!(host.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ready_timeout_leaves_watcher_idle() {
        let host = FakeHost {
            never_ready: true,
            ..FakeHost::default()
        };
        let mut w = watcher(&host);

        assert_eq!(mounted(&mut w, &lesson(1, Some(VIDEO))).await, WatchState::Idle);
        let token = w.token().unwrap();
        assert_eq!(w.on_state_change(token, PlayerState::Ended), None);
        assert!(!w.has_finished(LessonId::new(1)));
        assert!(host.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn attach_returns_before_the_runtime_is_ready() {
        let host = FakeHost {
            never_ready: true,
            ..FakeHost::default()
        };
        let mut w = watcher(&host);
        let l = lesson(1, Some(VIDEO));
        let started = tokio::time::Instant::now();

        assert_eq!(w.attach(&l), WatchState::Idle);
        assert_eq!(started.elapsed(), Duration::ZERO);
        let token = w.token().unwrap();

        assert_eq!(w.wait_attached().await, WatchState::Idle);
        let timed_out = started.elapsed();
        assert!(timed_out >= Duration::from_secs(10));

        // Re-selecting after the timeout does not wait again.
        assert_eq!(w.attach(&l), WatchState::Idle);
        assert_eq!(w.wait_attached().await, WatchState::Idle);
        assert_eq!(w.token(), Some(token));
        assert_eq!(started.elapsed(), timed_out);
    }

    #[tokio::test]
    async fn state_change_before_handle_arrives_is_applied() {
        let host = FakeHost::default();
        let mut w = watcher(&host);
        w.attach(&lesson(1, Some(VIDEO)));
        let token = w.token().unwrap();

        assert_eq!(w.on_state_change(token, PlayerState::Playing), None);
        assert!(w.on_state_change(token, PlayerState::Ended).is_some());
        assert!(w.has_finished(LessonId::new(1)));
    }

    #[tokio::test]
    async fn switching_before_mount_never_attaches_the_old_player() {
        let host = FakeHost::default();
        let mut w = watcher(&host);
        w.attach(&lesson(1, Some(VIDEO)));
        let old = w.token().unwrap();

        mounted(
            &mut w,
            &lesson(2, Some("https://www.youtube.com/watch?v=AbCdEfGhIjK")),
        )
        .await;
        tokio::task::yield_now().await;

        let calls = host.calls.lock().unwrap().clone();
        assert!(
            !calls
                .iter()
                .any(|c| matches!(c, Call::Attach(r) if r.token == old))
        );
        assert_eq!(w.state(), WatchState::Attached);
    }
}
