use std::sync::Arc;
use std::time::Duration;

use api::CourseApi;
use lms_core::model::CourseId;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Background task reporting viewing time for a course at a fixed period.
///
/// Each tick reports the period length in seconds. Failed reports are logged
/// and dropped. The task stops on [`Heartbeat::stop`] or when the value is
/// dropped.
#[derive(Debug)]
pub struct Heartbeat {
    course_id: CourseId,
    handle: JoinHandle<()>,
}

impl Heartbeat {
    /// Spawn the reporting task on the current tokio runtime.
    ///
    /// The first report goes out one full period after the start. Periods
    /// shorter than one second are raised to one second.
    #[must_use]
    pub fn start(api: Arc<dyn CourseApi>, course_id: CourseId, period: Duration) -> Self {
        let period = period.max(Duration::from_secs(1));
        let seconds = period.as_secs();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match api.report_heartbeat(course_id, seconds).await {
                    Ok(()) => tracing::debug!(%course_id, seconds, "heartbeat reported"),
                    Err(err) => {
                        tracing::warn!(%course_id, error = %err, "heartbeat report failed");
                    }
                }
            }
        });

        Self { course_id, handle }
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
