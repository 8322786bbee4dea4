use std::env;
use std::time::Duration;

const HEARTBEAT_SECS_VAR: &str = "LMS_HEARTBEAT_SECS";
const READY_TIMEOUT_SECS_VAR: &str = "LMS_PLAYER_READY_TIMEOUT_SECS";

/// Timing knobs of a viewing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewerConfig {
    /// Period of the time-tracking heartbeat. Each report carries this length in seconds.
    pub heartbeat_interval: Duration,
    /// Upper bound on waiting for the external player to become ready.
    pub player_ready_timeout: Duration,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            player_ready_timeout: Duration::from_secs(10),
        }
    }
}

impl ViewerConfig {
    /// Reads `LMS_HEARTBEAT_SECS` and `LMS_PLAYER_READY_TIMEOUT_SECS`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Missing, malformed or zero values fall back to the defaults.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            heartbeat_interval: seconds(&lookup, HEARTBEAT_SECS_VAR)
                .unwrap_or(defaults.heartbeat_interval),
            player_ready_timeout: seconds(&lookup, READY_TIMEOUT_SECS_VAR)
                .unwrap_or(defaults.player_ready_timeout),
        }
    }

    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    #[must_use]
    pub fn with_player_ready_timeout(mut self, timeout: Duration) -> Self {
        self.player_ready_timeout = timeout;
        self
    }
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring invalid duration");
            None
        }
        Ok(secs) => Some(Duration::from_secs(secs)),
    }
}
