//! Client configuration
//!
//! `ChatConfig` carries the endpoint and the tuning knobs of a session.
//! `ReconnectPolicy` is the exponential backoff schedule.

use std::time::Duration;

/// Default number of reconnect attempts before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the first reconnect attempt
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default idle time after which local typing stops on its own
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_secs(3);

/// Default capacity of the event channel
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Reconnect backoff schedule
///
/// Attempt `n` (0-based) waits `base_delay * 2^n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Whether another attempt is allowed after `attempt` tries
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

/// Configuration for a chat session
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// WebSocket endpoint, e.g. `wss://host/functions/v1/live-chat`
    pub url: String,
    pub reconnect: ReconnectPolicy,
    pub typing_timeout: Duration,
    /// Events beyond this backlog are dropped with a warning.
    /// Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
}

impl ChatConfig {
    /// Create a configuration for the given endpoint with default values
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectPolicy::default(),
            typing_timeout: DEFAULT_TYPING_TIMEOUT,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }

    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    #[must_use]
    pub fn with_typing_timeout(mut self, timeout: Duration) -> Self {
        self.typing_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }
}
