//! Reconnection state machine and backoff policy.
//!
//! The connection loop in [`crate::service`] drives these: any non-manual
//! closure schedules a reconnect with exponentially increasing delay, capped
//! per attempt and bounded in count. A manual disconnect is terminal.

use std::fmt;
use std::time::Duration;

/// Push-channel connection state, published on a watch channel so consuming
/// views can render a connected/polling-mode indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
    /// Backoff attempts exhausted; only a manual restart leaves this state
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

/// Exponential backoff policy for reconnect attempts
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt
    pub base_delay: Duration,
    /// Per-attempt delay cap
    pub max_delay: Duration,
    /// Consecutive failures tolerated before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-indexed):
    /// `min(base * 2^(attempt-1), max)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let millis = (self.base_delay.as_millis() as u64).saturating_mul(1u64 << exp);
        Duration::from_millis(millis).min(self.max_delay)
    }

    /// Whether `failures` consecutive failed attempts exhaust the policy
    pub fn exhausted(&self, failures: u32) -> bool {
        failures > self.max_attempts
    }
}
