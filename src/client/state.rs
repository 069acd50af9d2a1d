//! Reconnection policy and observable connection state.

use std::time::Duration;

/// Bounded reconnection with doubling delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failed dials before giving up.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl ReconnectPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1u32 << doublings)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    MaxAttemptsReached,
    /// The server refused the token; retrying with it is pointless.
    Unauthorized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting { attempt: u32 },
    Connected,
    Failed(FailureReason),
    /// Closed by `disconnect`.
    Closed,
}

impl ConnectionState {
    /// No further connection attempts will be made.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed(_) | ConnectionState::Closed)
    }
}
