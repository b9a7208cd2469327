//! Reconnect policy — linear backoff with a hard attempt cap.

use std::time::Duration;

/// Controls how the client reconnects after a transport failure.
///
/// The delay before the n-th consecutive attempt (1-indexed) is
/// `base_delay * n`.  With the defaults (`base_delay` 5s, `max_attempts` 5)
/// the schedule is exactly 5s, 10s, 15s, 20s, 25s; a sixth consecutive
/// failure is terminal until the caller explicitly reconnects.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay unit multiplied by the attempt number.
    pub base_delay: Duration,
    /// Consecutive failures tolerated before giving up.  `0` = unlimited.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Whether `attempts` consecutive failures exhaust the budget.
    pub fn should_give_up(&self, attempts: u32) -> bool {
        self.max_attempts > 0 && attempts >= self.max_attempts
    }
}
