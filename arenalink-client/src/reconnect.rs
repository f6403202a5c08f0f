//! Reconnection strategies
//!
//! After a socket error (or a failed open) the connection manager asks its
//! strategy how long to wait before the next attempt. A clean close by the
//! server skips the strategy entirely and reconnects right away.
//!
//! The default is a fixed 10 second delay with no attempt cap and no jitter,
//! which is how every control-room screen has always behaved.
//!
//! # Custom Strategies
//!
//! Implement [`ReconnectionStrategy`] to change the behavior, e.g. a shorter
//! delay for a wired kiosk or a cap for a screen that should give up.
//!
//! ```rust
//! use arenalink_client::{FixedDelay, ReconnectionStrategy};
//! use std::time::Duration;
//!
//! let mut strategy = FixedDelay::new(Duration::from_secs(2)).with_max_attempts(3);
//! assert_eq!(strategy.next_delay(0), Some(Duration::from_secs(2)));
//! assert_eq!(strategy.next_delay(3), None);
//! ```

use std::time::Duration;

/// Delay used when a socket fails, unless configured otherwise
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Trait for reconnection strategies
///
/// `attempt` counts consecutive failed connections since the last completed
/// handshake, starting at 0. `reset()` is called when a handshake completes.
pub trait ReconnectionStrategy: Send + Sync {
    /// Returns the delay before the next attempt, or `None` to give up
    fn next_delay(&mut self, attempt: u32) -> Option<Duration>;

    /// Reset any accumulated state after a successful handshake
    fn reset(&mut self);
}

/// Constant delay between attempts
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedDelay {
    /// Create a fixed delay strategy with unlimited attempts
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Give up after this many consecutive failures
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }
        Some(self.delay)
    }

    fn reset(&mut self) {}
}
