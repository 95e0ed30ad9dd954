//! Burst window for outbound chat messages
//!
//! Voice servers drop chat messages that arrive too fast (a burst of five,
//! then about one per second). The window counts text messages and asks the
//! dispatcher worker to pause before the one that would exceed the burst.

use std::time::Duration;
use tokio::time::Instant;

/// Burst limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstPolicy {
    /// Messages allowed back to back within one window
    pub limit: u32,
    /// Window length measured from its first message
    pub window: Duration,
    /// Pause inserted once the limit is exceeded
    pub pause: Duration,
}

impl Default for BurstPolicy {
    fn default() -> Self {
        Self {
            limit: 5,
            window: Duration::from_secs(5),
            pause: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BurstWindow {
    policy: BurstPolicy,
    started: Option<Instant>,
    count: u32,
}

impl BurstWindow {
    pub fn new(policy: BurstPolicy) -> Self {
        Self {
            policy,
            started: None,
            count: 0,
        }
    }

    /// Account for one message sent at `now`
    ///
    /// Returns the pause to observe before sending it. After a pause the
    /// window restarts with this message as its first entry.
    pub fn admit(&mut self, now: Instant) -> Option<Duration> {
        let expired = match self.started {
            Some(start) => now.saturating_duration_since(start) > self.policy.window,
            None => true,
        };
        if expired {
            self.started = Some(now);
            self.count = 0;
        }

        self.count += 1;
        if self.count <= self.policy.limit.max(1) {
            return None;
        }

        self.started = Some(now + self.policy.pause);
        self.count = 1;
        Some(self.policy.pause)
    }
}
