//! Reconnect policy: constant delay, bounded attempts.
//!
//! ```
//! use std::time::Duration;
//! use tradedesk_gateway::ws::ReconnectPolicy;
//!
//! let policy = ReconnectPolicy::new(Duration::from_secs(3), 2);
//! assert_eq!(policy.next_delay(0), Some(Duration::from_secs(3)));
//! assert_eq!(policy.next_delay(1), Some(Duration::from_secs(3)));
//! assert_eq!(policy.next_delay(2), None);
//! ```

use std::time::Duration;
use tracing::debug;

use super::config::ConnectionConfig;

/// Decides whether and when to try reconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    interval: Duration,
    max_attempts: u32,
}

impl ReconnectPolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Creates a policy from connection settings.
    #[must_use]
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(config.reconnect_interval(), config.max_reconnect_attempts)
    }

    /// Returns the delay before the next attempt, given how many have already
    /// been scheduled since the last successful connect. `None` means give up.
    #[must_use]
    pub fn next_delay(&self, attempts_made: u32) -> Option<Duration> {
        if attempts_made >= self.max_attempts {
            debug!(
                attempts = attempts_made,
                max = self.max_attempts,
                "Reconnect attempts exhausted"
            );
            return None;
        }
        Some(self.interval)
    }

    /// Maximum consecutive attempts.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay between attempts.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ConnectionConfig::default())
    }
}
