//! Keep-alive probe timer.

use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

/// Fires once per heartbeat period while a connection is open.
///
/// The first tick lands one full period after [`start`](Self::start); a
/// fresh monitor is created on every connect and dropped on every
/// disconnect, so probes never outlive the link they were started for.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    period: Duration,
    interval: Interval,
    probes: u64,
}

impl HeartbeatMonitor {
    /// Starts a monitor. Returns `None` for a zero period.
    #[must_use]
    pub fn start(period: Duration) -> Option<Self> {
        if period.is_zero() {
            return None;
        }
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Some(Self {
            period,
            interval,
            probes: 0,
        })
    }

    /// Waits for the next probe time.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
        self.probes += 1;
    }

    /// Probe period.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Probes fired since start.
    #[must_use]
    pub fn probes(&self) -> u64 {
        self.probes
    }
}
