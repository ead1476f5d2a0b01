//! Heartbeat timing: ping ticks and the read deadline they keep alive.

use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Floor for `interval` and `write_timeout`; zero would panic the ticker.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Per-session heartbeat parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Time between pings.
    pub interval: Duration,
    /// Extra time allowed for the pong on top of `interval`.
    pub grace: Duration,
    /// Deadline for every outbound frame, pings included.
    pub write_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            grace: Duration::from_secs(5),
            write_timeout: Duration::from_secs(2),
        }
    }
}

impl HeartbeatConfig {
    /// Copy with zero periods raised to the minimum.
    pub fn clamped(&self) -> Self {
        Self {
            interval: self.interval.max(MIN_PERIOD),
            grace: self.grace,
            write_timeout: self.write_timeout.max(MIN_PERIOD),
        }
    }

    /// How long the peer may stay silent before the session is declared dead.
    pub fn read_window(&self) -> Duration {
        self.interval + self.grace
    }

    /// Ping ticker; the first tick fires one `interval` after creation.
    pub(crate) fn ticker(&self) -> Interval {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}

/// Read deadline pushed forward whenever the peer shows signs of life.
#[derive(Debug)]
pub(crate) struct ReadDeadline {
    window: Duration,
    at: Instant,
}

impl ReadDeadline {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            at: Instant::now() + window,
        }
    }

    pub(crate) fn extend(&mut self) {
        self.at = Instant::now() + self.window;
    }

    pub(crate) fn at(&self) -> Instant {
        self.at
    }
}
