//! Engine timing configuration.

use core::time::Duration;

use serde::Deserialize;

/// Timing knobs for the engine thread and the control handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long the idle engine waits for a command before re-checking for quit.
    pub idle_poll_ms: u64,

    /// Maximum wait for a command acknowledgment.
    pub ack_timeout_ms: u64,

    /// Maximum wait for a queried value.
    pub value_timeout_ms: u64,

    /// Maximum wait for a microstep change reply.
    pub microstep_timeout_ms: u64,

    /// Length of the priming buffer sent at the start of each move.
    pub priming_pulse_us: u32,

    /// Sleep between busy checks while the last buffers drain.
    pub drain_sleep_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_poll_ms: 100,
            // long, but a remote GPIO daemon can be slow to answer
            ack_timeout_ms: 3000,
            value_timeout_ms: 1000,
            microstep_timeout_ms: 1000,
            priming_pulse_us: 100,
            drain_sleep_ms: 1,
        }
    }
}

impl EngineConfig {
    /// Idle command poll interval.
    #[inline]
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// Acknowledgment timeout.
    #[inline]
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Value query timeout.
    #[inline]
    pub fn value_timeout(&self) -> Duration {
        Duration::from_millis(self.value_timeout_ms)
    }

    /// Microstep change reply timeout.
    #[inline]
    pub fn microstep_timeout(&self) -> Duration {
        Duration::from_millis(self.microstep_timeout_ms)
    }

    /// Drain sleep.
    #[inline]
    pub fn drain_sleep(&self) -> Duration {
        Duration::from_millis(self.drain_sleep_ms)
    }
}
