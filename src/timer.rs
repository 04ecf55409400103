//! Retransmission timer capability.
//!
//! The sender owns exactly one timer.  It never waits on it: it only issues
//! imperative `start` / `stop` commands through [`TimerControl`], and whoever
//! drives the sender (the simulator, the UDP session, a test) delivers the
//! expiry by calling [`crate::sr_sender::SrSender::on_timeout`].
//!
//! [`TimerState`] is the stock implementation used by the bundled drivers.
//! It records the latest command together with a generation counter, so a
//! driver can tell whether the expiry it scheduled earlier has since been
//! cancelled or superseded.

use std::time::Duration;

/// Start/stop control over one pending timeout.
pub trait TimerControl {
    /// Schedule an expiry `duration` from now, replacing any pending one.
    fn start(&mut self, duration: Duration);

    /// Cancel the pending expiry, if any.
    fn stop(&mut self);
}

/// Records timer commands for a driver to act on.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TimerState {
    armed: Option<Duration>,
    generation: u64,
}

impl TimerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duration passed to the most recent `start`, while still armed.
    pub fn armed(&self) -> Option<Duration> {
        self.armed
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Bumped by every `start` and `stop`.
    ///
    /// An expiry scheduled under an older generation is stale and must be
    /// discarded by the driver.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Mark the pending expiry as delivered.
    ///
    /// Drivers call this right before `on_timeout`; the sender restarts the
    /// timer from inside the handler.
    pub fn fire(&mut self) {
        self.armed = None;
    }
}

impl TimerControl for TimerState {
    fn start(&mut self, duration: Duration) {
        self.armed = Some(duration);
        self.generation += 1;
    }

    fn stop(&mut self) {
        self.armed = None;
        self.generation += 1;
    }
}
