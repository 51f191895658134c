/// A countdown for the currently active phase of a signal, in whole seconds.
///
/// The timer has no side effects of its own; the owning controller polls
/// [PhaseTimer::is_expired] after each tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhaseTimer {
    /// The seconds left before expiry.
    remaining: u32,
    /// Whether [PhaseTimer::start] has been called.
    running: bool,
}

impl PhaseTimer {
    /// Creates a timer that has not been started.
    pub const fn new() -> Self {
        Self {
            remaining: 0,
            running: false,
        }
    }

    /// Resets the countdown to `duration` seconds and marks the timer running.
    pub fn start(&mut self, duration: u32) {
        self.remaining = duration;
        self.running = true;
    }

    /// Counts down by `elapsed` seconds, stopping at zero.
    ///
    /// Returns the part of `elapsed` that ran past zero.
    pub fn tick(&mut self, elapsed: u32) -> u32 {
        let consumed = u32::min(elapsed, self.remaining);
        self.remaining -= consumed;
        elapsed - consumed
    }

    /// Returns true once a running timer has reached zero.
    pub fn is_expired(&self) -> bool {
        self.running && self.remaining == 0
    }

    /// The seconds left before expiry.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}
