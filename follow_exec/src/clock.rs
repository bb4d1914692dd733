//! # Clock
//!
//! Time source for the control loop and the maneuver sequencer. The executable uses the session
//! clock, tests use [`SimClock`] so timed maneuvers complete instantly.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::cell::Cell;
use std::thread;

use util::{session, time::seconds_to_std};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

pub trait Clock {
    /// Seconds elapsed since the clock's epoch.
    fn now_s(&self) -> f64;

    /// Block the calling thread for the given number of seconds.
    fn sleep_s(&self, duration_s: f64);
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Wall clock measured from the session epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionClock;

/// Simulated clock, sleeping advances time without blocking.
#[derive(Debug, Default)]
pub struct SimClock {
    now_s: Cell<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Clock for SessionClock {
    fn now_s(&self) -> f64 {
        session::get_elapsed_seconds()
    }

    fn sleep_s(&self, duration_s: f64) {
        thread::sleep(seconds_to_std(duration_s))
    }
}

impl SimClock {
    pub fn new(start_s: f64) -> Self {
        Self {
            now_s: Cell::new(start_s),
        }
    }

    pub fn advance(&self, duration_s: f64) {
        if duration_s > 0.0 {
            self.now_s.set(self.now_s.get() + duration_s);
        }
    }
}

impl Clock for SimClock {
    fn now_s(&self) -> f64 {
        self.now_s.get()
    }

    fn sleep_s(&self, duration_s: f64) {
        self.advance(duration_s)
    }
}
