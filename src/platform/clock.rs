//! Clock implementations

use super::Clock;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Wall-clock-independent time from `std::time::Instant`
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// Manually driven clock
///
/// Clones share the same time, so a test can keep one handle and give
/// another to the scheduler. Waiting jumps straight to the deadline, which
/// makes sleeping tasks finish instantly and deterministically.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(ms: u64) -> Self {
        Self {
            now: Rc::new(Cell::new(ms)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get().saturating_add(ms));
    }

    /// Move to `ms`; earlier values are ignored so time stays monotonic
    pub fn set(&self, ms: u64) {
        if ms > self.now.get() {
            self.now.set(ms);
        }
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn wait_until(&self, deadline: u64) {
        self.set(deadline);
    }
}
