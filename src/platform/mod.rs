//! Platform Abstraction Layer
//!
//! The scheduler needs exactly two things from its host: a monotonic
//! millisecond clock and a non-blocking character source. Everything
//! host-specific lives behind these traits so the kernel can be driven by
//! real time and stdin, or by a scripted clock and input in tests.

mod clock;
mod input;

pub use clock::{ManualClock, MonotonicClock};
pub use input::{NoInput, ScriptedInput, StdinInput};

/// Monotonic time source
pub trait Clock {
    /// Milliseconds since an arbitrary, fixed epoch. Never goes backwards.
    fn now_ms(&self) -> u64;

    /// Park the thread until `now_ms() >= deadline`
    ///
    /// Called only when no task can run. The default sleeps the thread.
    fn wait_until(&self, deadline: u64) {
        let now = self.now_ms();
        if deadline > now {
            std::thread::sleep(std::time::Duration::from_millis(deadline - now));
        }
    }
}

/// Non-blocking character input
pub trait InputSource {
    /// Return one pending character, or `None` right away if there is none
    fn poll_char(&mut self) -> Option<char>;

    /// True once no character will ever arrive again
    fn is_exhausted(&self) -> bool {
        false
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }

    fn wait_until(&self, deadline: u64) {
        (**self).wait_until(deadline)
    }
}

impl<I: InputSource + ?Sized> InputSource for Box<I> {
    fn poll_char(&mut self) -> Option<char> {
        (**self).poll_char()
    }

    fn is_exhausted(&self) -> bool {
        (**self).is_exhausted()
    }
}
