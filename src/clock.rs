//! Coarse engine clock.
//!
//! Record timestamps are 32-bit seconds since engine start, read from the
//! coarse system clock. Engine time begins at 2 so that 0 stays free as the
//! "never" sentinel and a flush point of `now - 1` is always nonzero.

use std::sync::atomic::{AtomicU32, Ordering};

use clocksource::coarse::UnixInstant;

pub struct EngineClock {
    start: UnixInstant,
    /// Test-only skew added to every reading.
    skew: AtomicU32,
}

impl EngineClock {
    pub fn new() -> Self {
        Self {
            start: UnixInstant::now(),
            skew: AtomicU32::new(0),
        }
    }

    /// Seconds since engine start.
    pub fn now(&self) -> u32 {
        let elapsed = UnixInstant::now().duration_since(self.start).as_secs();
        2 + elapsed + self.skew.load(Ordering::Relaxed)
    }

    /// Shift the clock forward. Lets tests cross expiry and LRU-interval
    /// boundaries without sleeping.
    pub fn advance(&self, seconds: u32) {
        self.skew.fetch_add(seconds, Ordering::Relaxed);
    }
}

impl Default for EngineClock {
    fn default() -> Self {
        Self::new()
    }
}
