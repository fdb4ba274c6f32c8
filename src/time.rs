//! # System Clock
//!
//! Wall-clock accumulator advanced by the scheduler with the ticks that
//! elapsed since the previous decision. Never rewound.

use crate::config::{Ticks, NANOS_PER_SEC, NANOS_PER_TICK};

/// Time since boot. `nano_secs` is always below one second and a
/// multiple of `NANOS_PER_TICK`. Field order makes the derived `Ord`
/// chronological.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SystemTime {
    pub secs: u32,
    pub nano_secs: u32,
}

impl SystemTime {
    pub const ZERO: Self = Self { secs: 0, nano_secs: 0 };

    /// Fold `ticks` into the clock.
    pub fn advance(&mut self, ticks: Ticks) {
        // A u16 of ticks is at most ~65 s, well inside u64
        let mut nanos = self.nano_secs as u64 + ticks as u64 * NANOS_PER_TICK as u64;
        nanos -= nanos % NANOS_PER_TICK as u64;

        while nanos >= NANOS_PER_SEC as u64 {
            nanos -= NANOS_PER_SEC as u64;
            self.secs = self.secs.wrapping_add(1);
        }
        self.nano_secs = nanos as u32;
    }

    /// Whole ticks since boot.
    pub fn as_ticks(&self) -> u64 {
        let per_sec = (NANOS_PER_SEC / NANOS_PER_TICK) as u64;
        self.secs as u64 * per_sec + (self.nano_secs / NANOS_PER_TICK) as u64
    }
}
