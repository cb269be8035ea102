//! Clock adapters.
//!
//! Production code reads time through [`SystemClock`]. Tests drive time with
//! `MockClock` from `crate::infrastructure::mocks`, available in test builds
//! or with the `test-helpers` feature.

use crate::application::ports::Clock;
use std::time::Instant;

/// Monotonic system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
