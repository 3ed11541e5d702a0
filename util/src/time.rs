//! General time utility functions and the injectable task clock.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::thread;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A monotonic time source driving a cyclic control process.
///
/// Control loops must take their time through this trait rather than reading
/// the wall clock directly, so that cyclic processing can be tested
/// deterministically with a [`StepClock`] and without real delays.
pub trait Clock: Send {
    /// Seconds elapsed since the clock's epoch. Monotonically non-decreasing.
    fn elapsed_s(&self) -> f64;

    /// Sleep for the given duration, advancing the clock.
    fn sleep(&mut self, duration: Duration);
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A [`Clock`] backed by [`std::time::Instant`], used in flight.
pub struct MonotonicClock {
    epoch: Instant,
}

/// A manually stepped [`Clock`] for tests.
///
/// Time only advances when `sleep` or [`StepClock::step`] is called, so a
/// control loop under test sees exactly one quantum pass per cycle.
pub struct StepClock {
    now_s: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MonotonicClock {
    /// Create a new clock with its epoch set to now.
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
    fn elapsed_s(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration)
    }
}

impl StepClock {
    /// Create a new stepped clock starting at zero elapsed time.
    pub fn new() -> Self {
        Self { now_s: 0.0 }
    }

    /// Advance the clock by the given number of seconds.
    pub fn step(&mut self, step_s: f64) {
        self.now_s += step_s;
    }
}

impl Default for StepClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StepClock {
    fn elapsed_s(&self) -> f64 {
        self.now_s
    }

    fn sleep(&mut self, duration: Duration) {
        self.now_s += duration.as_secs_f64();
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Convert a chrono duration into fractional seconds, or `None` on overflow.
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    duration
        .num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND as f64)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_step_clock() {
        let mut clock = StepClock::new();
        assert_eq!(clock.elapsed_s(), 0.0);

        clock.step(1.5);
        assert_eq!(clock.elapsed_s(), 1.5);

        clock.sleep(Duration::from_millis(100));
        assert!((clock.elapsed_s() - 1.6).abs() < 1e-9);
    }
}
