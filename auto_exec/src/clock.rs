//! # Clocks and timers
//!
//! Time is read through the [`Clock`] trait so that routines can be driven from a real monotonic
//! clock on the robot and from a manually stepped clock in simulation and tests.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A source of monotonic time.
pub trait Clock {
    /// Seconds since an arbitrary, fixed epoch.
    fn now_s(&self) -> f64;
}

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Wall clock time since the clock was created.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    epoch: Instant,
}

/// A clock which only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_s: Cell<f64>,
}

/// A stopwatch reading from a shared clock.
pub struct Timer {
    clock: Rc<dyn Clock>,

    /// Clock time the timer was last started, `None` while stopped.
    started_s: Cell<Option<f64>>,

    /// Time accumulated before the last start.
    accumulated_s: Cell<f64>,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

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
    fn now_s(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, now_s: f64) {
        self.now_s.set(now_s);
    }

    pub fn advance(&self, dt_s: f64) {
        self.now_s.set(self.now_s.get() + dt_s);
    }
}

impl Clock for ManualClock {
    fn now_s(&self) -> f64 {
        self.now_s.get()
    }
}

impl Timer {
    /// A stopped timer reading zero.
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            started_s: Cell::new(None),
            accumulated_s: Cell::new(0.0),
        }
    }

    /// Zero the timer and start it running.
    pub fn restart(&self) {
        self.accumulated_s.set(0.0);
        self.started_s.set(Some(self.clock.now_s()));
    }

    /// Stop the timer, keeping its current reading.
    pub fn stop(&self) {
        self.accumulated_s.set(self.elapsed_s());
        self.started_s.set(None);
    }

    pub fn is_running(&self) -> bool {
        self.started_s.get().is_some()
    }

    /// Seconds the timer has been running for.
    pub fn elapsed_s(&self) -> f64 {
        let running_s = self
            .started_s
            .get()
            .map_or(0.0, |start_s| self.clock.now_s() - start_s);

        self.accumulated_s.get() + running_s
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_timer() {
        let clock = Rc::new(ManualClock::new());
        let timer = Timer::new(clock.clone());

        clock.advance(1.0);
        assert_eq!(timer.elapsed_s(), 0.0);
        assert!(!timer.is_running());

        timer.restart();
        clock.advance(0.5);
        assert_eq!(timer.elapsed_s(), 0.5);

        timer.stop();
        clock.advance(2.0);
        assert_eq!(timer.elapsed_s(), 0.5);

        timer.restart();
        assert_eq!(timer.elapsed_s(), 0.0);
        clock.advance(0.25);
        assert_eq!(timer.elapsed_s(), 0.25);
    }

    #[test]
    fn test_monotonic() {
        let clock = MonotonicClock::new();
        let a = clock.now_s();
        let b = clock.now_s();
        assert!(b >= a && a >= 0.0);
    }
}
