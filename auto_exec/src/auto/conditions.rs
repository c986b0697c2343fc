//! # Stateful trajectory conditions
//!
//! Both conditions here remember what they saw on the previous poll, and both key that memory on
//! the trajectory's run number so a second run of the same trajectory starts from a clean slate.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::cell::Cell;
use std::rc::Rc;

use super::trajectory::TrajectoryShared;
use crate::sample::TrajectorySample;
use crate::trigger::{Condition, CycleCounter, CycleLatch};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// True for the single poll in which the trajectory's elapsed time reaches the target time.
pub(super) struct TimePulse<S: TrajectorySample> {
    trajectory: Rc<TrajectoryShared<S>>,
    target_s: f64,

    /// Run number and elapsed time seen by the previous evaluation
    last: Cell<Option<(u64, f64)>>,

    cycle: CycleCounter,
    latch: CycleLatch,
}

/// True for `width` polls, starting `delay` polls after the trajectory was first seen complete.
pub(super) struct DoneWindow<S: TrajectorySample> {
    trajectory: Rc<TrajectoryShared<S>>,
    delay: u64,
    width: u64,

    /// Run number of the completion being tracked and the routine poll count the window opens at
    observed: Cell<Option<(u64, u64)>>,

    cycle: CycleCounter,
    latch: CycleLatch,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl<S: TrajectorySample> TimePulse<S> {
    pub(super) fn new(trajectory: Rc<TrajectoryShared<S>>, target_s: f64, cycle: CycleCounter) -> Self {
        Self {
            trajectory,
            target_s,
            last: Cell::new(None),
            cycle,
            latch: CycleLatch::new(),
        }
    }
}

impl<S: TrajectorySample> Condition for TimePulse<S> {
    fn evaluate(&self) -> bool {
        self.latch.get_or_update(self.cycle.get(), || {
            let run = self.trajectory.run_count();
            let now_s = self.trajectory.elapsed_s();

            // Memory from an earlier run does not count
            let previous_s = match self.last.replace(Some((run, now_s))) {
                Some((last_run, last_s)) if last_run == run => Some(last_s),
                _ => None,
            };

            self.trajectory.active()
                && now_s >= self.target_s
                && previous_s.map_or(true, |p| p < self.target_s)
        })
    }
}

impl<S: TrajectorySample> DoneWindow<S> {
    pub(super) fn new(
        trajectory: Rc<TrajectoryShared<S>>,
        delay: u64,
        width: u64,
        cycle: CycleCounter,
    ) -> Self {
        Self {
            trajectory,
            delay,
            width,
            observed: Cell::new(None),
            cycle,
            latch: CycleLatch::new(),
        }
    }
}

impl<S: TrajectorySample> Condition for DoneWindow<S> {
    fn evaluate(&self) -> bool {
        self.latch.get_or_update(self.cycle.get(), || {
            if !self.trajectory.is_completed() {
                self.observed.set(None);
                return false;
            }

            let run = self.trajectory.run_count();
            let poll_count = self.trajectory.routine_poll_count();

            let opens_at = match self.observed.get() {
                Some((observed_run, opens_at)) if observed_run == run => opens_at,
                _ => {
                    let opens_at = poll_count + self.delay;
                    self.observed.set(Some((run, opens_at)));
                    opens_at
                }
            };

            poll_count >= opens_at && poll_count < opens_at + self.width
        })
    }
}
