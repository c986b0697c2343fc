//! # Auto routines
//!
//! An [`AutoRoutine`] owns the poll loop its triggers are bound to. The routine's command polls
//! the loop once per cycle while the robot is enabled, the alliance is known (if flipping needs
//! it) and the routine has not been killed.
//!
//! The routine becomes active at the end of its first successful poll, so triggers reading
//! [`AutoRoutine::active`] during a poll see the value from the previous poll.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, info};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::trajectory::AutoTrajectory;
use crate::alert::{Alerts, AutoDiagnostic};
use crate::clock::Clock;
use crate::command::{Command, CommandScheduler};
use crate::flip::AllianceContext;
use crate::sample::TrajectorySample;
use crate::trigger::{Condition, PollLoop, Trigger};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Notified whenever any trajectory belonging to the same routine starts.
pub(crate) trait SiblingReset {
    fn on_sibling_start(&self);
}

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// A named autonomous routine.
///
/// Cloning gives another handle to the same routine. Once the last handle (including any running
/// command of the routine) is dropped, every binding on the routine's poll loop is removed.
#[derive(Clone)]
pub struct AutoRoutine {
    shared: Rc<RoutineShared>,
}

pub(crate) struct RoutineShared {
    name: String,
    poll_loop: PollLoop,
    alliance: AllianceContext,
    enabled: Rc<dyn Fn() -> bool>,
    scheduler: CommandScheduler,
    clock: Rc<dyn Clock>,
    alerts: Alerts,

    is_active: Cell<bool>,
    is_killed: Cell<bool>,
    poll_count: Cell<u64>,
    last_poll_s: Cell<Option<f64>>,

    trajectories: RefCell<Vec<Weak<dyn SiblingReset>>>,
}

/// Polls a routine once per cycle.
struct RoutineCommand {
    routine: Rc<RoutineShared>,
    until: Option<Rc<dyn Condition>>,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl AutoRoutine {
    pub(crate) fn new(
        name: &str,
        alliance: AllianceContext,
        enabled: Rc<dyn Fn() -> bool>,
        scheduler: CommandScheduler,
        clock: Rc<dyn Clock>,
        alerts: Alerts,
    ) -> Self {
        Self {
            shared: Rc::new(RoutineShared {
                name: name.to_string(),
                poll_loop: PollLoop::new(),
                alliance,
                enabled,
                scheduler,
                clock,
                alerts,
                is_active: Cell::new(false),
                is_killed: Cell::new(false),
                poll_count: Cell::new(0),
                last_poll_s: Cell::new(None),
                trajectories: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn poll_loop(&self) -> &PollLoop {
        &self.shared.poll_loop
    }

    /// Poll the routine's loop, if the routine may run.
    pub fn poll(&self) {
        self.shared.poll();
    }

    /// Cancel every command and stop the routine from ever polling again.
    pub fn kill(&self) {
        self.shared.kill();
    }

    /// Make the routine inactive and restart its poll count.
    pub fn reset(&self) {
        self.shared.reset();
    }

    pub fn is_killed(&self) -> bool {
        self.shared.is_killed.get()
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Number of successful polls since the routine was last reset.
    pub fn poll_count(&self) -> u64 {
        self.shared.poll_count()
    }

    /// Clock time of the last successful poll.
    pub fn last_poll_s(&self) -> Option<f64> {
        self.shared.last_poll_s.get()
    }

    /// True while the routine is active and the robot is enabled.
    pub fn active(&self) -> Trigger {
        let routine = Rc::downgrade(&self.shared);
        Trigger::new(&self.shared.poll_loop, move || {
            routine
                .upgrade()
                .map_or(false, |r| r.is_active() && (r.enabled)())
        })
    }

    /// A trigger on this routine's loop for an arbitrary condition.
    pub fn observe<F: Fn() -> bool + 'static>(&self, condition: F) -> Trigger {
        Trigger::new(&self.shared.poll_loop, condition)
    }

    /// The command which runs this routine until the robot is disabled or the routine is killed.
    ///
    /// If alliance flipping is enabled and the alliance is unknown when the command starts, the
    /// routine is killed.
    pub fn cmd(&self) -> Box<dyn Command> {
        Box::new(RoutineCommand {
            routine: self.shared.clone(),
            until: None,
        })
    }

    /// As [`AutoRoutine::cmd`], also finishing once `condition` is true.
    pub fn cmd_until(&self, condition: &Trigger) -> Box<dyn Command> {
        Box::new(RoutineCommand {
            routine: self.shared.clone(),
            until: Some(condition.condition()),
        })
    }

    /// True while any of the trajectories is active, and the routine is active.
    pub fn any_active<S: TrajectorySample>(&self, trajectories: &[&AutoTrajectory<S>]) -> Trigger {
        trajectories
            .iter()
            .fold(Trigger::off(&self.shared.poll_loop), |trigger, t| {
                trigger.or(&t.active())
            })
            .and(&self.active())
    }

    /// True while none of the trajectories are active, and the routine is active.
    pub fn all_inactive<S: TrajectorySample>(&self, trajectories: &[&AutoTrajectory<S>]) -> Trigger {
        trajectories
            .iter()
            .fold(self.observe(|| true), |trigger, t| trigger.and(&t.inactive()))
            .and(&self.active())
    }

    /// True for one poll when any of the trajectories finishes, and the routine is active.
    pub fn any_done<S: TrajectorySample>(&self, trajectories: &[&AutoTrajectory<S>]) -> Trigger {
        self.any_done_delayed(0, trajectories)
    }

    /// True for one poll `cycles` polls after any of the trajectories finishes, and the routine
    /// is active.
    pub fn any_done_delayed<S: TrajectorySample>(
        &self,
        cycles: u64,
        trajectories: &[&AutoTrajectory<S>],
    ) -> Trigger {
        trajectories
            .iter()
            .fold(Trigger::off(&self.shared.poll_loop), |trigger, t| {
                trigger.or(&t.done_delayed(cycles))
            })
            .and(&self.active())
    }

    pub(crate) fn downgrade(&self) -> Weak<RoutineShared> {
        Rc::downgrade(&self.shared)
    }

    pub(crate) fn register_trajectory(&self, trajectory: Weak<dyn SiblingReset>) {
        self.shared.trajectories.borrow_mut().push(trajectory);
    }
}

impl RoutineShared {
    pub(crate) fn is_active(&self) -> bool {
        self.is_active.get()
    }

    pub(crate) fn poll_count(&self) -> u64 {
        self.poll_count.get()
    }

    /// Clear the completion of every trajectory in the routine, so no stale done pulse survives
    /// into the new trajectory's run.
    pub(crate) fn on_trajectory_start(&self) {
        self.trajectories
            .borrow_mut()
            .retain(|t| t.strong_count() > 0);

        for trajectory in self.trajectories.borrow().iter() {
            if let Some(t) = trajectory.upgrade() {
                t.on_sibling_start();
            }
        }
    }

    pub(crate) fn kill(&self) {
        self.scheduler.cancel_all();

        if self.is_killed.get() {
            return;
        }

        self.reset();
        self.alerts.warn(AutoDiagnostic::RoutineKilled {
            routine: self.name.clone(),
        });
        self.is_killed.set(true);
    }

    fn poll(&self) {
        if !(self.enabled)() || !self.alliance.alliance_ready() || self.is_killed.get() {
            self.is_active.set(false);
            return;
        }

        self.poll_count.set(self.poll_count.get() + 1);
        self.last_poll_s.set(Some(self.clock.now_s()));
        self.poll_loop.poll();
        self.is_active.set(true);
    }

    fn reset(&self) {
        self.poll_count.set(0);
        self.is_active.set(false);
    }
}

impl Drop for RoutineShared {
    fn drop(&mut self) {
        debug!(
            "Routine \"{}\" dropped, clearing {} bindings",
            self.name,
            self.poll_loop.num_bindings()
        );
        self.poll_loop.clear();
    }
}

impl Command for RoutineCommand {
    fn name(&self) -> &str {
        &self.routine.name
    }

    fn initialize(&mut self) {
        if !self.routine.alliance.alliance_ready() {
            self.routine.alerts.warn(AutoDiagnostic::UnknownAllianceAtStart {
                routine: self.routine.name.clone(),
            });
            self.routine.kill();
        }
        else {
            info!("Starting routine \"{}\"", self.routine.name);
        }
    }

    fn execute(&mut self) {
        self.routine.poll();
    }

    fn end(&mut self, interrupted: bool) {
        self.routine.reset();
        info!(
            "Routine \"{}\" ended{}",
            self.routine.name,
            if interrupted { " (interrupted)" } else { "" }
        );
    }

    fn is_finished(&self) -> bool {
        !(self.routine.enabled)()
            || self.routine.is_killed.get()
            || self.until.as_ref().map_or(false, |c| c.evaluate())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::alert::AlertLevel;
    use crate::auto::factory::test::{line, record, start_on_active, Harness};

    #[test]
    fn test_active_lags_one_poll() {
        let harness = Harness::new(false);
        let routine = harness.factory.new_routine("lag");
        harness.scheduler.schedule(routine.cmd());

        let series = record(&harness, &[routine.active()], 3);
        assert_eq!(series[0], vec![false, true, true]);
        assert_eq!(routine.poll_count(), 3);
        assert!(routine.last_poll_s().is_some());
    }

    #[test]
    fn test_disabled_routine_does_not_poll() {
        let harness = Harness::new(false);
        let routine = harness.factory.new_routine("disabled");
        harness.scheduler.schedule(routine.cmd());

        harness.tick(0.02);
        harness.tick(0.02);
        assert!(routine.is_active());
        assert_eq!(routine.poll_count(), 2);

        // Disabling ends the command, which resets the routine
        harness.enabled.set(false);
        harness.tick(0.02);
        assert!(!routine.is_active());
        assert_eq!(routine.poll_count(), 0);
        assert!(!harness.scheduler.is_running("disabled"));

        routine.poll();
        assert_eq!(routine.poll_count(), 0);
    }

    #[test]
    fn test_unknown_alliance_kills_routine() {
        let harness = Harness::new(true);
        harness.alliance.set(None);
        let routine = harness.factory.new_routine("no alliance");

        harness.scheduler.schedule(routine.cmd());
        assert!(routine.is_killed());
        assert!(harness.alerts.contains("Alliance is unknown"));

        harness.tick(0.02);
        assert!(!routine.is_active());
        assert_eq!(routine.poll_count(), 0);
        assert_eq!(harness.scheduler.num_running(), 0);

        // Killing is permanent and only reported once
        let warnings = harness.alerts.count(AlertLevel::Warning);
        routine.kill();
        harness.alliance.set(Some(crate::flip::Alliance::Blue));
        routine.poll();
        assert_eq!(harness.alerts.count(AlertLevel::Warning), warnings);
        assert_eq!(routine.poll_count(), 0);
    }

    #[test]
    fn test_cmd_until() {
        let harness = Harness::new(false);
        let routine = harness.factory.new_routine("until");
        let traj = harness.factory.trajectory_from(&routine, line("line", 0.1));

        routine.active().on_true({
            let scheduler = harness.scheduler.clone();
            let traj = traj.clone();
            move || scheduler.schedule(traj.cmd())
        });
        harness.scheduler.schedule(routine.cmd_until(&traj.done()));

        for _ in 0..30 {
            harness.tick(0.02);
        }

        assert_eq!(traj.run_count(), 1);
        assert_eq!(harness.scheduler.num_running(), 0);
        assert!(!routine.is_active());
    }

    #[test]
    fn test_sibling_reset_and_composites() {
        let harness = Harness::new(false);
        let routine = harness.factory.new_routine("chain");
        let a = harness.factory.trajectory_from(&routine, line("a", 0.1));
        let b = harness.factory.trajectory_from(&routine, line("b", 0.1));

        a.done().on_true({
            let scheduler = harness.scheduler.clone();
            let b = b.clone();
            move || scheduler.schedule(b.cmd())
        });
        start_on_active(&harness, &routine, &a);

        let series = record(
            &harness,
            &[
                a.recently_done(),
                b.recently_done(),
                routine.any_done(&[&a, &b]),
                routine.any_active(&[&a, &b]),
                routine.all_inactive(&[&a, &b]),
            ],
            40,
        );
        let count = |i: usize| series[i].iter().filter(|v| **v).count();

        // Starting b clears a's completion on the next poll
        assert_eq!(count(0), 1);
        assert!(series[1][series[1].len() - 1]);
        assert_eq!(count(2), 2);

        // Both trajectories are active for at least their duration in polls
        assert!(count(3) >= 8);
        assert!(!series[3][0]);
        assert!(!series[4][0]);
        assert!(series[4][series[4].len() - 1]);
    }

    #[test]
    fn test_drop_clears_bindings() {
        let harness = Harness::new(false);
        let routine = harness.factory.new_routine("dropped");
        let traj = harness.factory.trajectory_from(&routine, line("line", 0.1));
        let poll_loop = routine.poll_loop().clone();

        traj.done().on_true(|| ());
        traj.at_time(0.05).on_true(|| ());
        routine.active().on_true(|| ());
        assert_eq!(poll_loop.num_bindings(), 3);

        drop(traj);
        drop(routine);
        assert_eq!(poll_loop.num_bindings(), 0);
    }
}
