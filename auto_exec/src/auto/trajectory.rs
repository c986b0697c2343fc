//! # Auto trajectories
//!
//! An [`AutoTrajectory`] follows a trajectory, or a group of trajectories played back to back, on
//! behalf of an [`AutoRoutine`]. It provides the command which drives the robot along the
//! trajectory, and triggers on the routine's poll loop describing how far along it the robot is.
//!
//! The command moves through a small state machine:
//!
//! ```text
//! Idle -> Running -> { Finished | Interrupted } -> Idle
//! ```
//!
//! Each start of the command is a new run. Triggers which remember earlier polls (time pulses,
//! done pulses) key that memory on the run number, so re-running a trajectory behaves exactly like
//! running it for the first time.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, info, warn};
use nalgebra::Vector2;
use std::cell::{Cell, RefCell};
use std::f64::consts::PI;
use std::rc::{Rc, Weak};

use super::conditions::{DoneWindow, TimePulse};
use super::routine::{AutoRoutine, RoutineShared, SiblingReset};
use crate::alert::{Alerts, AutoDiagnostic};
use crate::clock::{Clock, Timer};
use crate::command::{Command, InstantCommand};
use crate::flip::AllianceContext;
use crate::geometry::{ChassisSpeeds, Pose};
use crate::sample::TrajectorySample;
use crate::trajectory::Trajectory;
use crate::trigger::{PollLoop, Trigger};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Resource required by every trajectory command, so only one trajectory drives at a time.
pub const DRIVE_REQUIREMENT: &str = "drive";

/// Default translation tolerance of pose triggers (3 inches).
pub const DEFAULT_TOLERANCE_M: f64 = 0.0762;

/// Default heading tolerance of pose triggers.
pub const DEFAULT_TOLERANCE_RAD: f64 = PI / 16.0;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Receives each trajectory as it starts and finishes being followed.
pub trait TrajectoryLogger<S> {
    fn log(&self, trajectory: &Trajectory<S>, starting: bool);
}

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// The robot-side collaborators an auto trajectory reads from and writes to.
pub struct AutoIo<S> {
    /// Current field-relative pose estimate
    pub(crate) pose: Rc<dyn Fn() -> Pose>,

    /// Resets the pose estimate
    pub(crate) reset_odometry: Rc<dyn Fn(&Pose)>,

    /// Computes a velocity command from the current pose and the reference sample
    pub(crate) controller: Rc<RefCell<dyn FnMut(&Pose, &S) -> ChassisSpeeds>>,

    /// Sends a velocity command to the drivetrain
    pub(crate) drive: Rc<dyn Fn(&ChassisSpeeds)>,

    /// Whether the robot is enabled for autonomous operation
    pub(crate) enabled: Rc<dyn Fn() -> bool>,

    pub(crate) logger: Option<Rc<dyn TrajectoryLogger<S>>>,
}

/// Tolerances applied by pose triggers.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PoseTolerance {
    pub translation_m: f64,
    pub heading_rad: f64,
}

/// Follows a trajectory for an [`AutoRoutine`].
///
/// Cloning gives another handle to the same trajectory and state.
pub struct AutoTrajectory<S: TrajectorySample> {
    shared: Rc<TrajectoryShared<S>>,
}

/// State shared between an [`AutoTrajectory`], its command, and its triggers.
pub(crate) struct TrajectoryShared<S: TrajectorySample> {
    name: String,

    /// Trajectories followed back to back, never empty for a followable trajectory
    segments: Vec<Rc<Trajectory<S>>>,

    io: AutoIo<S>,
    alliance: AllianceContext,

    /// The owning routine, `None` for a trajectory followed outside of any routine
    routine: Option<Weak<RoutineShared>>,

    poll_loop: PollLoop,
    alerts: Alerts,
    tolerance: PoseTolerance,

    timer: Timer,
    is_active: Cell<bool>,
    is_completed: Cell<bool>,
    run_count: Cell<u64>,
    segment_index: Cell<usize>,

    /// Set once the alliance has been reported lost during the current run
    alliance_lost: Cell<bool>,

    /// Time at which the current segment started
    segment_offset_s: Cell<f64>,
}

/// The command which follows a trajectory.
struct TrajectoryCommand<S: TrajectorySample> {
    name: String,
    trajectory: Rc<TrajectoryShared<S>>,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl<S, F> TrajectoryLogger<S> for F
where
    F: Fn(&Trajectory<S>, bool),
{
    fn log(&self, trajectory: &Trajectory<S>, starting: bool) {
        self(trajectory, starting)
    }
}

impl<S: TrajectorySample> AutoIo<S> {
    /// Create the collaborators, with the robot always enabled and no trajectory logger.
    pub fn new<P, R, C, D>(pose: P, reset_odometry: R, controller: C, drive: D) -> Self
    where
        P: Fn() -> Pose + 'static,
        R: Fn(&Pose) + 'static,
        C: FnMut(&Pose, &S) -> ChassisSpeeds + 'static,
        D: Fn(&ChassisSpeeds) + 'static,
    {
        Self {
            pose: Rc::new(pose),
            reset_odometry: Rc::new(reset_odometry),
            controller: Rc::new(RefCell::new(controller)),
            drive: Rc::new(drive),
            enabled: Rc::new(|| true),
            logger: None,
        }
    }

    pub fn with_enabled<E: Fn() -> bool + 'static>(mut self, enabled: E) -> Self {
        self.enabled = Rc::new(enabled);
        self
    }

    pub fn with_logger<L: TrajectoryLogger<S> + 'static>(mut self, logger: L) -> Self {
        self.logger = Some(Rc::new(logger));
        self
    }
}

impl<S> Clone for AutoIo<S> {
    fn clone(&self) -> Self {
        Self {
            pose: self.pose.clone(),
            reset_odometry: self.reset_odometry.clone(),
            controller: self.controller.clone(),
            drive: self.drive.clone(),
            enabled: self.enabled.clone(),
            logger: self.logger.clone(),
        }
    }
}

impl Default for PoseTolerance {
    fn default() -> Self {
        Self {
            translation_m: DEFAULT_TOLERANCE_M,
            heading_rad: DEFAULT_TOLERANCE_RAD,
        }
    }
}

impl<S: TrajectorySample> Clone for AutoTrajectory<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<S: TrajectorySample> AutoTrajectory<S> {
    pub(crate) fn new(
        name: String,
        segments: Vec<Rc<Trajectory<S>>>,
        io: AutoIo<S>,
        alliance: AllianceContext,
        routine: &AutoRoutine,
        alerts: Alerts,
        clock: Rc<dyn Clock>,
        tolerance: PoseTolerance,
    ) -> Self {
        let shared = Rc::new(TrajectoryShared::new(
            name,
            segments,
            io,
            alliance,
            Some(routine.downgrade()),
            routine.poll_loop().clone(),
            alerts,
            clock,
            tolerance,
        ));

        let sibling: Weak<TrajectoryShared<S>> = Rc::downgrade(&shared);
        routine.register_trajectory(sibling as Weak<dyn SiblingReset>);

        Self { shared }
    }

    /// A trajectory followed outside of any routine.
    ///
    /// Its triggers are bound to a private poll loop which is never polled, so only its commands
    /// are of use.
    pub(crate) fn standalone(
        name: String,
        segments: Vec<Rc<Trajectory<S>>>,
        io: AutoIo<S>,
        alliance: AllianceContext,
        alerts: Alerts,
        clock: Rc<dyn Clock>,
        tolerance: PoseTolerance,
    ) -> Self {
        Self {
            shared: Rc::new(TrajectoryShared::new(
                name,
                segments,
                io,
                alliance,
                None,
                PollLoop::new(),
                alerts,
                clock,
                tolerance,
            )),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Total duration of every segment.
    pub fn total_time_s(&self) -> f64 {
        self.shared.total_time_s()
    }

    /// Whether the trajectory is being followed and its routine is active.
    pub fn is_active(&self) -> bool {
        self.shared.active()
    }

    /// Number of times the trajectory's command has been started.
    pub fn run_count(&self) -> u64 {
        self.shared.run_count()
    }

    /// The command which follows this trajectory.
    ///
    /// If the trajectory has no samples the command instead raises an alert and finishes
    /// immediately.
    pub fn cmd(&self) -> Box<dyn Command> {
        let command_name = format!("trajectory {}", self.shared.name);

        if !self.shared.is_followable() {
            let alerts = self.shared.alerts.clone();
            let trajectory = self.shared.name.clone();

            return InstantCommand::new(command_name, move || {
                alerts.error(AutoDiagnostic::EmptySamples {
                    trajectory: trajectory.clone(),
                })
            })
            .boxed();
        }

        Box::new(TrajectoryCommand {
            name: command_name,
            trajectory: self.shared.clone(),
        })
    }

    /// A command which resets odometry to the (flipped) start of this trajectory.
    ///
    /// If the start pose is not available, because the trajectory is empty or the alliance is
    /// unknown, the command kills the routine instead (or only warns outside of a routine).
    pub fn reset_odometry(&self) -> Box<dyn Command> {
        let shared = self.shared.clone();

        InstantCommand::new(format!("reset odometry {}", self.shared.name), move || {
            match shared.initial_pose() {
                Some(pose) => {
                    debug!("Resetting odometry to {:?}", pose);
                    (shared.io.reset_odometry)(&pose)
                }
                None => match shared.routine() {
                    Some(routine) => {
                        warn!(
                            "No initial pose available for \"{}\", killing the routine",
                            shared.name
                        );
                        routine.kill();
                    }
                    None => warn!("No initial pose available for \"{}\"", shared.name),
                },
            }
        })
        .boxed()
    }

    /// The flip-adjusted first pose, `None` if empty or the alliance is unknown.
    pub fn initial_pose(&self) -> Option<Pose> {
        self.shared.initial_pose()
    }

    /// The flip-adjusted last pose, `None` if empty or the alliance is unknown.
    pub fn final_pose(&self) -> Option<Pose> {
        self.shared.final_pose()
    }

    /// True while the trajectory is being followed and its routine is active.
    pub fn active(&self) -> Trigger {
        let shared = self.shared.clone();
        Trigger::new(&self.shared.poll_loop, move || shared.active())
    }

    pub fn inactive(&self) -> Trigger {
        self.active().negate()
    }

    /// True for one poll when the trajectory finishes without being interrupted.
    pub fn done(&self) -> Trigger {
        self.done_delayed(0)
    }

    /// True for the single poll `cycles` polls after the trajectory is first seen to have
    /// finished without being interrupted.
    pub fn done_delayed(&self, cycles: u64) -> Trigger {
        self.inactive().and(&self.done_window(cycles, 1))
    }

    /// True for `cycles` polls after the trajectory is first seen to have finished.
    pub fn done_for(&self, cycles: u64) -> Trigger {
        self.inactive().and(&self.done_window(0, cycles))
    }

    /// True from when the trajectory finishes until it, or another trajectory in the same
    /// routine, starts.
    pub fn recently_done(&self) -> Trigger {
        let shared = self.shared.clone();
        Trigger::new(&self.shared.poll_loop, move || {
            shared.is_completed() && !shared.active()
        })
    }

    /// True for the one poll in which the time since the trajectory started reaches `time_s`.
    ///
    /// Times outside of the trajectory raise a warning and give a trigger which is never true.
    pub fn at_time(&self, time_s: f64) -> Trigger {
        let total_s = self.total_time_s();

        if !(0.0..=total_s).contains(&time_s) {
            self.shared.alerts.warn(AutoDiagnostic::InvalidTriggerTime {
                time_s,
                trajectory: self.shared.name.clone(),
                total_s,
            });
            return Trigger::off(&self.shared.poll_loop);
        }

        Trigger::from_condition(
            &self.shared.poll_loop,
            Rc::new(TimePulse::new(
                self.shared.clone(),
                time_s,
                self.shared.poll_loop.cycle_counter(),
            )),
        )
    }

    /// True for one poll at each event marker with the given name.
    ///
    /// Markers are searched across every segment. If none match a warning is raised and the
    /// trigger is never true.
    pub fn at_event(&self, event: &str) -> Trigger {
        let times = self.event_times(event);

        if times.is_empty() {
            return self.event_not_found(event);
        }

        times
            .iter()
            .fold(Trigger::off(&self.shared.poll_loop), |trigger, time_s| {
                trigger.or(&self.at_time(*time_s))
            })
    }

    /// True while the trajectory is active and the robot is within tolerance of `pose`.
    ///
    /// `pose` is given for the blue alliance and flipped as needed. While flipping is enabled
    /// and the alliance is unknown the trigger is false.
    pub fn at_pose(&self, pose: Pose, tolerance_m: f64, tolerance_rad: f64) -> Trigger {
        let shared = self.shared.clone();
        Trigger::new(&self.shared.poll_loop, move || {
            shared.active() && shared.is_near(&pose, tolerance_m, Some(tolerance_rad))
        })
    }

    /// True while the trajectory is active and the robot is within `tolerance_m` of `point`,
    /// regardless of heading.
    pub fn at_translation(&self, point_m: Vector2<f64>, tolerance_m: f64) -> Trigger {
        let shared = self.shared.clone();
        let pose = Pose {
            position_m: point_m,
            heading_rad: 0.0,
        };

        Trigger::new(&self.shared.poll_loop, move || {
            shared.active() && shared.is_near(&pose, tolerance_m, None)
        })
    }

    /// True while the robot is within tolerance of the pose at any event marker with the given
    /// name.
    pub fn at_event_pose(&self, event: &str, tolerance_m: f64, tolerance_rad: f64) -> Trigger {
        let poses = self.shared.event_poses(event);

        if poses.is_empty() {
            return self.event_not_found(event);
        }

        poses
            .into_iter()
            .fold(Trigger::off(&self.shared.poll_loop), |trigger, pose| {
                trigger.or(&self.at_pose(pose, tolerance_m, tolerance_rad))
            })
    }

    /// True at an event's time if the robot is also at the event's pose, within the default
    /// tolerances.
    pub fn at_event_time_and_place(&self, event: &str) -> Trigger {
        if self.event_times(event).is_empty() {
            return self.event_not_found(event);
        }

        let tolerance = self.shared.tolerance;
        self.at_event(event).and(&self.at_event_pose(
            event,
            tolerance.translation_m,
            tolerance.heading_rad,
        ))
    }

    /// Times of every event marker with the given name, measured from the start of the first
    /// segment.
    pub fn event_times(&self, event: &str) -> Vec<f64> {
        let mut offset_s = 0.0;
        let mut times = Vec::new();

        for segment in &self.shared.segments {
            times.extend(
                segment
                    .events_named(event)
                    .iter()
                    .map(|e| offset_s + e.timestamp_s),
            );
            offset_s += segment.total_time_s();
        }

        times
    }

    /// Flip-adjusted poses at every event marker with the given name.
    ///
    /// While flipping is enabled and the alliance is unknown the blue alliance poses are given.
    pub fn event_poses(&self, event: &str) -> Vec<Pose> {
        self.shared
            .event_poses(event)
            .iter()
            .map(|pose| self.shared.alliance.flip_pose(pose).unwrap_or(*pose))
            .collect()
    }

    fn done_window(&self, delay: u64, width: u64) -> Trigger {
        Trigger::from_condition(
            &self.shared.poll_loop,
            Rc::new(DoneWindow::new(
                self.shared.clone(),
                delay,
                width,
                self.shared.poll_loop.cycle_counter(),
            )),
        )
    }

    fn event_not_found(&self, event: &str) -> Trigger {
        self.shared.alerts.warn(AutoDiagnostic::EventNotFound {
            event: event.to_string(),
            trajectory: self.shared.name.clone(),
        });
        Trigger::off(&self.shared.poll_loop)
    }
}

impl<S: TrajectorySample> TrajectoryShared<S> {
    fn new(
        name: String,
        segments: Vec<Rc<Trajectory<S>>>,
        io: AutoIo<S>,
        alliance: AllianceContext,
        routine: Option<Weak<RoutineShared>>,
        poll_loop: PollLoop,
        alerts: Alerts,
        clock: Rc<dyn Clock>,
        tolerance: PoseTolerance,
    ) -> Self {
        Self {
            name,
            segments,
            io,
            alliance,
            routine,
            poll_loop,
            alerts,
            tolerance,
            timer: Timer::new(clock),
            is_active: Cell::new(false),
            is_completed: Cell::new(false),
            run_count: Cell::new(0),
            segment_index: Cell::new(0),
            alliance_lost: Cell::new(false),
            segment_offset_s: Cell::new(0.0),
        }
    }

    pub(crate) fn run_count(&self) -> u64 {
        self.run_count.get()
    }

    /// Time since the current run started.
    pub(crate) fn elapsed_s(&self) -> f64 {
        self.timer.elapsed_s()
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.is_completed.get()
    }

    pub(crate) fn active(&self) -> bool {
        self.is_active.get() && self.routine_active()
    }

    pub(crate) fn routine_poll_count(&self) -> u64 {
        self.routine().map_or(0, |r| r.poll_count())
    }

    fn routine(&self) -> Option<Rc<RoutineShared>> {
        self.routine.as_ref().and_then(Weak::upgrade)
    }

    /// Whether the owning routine is active. A trajectory outside of any routine always is.
    fn routine_active(&self) -> bool {
        match self.routine {
            Some(ref routine) => routine.upgrade().map_or(false, |r| r.is_active()),
            None => true,
        }
    }

    fn total_time_s(&self) -> f64 {
        self.segments.iter().map(|s| s.total_time_s()).sum()
    }

    fn is_followable(&self) -> bool {
        !self.segments.is_empty() && self.segments.iter().all(|s| !s.is_empty())
    }

    fn initial_pose(&self) -> Option<Pose> {
        let pose = self.segments.first()?.initial_pose(None)?;
        self.alliance.flip_pose(&pose)
    }

    fn final_pose(&self) -> Option<Pose> {
        let pose = self.segments.last()?.final_pose(None)?;
        self.alliance.flip_pose(&pose)
    }

    /// Blue alliance poses at every event marker with the given name.
    fn event_poses(&self, event: &str) -> Vec<Pose> {
        self.segments
            .iter()
            .flat_map(|segment| {
                segment
                    .events_named(event)
                    .into_iter()
                    .filter_map(move |e| segment.sample_at(e.timestamp_s, None))
                    .map(|s| s.pose())
            })
            .collect()
    }

    /// Whether the robot is within tolerance of the flip-adjusted `reference`.
    fn is_near(&self, reference: &Pose, tolerance_m: f64, tolerance_rad: Option<f64>) -> bool {
        let reference = match self.alliance.flip_pose(reference) {
            Some(p) => p,
            None => return false,
        };
        let current = (self.io.pose)();

        current.distance_to(&reference) < tolerance_m
            && tolerance_rad.map_or(true, |tol| current.heading_error_to(&reference).abs() < tol)
    }

    fn start(&self) {
        if let Some(routine) = self.routine() {
            routine.on_trajectory_start();
        }

        self.timer.restart();
        self.segment_index.set(0);
        self.segment_offset_s.set(0.0);
        self.run_count.set(self.run_count.get() + 1);
        self.is_active.set(true);
        self.is_completed.set(false);
        self.alliance_lost.set(false);

        self.log(true);
        info!(
            "Following trajectory \"{}\" ({:.2} s, run {})",
            self.name,
            self.total_time_s(),
            self.run_count.get()
        );
    }

    fn follow(&self) {
        let elapsed_s = self.timer.elapsed_s();

        let segment = match self.advance_segment(elapsed_s) {
            Some(s) => s,
            None => return,
        };

        // Without a known alliance the side of the field is unknown, so hold still
        let flipper = match self.alliance.should_flip() {
            Some(true) => Some(self.alliance.flipper()),
            Some(false) => None,
            None => {
                if !self.alliance_lost.replace(true) {
                    self.alerts.warn(AutoDiagnostic::AllianceLost {
                        trajectory: self.name.clone(),
                    });
                }
                (self.io.drive)(&ChassisSpeeds::zero());
                return;
            }
        };

        let sample = match segment.sample_at(elapsed_s - self.segment_offset_s.get(), flipper) {
            Some(s) => s,
            None => return,
        };

        let pose = (self.io.pose)();
        let speeds = {
            let mut controller = self.io.controller.borrow_mut();
            (&mut *controller)(&pose, &sample)
        };

        (self.io.drive)(&speeds);
    }

    fn finish(&self, interrupted: bool) {
        self.timer.stop();

        // A routine which stopped polling is treated as an interruption
        let interrupted = interrupted || !self.routine_active();

        let speeds = if interrupted || !self.alliance.alliance_ready() {
            ChassisSpeeds::zero()
        }
        else {
            self.segments
                .last()
                .and_then(|s| s.final_sample(self.alliance.active_flipper()))
                .map_or_else(ChassisSpeeds::zero, |s| s.chassis_speeds())
        };
        (self.io.drive)(&speeds);

        self.is_completed.set(!interrupted);
        self.is_active.set(false);
        self.log(false);

        if interrupted {
            info!(
                "Trajectory \"{}\" interrupted after {:.2} s",
                self.name,
                self.timer.elapsed_s()
            );
        }
        else {
            info!("Trajectory \"{}\" finished", self.name);
        }
    }

    fn is_finished(&self) -> bool {
        self.timer.elapsed_s() > self.total_time_s() || !self.routine_active()
    }

    /// Move on to the next segment if the current one has run its course.
    fn advance_segment(&self, elapsed_s: f64) -> Option<&Rc<Trajectory<S>>> {
        let mut index = self.segment_index.get();
        let mut offset_s = self.segment_offset_s.get();

        while index + 1 < self.segments.len()
            && elapsed_s - offset_s > self.segments[index].total_time_s()
        {
            offset_s += self.segments[index].total_time_s();
            index += 1;
            debug!(
                "Trajectory \"{}\" moving to segment {} at {:.3} s",
                self.name, index, offset_s
            );
        }

        self.segment_index.set(index);
        self.segment_offset_s.set(offset_s);
        self.segments.get(index)
    }

    fn log(&self, starting: bool) {
        if let Some(ref logger) = self.io.logger {
            for segment in &self.segments {
                logger.log(segment, starting);
            }
        }
    }
}

impl<S: TrajectorySample> SiblingReset for TrajectoryShared<S> {
    fn on_sibling_start(&self) {
        self.is_completed.set(false);
    }
}

impl<S: TrajectorySample> Command for TrajectoryCommand<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn requirement(&self) -> Option<&str> {
        Some(DRIVE_REQUIREMENT)
    }

    fn initialize(&mut self) {
        self.trajectory.start();
    }

    fn execute(&mut self) {
        self.trajectory.follow();
    }

    fn end(&mut self, interrupted: bool) {
        self.trajectory.finish(interrupted);
    }

    fn is_finished(&self) -> bool {
        self.trajectory.is_finished()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::alert::AlertLevel;
    use crate::auto::factory::test::{line, record, start_on_active, Harness};
    use crate::flip::Alliance;
    use crate::trajectory::EventMarker;
    use approx::assert_relative_eq;

    /// Requires the drivetrain and never finishes.
    struct Hold;

    impl Command for Hold {
        fn name(&self) -> &str {
            "hold"
        }

        fn requirement(&self) -> Option<&str> {
            Some(DRIVE_REQUIREMENT)
        }

        fn is_finished(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_follows_and_finishes() {
        let harness = Harness::new(false);
        let routine = harness.factory.new_routine("follow");
        let traj = harness.factory.trajectory_from(&routine, line("line", 0.5));
        start_on_active(&harness, &routine, &traj);

        harness.tick(0.02);
        assert!(!traj.is_active());

        // The routine is active from its second poll, which starts the trajectory
        harness.tick(0.02);
        harness.tick(0.02);
        assert!(traj.is_active());
        assert_eq!(traj.run_count(), 1);
        assert_eq!(harness.logged.borrow().as_slice(), &[("line".to_string(), true)]);

        for _ in 0..40 {
            harness.tick(0.02);
        }

        assert!(!traj.is_active());
        assert!(harness.scheduler.is_running("follow"));
        assert!(!harness.scheduler.is_running("trajectory line"));
        assert_eq!(harness.logged.borrow().len(), 2);

        // Hand-off at the final sample's velocity
        let drive = harness.drive.borrow();
        assert!(drive.len() > 20);
        assert_relative_eq!(drive[drive.len() - 1].vx_ms, 1.0);
    }

    #[test]
    fn test_empty_trajectory_cmd() {
        let harness = Harness::new(false);
        let routine = harness.factory.new_routine("empty");
        let traj = harness.factory.trajectory(&routine, "missing");

        assert_eq!(traj.total_time_s(), 0.0);
        assert!(traj.initial_pose().is_none());

        harness.scheduler.schedule(traj.cmd());
        harness.tick(0.02);

        assert_eq!(harness.scheduler.num_running(), 0);
        assert!(harness.drive.borrow().is_empty());
        assert!(harness.alerts.contains("has no samples"));
        assert!(!traj.is_active());
    }

    #[test]
    fn test_done_edge() {
        for delay in 0..3 {
            let harness = Harness::new(false);
            let routine = harness.factory.new_routine("done");
            let traj = harness.factory.trajectory_from(&routine, line("line", 0.1));
            start_on_active(&harness, &routine, &traj);

            let series = record(&harness, &[traj.done_delayed(delay), traj.recently_done()], 30);
            let (done, recently_done) = (&series[0], &series[1]);

            // The first poll which sees the trajectory complete
            let completion = recently_done.iter().position(|v| *v).unwrap();
            assert!(completion > 2);

            for (poll, value) in done.iter().enumerate() {
                assert_eq!(
                    *value,
                    poll == completion + delay as usize,
                    "delay {}, poll {}",
                    delay,
                    poll
                );
            }
        }
    }

    #[test]
    fn test_done_never_true_when_interrupted() {
        let harness = Harness::new(false);
        let routine = harness.factory.new_routine("interrupted");
        let traj = harness.factory.trajectory_from(&routine, line("line", 1.0));
        start_on_active(&harness, &routine, &traj);

        let done = traj.done();
        let recently_done = traj.recently_done();
        let seen = Rc::new(Cell::new(false));
        let s = seen.clone();
        let poll_loop = done.poll_loop().clone();
        Trigger::new(&poll_loop, || true).while_true(move || {
            if done.get() || recently_done.get() {
                s.set(true);
            }
        });

        for i in 0..60 {
            if i == 10 {
                // Another drive command takes over
                assert!(traj.is_active());
                harness.scheduler.schedule(Box::new(Hold));
            }
            harness.tick(0.02);
        }

        assert!(!seen.get());
        assert!(!traj.is_active());
        let drive = harness.drive.borrow();
        assert_relative_eq!(drive[drive.len() - 1].vx_ms, 0.0);
    }

    #[test]
    fn test_alliance_lost_mid_run_holds_still() {
        let harness = Harness::new(true);
        harness.alliance.set(Some(Alliance::Red));
        let routine = harness.factory.new_routine("lost");
        let traj = harness.factory.trajectory_from(&routine, line("line", 1.0));
        start_on_active(&harness, &routine, &traj);

        for _ in 0..10 {
            harness.tick(0.02);
        }
        assert!(traj.is_active());
        let followed = harness.drive.borrow().len();
        assert!(followed > 5);

        harness.alliance.set(None);
        harness.tick(0.02);
        harness.tick(0.02);

        // Never a blue side command on a red robot, and stopped at the end
        let drive = harness.drive.borrow();
        assert!(drive.len() > followed);
        assert!(drive.iter().all(|s| s.vx_ms <= 0.0), "{:?}", *drive);
        assert_relative_eq!(drive[drive.len() - 1].vx_ms, 0.0);

        assert!(!traj.is_active());
        assert!(!traj.recently_done().get());
        assert!(harness.alerts.contains("Alliance lost"));
    }

    #[test]
    fn test_standalone_follows_without_routine() {
        let harness = Harness::new(false);
        let cmd = harness.factory.trajectory_cmd("line");
        assert_eq!(cmd.requirement(), Some(DRIVE_REQUIREMENT));
        harness.scheduler.schedule(cmd);

        harness.tick(0.02);
        assert_eq!(harness.scheduler.num_running(), 1);

        for _ in 0..60 {
            harness.tick(0.02);
        }

        // Followed to the end and handed off at the final velocity
        assert_eq!(harness.scheduler.num_running(), 0);
        let drive = harness.drive.borrow();
        assert!(drive.len() > 45);
        assert_relative_eq!(drive[drive.len() - 1].vx_ms, 1.0, epsilon = 1e-9);
        assert_eq!(
            harness.logged.borrow().as_slice(),
            &[("line".to_string(), true), ("line".to_string(), false)]
        );
    }

    #[test]
    fn test_at_time_pulses_once_per_run() {
        let harness = Harness::new(false);
        let routine = harness.factory.new_routine("pulse");
        let traj = harness.factory.trajectory_from(&routine, line("line", 1.0));
        let at_half = traj.at_time(0.5);

        // Run the trajectory a second time once the first run is done
        traj.done().on_true({
            let scheduler = harness.scheduler.clone();
            let traj = traj.clone();
            let mut reruns = 0;
            move || {
                if reruns == 0 {
                    reruns += 1;
                    scheduler.schedule(traj.cmd());
                }
            }
        });
        start_on_active(&harness, &routine, &traj);

        let series = record(&harness, &[at_half], 150);

        assert_eq!(traj.run_count(), 2);
        assert_eq!(series[0].iter().filter(|v| **v).count(), 2);
    }

    #[test]
    fn test_invalid_times_and_events() {
        let harness = Harness::new(false);
        let routine = harness.factory.new_routine("invalid");
        let traj = harness.factory.trajectory_from(&routine, line("line", 1.0));

        assert!(!traj.at_time(-0.1).get());
        assert!(!traj.at_time(1.5).get());
        assert!(!traj.at_event("nope").get());
        assert!(!traj.at_event_time_and_place("nope").get());
        assert_eq!(harness.alerts.count(AlertLevel::Warning), 4);
        assert!(harness.alerts.contains("\"nope\" not found"));
    }

    #[test]
    fn test_group_events_and_segments() {
        let harness = Harness::new(false);
        let routine = harness.factory.new_routine("group");

        let marked = |name: &str, duration_s: f64| {
            Trajectory::new(
                name,
                line(name, duration_s).samples().to_vec(),
                vec![],
                vec![EventMarker::new(0.25, "mark")],
            )
        };

        let group = harness
            .factory
            .trajectory_group_from(&routine, vec![marked("first", 1.0), marked("second", 0.5)]);
        assert_eq!(group.name(), "first+second");
        assert_relative_eq!(group.total_time_s(), 1.5);
        assert_eq!(group.event_times("mark"), vec![0.25, 1.25]);

        let poses = group.event_poses("mark");
        assert_eq!(poses.len(), 2);
        assert_relative_eq!(poses[0].x(), 0.25, epsilon = 1e-9);
        assert_relative_eq!(poses[1].x(), 0.25, epsilon = 1e-9);

        start_on_active(&harness, &routine, &group);
        let series = record(&harness, &[group.at_event("mark")], 100);

        assert_eq!(series[0].iter().filter(|v| **v).count(), 2);
        assert_eq!(group.run_count(), 1);
        assert!(!group.is_active());

        // The hand-off velocity comes from the end of the last segment
        let drive = harness.drive.borrow();
        assert_relative_eq!(drive[drive.len() - 1].vx_ms, 1.0);
    }

    #[test]
    fn test_pose_triggers() {
        let harness = Harness::new(true);
        let routine = harness.factory.new_routine("pose");
        let traj = harness.factory.trajectory_from(&routine, line("line", 1.0));

        let target = Pose::new(0.5, 0.0, 0.0);
        let at_pose = traj.at_pose(target, 0.1, 0.1);
        let at_translation = traj.at_translation(Vector2::new(0.5, 0.0), 0.1);

        // Not active yet
        harness.pose.set(target);
        assert!(!at_pose.get());

        start_on_active(&harness, &routine, &traj);
        harness.tick(0.02);
        harness.tick(0.02);
        harness.tick(0.02);
        assert!(traj.is_active());
        assert!(at_pose.get());
        assert!(at_translation.get());

        // Heading outside of tolerance only affects the pose trigger
        harness.pose.set(Pose::new(0.5, 0.0, 0.5));
        assert!(!at_pose.get());
        assert!(at_translation.get());

        // On the red alliance the reference is rotated about the field centre
        harness.alliance.set(Some(Alliance::Red));
        harness.pose.set(target);
        assert!(!at_translation.get());

        let flipped = traj.initial_pose().unwrap();
        assert_relative_eq!(flipped.x(), 17.548, epsilon = 1e-9);
        assert_relative_eq!(flipped.y(), 8.052, epsilon = 1e-9);

        // An unknown alliance gives false rather than a guess
        harness.alliance.set(None);
        assert!(traj.initial_pose().is_none());
        assert!(!at_translation.get());
    }

    #[test]
    fn test_reset_odometry() {
        let harness = Harness::new(true);
        let routine = harness.factory.new_routine("reset");
        let traj = harness.factory.trajectory_from(&routine, line("line", 1.0));

        harness.scheduler.schedule(traj.reset_odometry());
        assert_eq!(harness.resets.borrow().as_slice(), &[Pose::new(0.0, 0.0, 0.0)]);
        assert!(!routine.is_killed());

        harness.alliance.set(None);
        harness.scheduler.schedule(traj.reset_odometry());
        assert_eq!(harness.resets.borrow().len(), 1);
        assert!(routine.is_killed());
    }
}
