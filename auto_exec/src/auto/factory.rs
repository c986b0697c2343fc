//! # Auto factory
//!
//! The [`AutoFactory`] is the entry point for building autonomous routines. It owns the trajectory
//! cache and the robot collaborators, and hands both to every routine and trajectory it creates.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::debug;
use std::cell::RefCell;
use std::rc::Rc;

use super::routine::AutoRoutine;
use super::trajectory::{AutoIo, AutoTrajectory, PoseTolerance};
use crate::alert::Alerts;
use crate::cache::TrajectoryCache;
use crate::clock::Clock;
use crate::command::{Command, CommandScheduler};
use crate::flip::AllianceContext;
use crate::params::AutoParams;
use crate::sample::TrajectorySample;
use crate::store::TrajectoryStore;
use crate::trajectory::Trajectory;

// ---------------------------------------------------------------------------
// TYPES
// ---------------------------------------------------------------------------

/// Builds a fresh command each time an event binding fires.
pub type CommandFactory = Rc<dyn Fn() -> Box<dyn Command>>;

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Creates routines and the trajectories followed within them.
pub struct AutoFactory<S: TrajectorySample> {
    io: AutoIo<S>,
    alliance: AllianceContext,
    cache: RefCell<TrajectoryCache<S>>,
    scheduler: CommandScheduler,
    clock: Rc<dyn Clock>,
    alerts: Alerts,
    tolerance: PoseTolerance,
    clear_cache_on_new_routine: bool,

    /// Commands started at named events in every trajectory created after they were bound
    bindings: RefCell<Vec<(String, CommandFactory)>>,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl<S: TrajectorySample> AutoFactory<S> {
    pub fn new(
        io: AutoIo<S>,
        alliance: AllianceContext,
        params: &AutoParams,
        store: Box<dyn TrajectoryStore>,
        scheduler: CommandScheduler,
        clock: Rc<dyn Clock>,
        alerts: Alerts,
    ) -> Self {
        Self {
            io,
            alliance,
            cache: RefCell::new(TrajectoryCache::new(store, alerts.clone())),
            scheduler,
            clock,
            alerts,
            tolerance: params.tolerance(),
            clear_cache_on_new_routine: params.clear_cache_on_new_routine,
            bindings: RefCell::new(Vec::new()),
        }
    }

    /// Create a new routine.
    ///
    /// If configured to do so the trajectory cache is cleared first, so edited trajectory files
    /// are picked up.
    pub fn new_routine(&self, name: &str) -> AutoRoutine {
        if self.clear_cache_on_new_routine {
            self.clear_cache();
        }

        debug!("Creating routine \"{}\"", name);

        AutoRoutine::new(
            name,
            self.alliance.clone(),
            self.io.enabled.clone(),
            self.scheduler.clone(),
            self.clock.clone(),
            self.alerts.clone(),
        )
    }

    /// A trajectory loaded by name, followed within `routine`.
    ///
    /// A trajectory which cannot be loaded raises an alert and behaves as an empty trajectory.
    pub fn trajectory(&self, routine: &AutoRoutine, name: &str) -> AutoTrajectory<S> {
        let trajectory = self.cache.borrow_mut().load(name);
        self.build(routine, name.to_string(), vec![trajectory])
    }

    /// One split of a trajectory loaded by name, followed within `routine`.
    pub fn trajectory_split(&self, routine: &AutoRoutine, name: &str, index: usize) -> AutoTrajectory<S> {
        let trajectory = self.cache.borrow_mut().load_split(name, index);
        let name = trajectory.name().to_string();
        self.build(routine, name, vec![trajectory])
    }

    /// Trajectories loaded by name and followed back to back as one.
    pub fn trajectory_group(&self, routine: &AutoRoutine, names: &[&str]) -> AutoTrajectory<S> {
        let segments = {
            let mut cache = self.cache.borrow_mut();
            names.iter().map(|n| cache.load(n)).collect()
        };
        self.build(routine, names.join("+"), segments)
    }

    /// An already built trajectory, followed within `routine`.
    pub fn trajectory_from(&self, routine: &AutoRoutine, trajectory: Trajectory<S>) -> AutoTrajectory<S> {
        let name = trajectory.name().to_string();
        self.build(routine, name, vec![Rc::new(trajectory)])
    }

    /// Already built trajectories followed back to back as one.
    pub fn trajectory_group_from(
        &self,
        routine: &AutoRoutine,
        trajectories: Vec<Trajectory<S>>,
    ) -> AutoTrajectory<S> {
        let name = trajectories
            .iter()
            .map(|t| t.name())
            .collect::<Vec<_>>()
            .join("+");
        self.build(routine, name, trajectories.into_iter().map(Rc::new).collect())
    }

    /// A command which follows a trajectory loaded by name, outside of any routine.
    ///
    /// Event bindings are not attached to the trajectory.
    pub fn trajectory_cmd(&self, name: &str) -> Box<dyn Command> {
        let trajectory = self.cache.borrow_mut().load(name);
        self.standalone(trajectory).cmd()
    }

    /// A command which follows one split of a trajectory loaded by name, outside of any routine.
    pub fn trajectory_split_cmd(&self, name: &str, index: usize) -> Box<dyn Command> {
        let trajectory = self.cache.borrow_mut().load_split(name, index);
        self.standalone(trajectory).cmd()
    }

    /// A command which follows an already built trajectory, outside of any routine.
    pub fn trajectory_cmd_from(&self, trajectory: Trajectory<S>) -> Box<dyn Command> {
        self.standalone(Rc::new(trajectory)).cmd()
    }

    /// A command which resets odometry to the (flipped) start of a trajectory loaded by name.
    pub fn reset_odometry(&self, name: &str) -> Box<dyn Command> {
        let trajectory = self.cache.borrow_mut().load(name);
        self.standalone(trajectory).reset_odometry()
    }

    /// A command which resets odometry to the (flipped) start of one split of a trajectory.
    pub fn reset_odometry_split(&self, name: &str, index: usize) -> Box<dyn Command> {
        let trajectory = self.cache.borrow_mut().load_split(name, index);
        self.standalone(trajectory).reset_odometry()
    }

    /// A routine which runs a command from `factory` each time it becomes active.
    ///
    /// Lets a plain command sequence be selected and run like any other routine.
    pub fn command_as_routine<F>(&self, name: &str, factory: F) -> AutoRoutine
    where
        F: Fn() -> Box<dyn Command> + 'static,
    {
        let routine = self.new_routine(name);
        routine.active().schedule_on_true(&self.scheduler, factory);
        routine
    }

    /// Start a command from `factory` whenever an active trajectory passes an event marker named
    /// `event`.
    ///
    /// Binding the same event again replaces the earlier binding. Bindings apply to trajectories
    /// created after the call.
    pub fn bind<F: Fn() -> Box<dyn Command> + 'static>(&self, event: &str, factory: F) {
        let factory: CommandFactory = Rc::new(factory);
        let mut bindings = self.bindings.borrow_mut();

        match bindings.iter_mut().find(|(e, _)| e == event) {
            Some(binding) => binding.1 = factory,
            None => bindings.push((event.to_string(), factory)),
        }
    }

    /// Forget every cached trajectory.
    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
    }

    /// Number of trajectories (and splits) held in the cache.
    pub fn cached_trajectories(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn alerts(&self) -> &Alerts {
        &self.alerts
    }

    pub fn alliance(&self) -> &AllianceContext {
        &self.alliance
    }

    fn standalone(&self, trajectory: Rc<Trajectory<S>>) -> AutoTrajectory<S> {
        AutoTrajectory::standalone(
            trajectory.name().to_string(),
            vec![trajectory],
            self.io.clone(),
            self.alliance.clone(),
            self.alerts.clone(),
            self.clock.clone(),
            self.tolerance,
        )
    }

    fn build(&self, routine: &AutoRoutine, name: String, segments: Vec<Rc<Trajectory<S>>>) -> AutoTrajectory<S> {
        let trajectory = AutoTrajectory::new(
            name,
            segments,
            self.io.clone(),
            self.alliance.clone(),
            routine,
            self.alerts.clone(),
            self.clock.clone(),
            self.tolerance,
        );

        for (event, factory) in self.bindings.borrow().iter() {
            // Only trajectories with the event get the binding, so a missing marker isn't reported
            if trajectory.event_times(event).is_empty() {
                continue;
            }

            let factory = factory.clone();
            trajectory
                .active()
                .and(&trajectory.at_event(event))
                .schedule_on_true(&self.scheduler, move || factory());
        }

        trajectory
    }
}
