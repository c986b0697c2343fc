//! # Autonomous routines
//!
//! This module builds autonomous routines out of trajectories and triggers:
//!
//! - [`AutoFactory`] loads trajectories and creates routines and trajectories bound to them.
//! - [`AutoRoutine`] owns a poll loop and is driven once per cycle by its command.
//! - [`AutoTrajectory`] follows a trajectory on behalf of a routine and exposes triggers
//!   describing its progress (active, done, at a time, at an event, at a pose).

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Stateful conditions behind the pulse and done triggers
mod conditions;

/// Creates routines and trajectories
pub mod factory;

/// Routine poll loop and lifecycle
pub mod routine;

/// Trajectory following and progress triggers
pub mod trajectory;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use factory::{AutoFactory, CommandFactory};
pub use routine::AutoRoutine;
pub use trajectory::{AutoIo, AutoTrajectory, PoseTolerance, TrajectoryLogger};
