//! # Autonomous library.
//!
//! This library provides trajectory sampling, alliance flipping and the trigger based autonomous
//! routine engine, and allows other crates in the workspace to use them.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Non-blocking diagnostics raised while building and running routines
pub mod alert;

/// Autonomous routines, trajectories and the factory which creates them
pub mod auto;

/// Cache of loaded trajectories
pub mod cache;

/// Clocks and timers
pub mod clock;

/// Commands and the command scheduler
pub mod command;

/// Alliance flipping - mirrors or rotates field data for the red alliance
pub mod flip;

/// Follow control module - keeps the robot on the trajectory being followed
pub mod follow_ctrl;

/// Poses and chassis speeds
pub mod geometry;

/// Library and executable parameters
pub mod params;

/// Trajectory samples for each drivetrain type
pub mod sample;

/// Simulated drivetrain - stands in for the drivetrain and odometry
pub mod sim_drive;

/// Loading trajectory files
pub mod store;

/// Archiving followed trajectories to the session
pub mod traj_log;

/// Sampled trajectories
pub mod trajectory;

/// Triggers and the poll loop which evaluates them
pub mod trigger;
