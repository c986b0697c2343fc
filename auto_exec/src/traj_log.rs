//! # Trajectory session log
//!
//! Archives the poses of each trajectory the robot starts following into the session directory,
//! as they will be followed (flipped for the current alliance).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::info;
use serde::Serialize;

use crate::auto::TrajectoryLogger;
use crate::flip::{Alliance, AllianceContext};
use crate::geometry::Pose;
use crate::sample::TrajectorySample;
use crate::trajectory::Trajectory;
use util::session;

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Logs trajectories to the session.
pub struct SessionTrajectoryLogger {
    alliance: AllianceContext,
}

/// The archived form of a started trajectory.
#[derive(Debug, Clone, Serialize)]
pub struct TrajectoryRecord {
    pub name: String,
    pub alliance: Option<Alliance>,
    pub flipped: bool,
    pub session_time_s: f64,
    pub total_time_s: f64,
    pub poses: Vec<Pose>,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl SessionTrajectoryLogger {
    pub fn new(alliance: AllianceContext) -> Self {
        Self { alliance }
    }
}

impl<S: TrajectorySample> TrajectoryLogger<S> for SessionTrajectoryLogger {
    fn log(&self, trajectory: &Trajectory<S>, starting: bool) {
        if !starting {
            info!("Trajectory \"{}\" no longer followed", trajectory.name());
            return;
        }

        let record = TrajectoryRecord::new(trajectory, &self.alliance);
        session::save_with_timestamp(format!("trajectories/{}.json", record.name), record);
    }
}

impl TrajectoryRecord {
    pub fn new<S: TrajectorySample>(trajectory: &Trajectory<S>, alliance: &AllianceContext) -> Self {
        let poses = match alliance.active_flipper() {
            Some(flipper) => trajectory.flipped(flipper).poses(),
            None => trajectory.poses(),
        };

        Self {
            name: trajectory.name().to_string(),
            alliance: alliance.alliance(),
            flipped: alliance.active_flipper().is_some(),
            session_time_s: session::get_elapsed_seconds(),
            total_time_s: trajectory.total_time_s(),
            poses,
        }
    }
}
