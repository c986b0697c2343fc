//! # Trajectory samples
//!
//! A sample is the state of the robot at one instant along a trajectory. Samples are plain data,
//! the only operations on them are interpolation, alliance flipping and time offsetting. Which
//! kind of sample a trajectory holds depends on the drivetrain it was generated for, and is fixed
//! when the trajectory is loaded.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod differential;
mod swerve;

pub use differential::DifferentialSample;
pub use swerve::SwerveSample;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::flip::AllianceFlipper;
use crate::geometry::{ChassisSpeeds, Pose};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Timestamp separation below which two samples are treated as coincident.
pub const COINCIDENT_EPSILON_S: f64 = 1e-6;

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// The kind of samples held by a trajectory file.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleKind {
    Swerve,
    Differential,
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A single time-stamped robot state within a trajectory.
pub trait TrajectorySample:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + 'static
{
    /// The tag used for this sample kind in trajectory files.
    const KIND: SampleKind;

    /// Time since the start of the trajectory.
    fn timestamp_s(&self) -> f64;

    /// The field-relative pose of the robot.
    fn pose(&self) -> Pose;

    /// The field-relative velocity of the robot.
    fn chassis_speeds(&self) -> ChassisSpeeds;

    /// Interpolate between this sample and `end` at the given timestamp.
    ///
    /// `timestamp_s` should lie between the two samples' timestamps.
    fn interpolate(&self, end: &Self, timestamp_s: f64) -> Self;

    /// This sample as seen from the other alliance.
    fn flipped(&self, flipper: &AllianceFlipper) -> Self;

    /// This sample with its timestamp shifted by `offset_s`.
    fn offset_by(&self, offset_s: f64) -> Self;
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleKind::Swerve => write!(f, "Swerve"),
            SampleKind::Differential => write!(f, "Differential"),
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Fraction of the way `timestamp_s` is between `start_s` and `end_s`.
pub(crate) fn interpolation_scale(start_s: f64, end_s: f64, timestamp_s: f64) -> f64 {
    (timestamp_s - start_s) / (end_s - start_s)
}
