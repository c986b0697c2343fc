//! Parameters structure for SimDrive

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the simulated drivetrain.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Params {
    /// Maximum magnitude of the translational acceleration.
    ///
    /// Units: meters/second^2
    pub max_accel_mss: f64,

    /// Maximum magnitude of the angular acceleration.
    ///
    /// Units: radians/second^2
    pub max_ang_accel_radss: f64,

    /// Maximum translation speed the drivetrain can reach.
    ///
    /// Units: meters/second
    pub max_speed_ms: f64,

    /// Pose the drivetrain starts at, as `[x_m, y_m, heading_rad]`
    #[serde(default)]
    pub initial_pose: [f64; 3],
}

impl Default for Params {
    fn default() -> Self {
        Self {
            max_accel_mss: 8.0,
            max_ang_accel_radss: 20.0,
            max_speed_ms: 4.5,
            initial_pose: [0.0; 3],
        }
    }
}
