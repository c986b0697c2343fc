//! # Geometry
//!
//! Field-relative poses and chassis velocity commands.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use util::maths::{get_ang_dist, lerp};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The pose (position and heading in the field frame) of the robot.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    /// The position in the field frame
    pub position_m: Vector2<f64>,

    /// The heading of the robot, measured anticlockwise from the field X axis
    pub heading_rad: f64,
}

/// A field-relative velocity command for the drivetrain.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChassisSpeeds {
    /// Velocity along the field X axis
    pub vx_ms: f64,

    /// Velocity along the field Y axis
    pub vy_ms: f64,

    /// Angular velocity, anticlockwise positive
    pub omega_rads: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    pub fn new(x_m: f64, y_m: f64, heading_rad: f64) -> Self {
        Self {
            position_m: Vector2::new(x_m, y_m),
            heading_rad,
        }
    }

    pub fn x(&self) -> f64 {
        self.position_m[0]
    }

    pub fn y(&self) -> f64 {
        self.position_m[1]
    }

    /// Euclidean distance between the positions of the two poses.
    pub fn distance_to(&self, other: &Pose) -> f64 {
        (other.position_m - self.position_m).norm()
    }

    /// Signed heading change which rotates this pose onto `other` along the shorter arc.
    pub fn heading_error_to(&self, other: &Pose) -> f64 {
        get_ang_dist(self.heading_rad, other.heading_rad)
    }

    /// Interpolate towards `end` by `scale`.
    ///
    /// Translation is interpolated linearly and the heading is rotated along the shorter arc, so
    /// poses either side of the +/-pi seam blend through pi rather than through zero.
    pub fn interpolate(&self, end: &Pose, scale: f64) -> Pose {
        Pose {
            position_m: Vector2::new(
                lerp(self.x(), end.x(), scale),
                lerp(self.y(), end.y(), scale),
            ),
            heading_rad: self.heading_rad + self.heading_error_to(end) * scale,
        }
    }
}

impl ChassisSpeeds {
    pub fn new(vx_ms: f64, vy_ms: f64, omega_rads: f64) -> Self {
        Self {
            vx_ms,
            vy_ms,
            omega_rads,
        }
    }

    /// Speeds which bring the chassis to a stop.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Linear speed over the ground.
    pub fn speed_ms(&self) -> f64 {
        self.vx_ms.hypot(self.vy_ms)
    }
}
