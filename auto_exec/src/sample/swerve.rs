//! Swerve drivetrain samples

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use util::maths::lerp;

use super::{interpolation_scale, SampleKind, TrajectorySample, COINCIDENT_EPSILON_S};
use crate::flip::{AllianceFlipper, Symmetry};
use crate::geometry::{ChassisSpeeds, Pose};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// The state of a swerve drivetrain at one instant.
///
/// Module forces are ordered front-left, back-left, back-right, front-right.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SwerveSample {
    #[serde(rename = "t")]
    pub timestamp_s: f64,

    #[serde(rename = "x")]
    pub x_m: f64,

    #[serde(rename = "y")]
    pub y_m: f64,

    #[serde(rename = "heading")]
    pub heading_rad: f64,

    #[serde(rename = "vx")]
    pub vx_ms: f64,

    #[serde(rename = "vy")]
    pub vy_ms: f64,

    #[serde(rename = "omega")]
    pub omega_rads: f64,

    #[serde(rename = "ax")]
    pub ax_mss: f64,

    #[serde(rename = "ay")]
    pub ay_mss: f64,

    #[serde(rename = "alpha")]
    pub alpha_radss: f64,

    /// Field-relative X force applied by each module
    #[serde(rename = "fx", default)]
    pub fx_n: [f64; 4],

    /// Field-relative Y force applied by each module
    #[serde(rename = "fy", default)]
    pub fy_n: [f64; 4],
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl TrajectorySample for SwerveSample {
    const KIND: SampleKind = SampleKind::Swerve;

    fn timestamp_s(&self) -> f64 {
        self.timestamp_s
    }

    fn pose(&self) -> Pose {
        Pose::new(self.x_m, self.y_m, self.heading_rad)
    }

    fn chassis_speeds(&self) -> ChassisSpeeds {
        ChassisSpeeds::new(self.vx_ms, self.vy_ms, self.omega_rads)
    }

    fn interpolate(&self, end: &Self, timestamp_s: f64) -> Self {
        if (end.timestamp_s - self.timestamp_s).abs() < COINCIDENT_EPSILON_S {
            return end.clone();
        }

        let scale = interpolation_scale(self.timestamp_s, end.timestamp_s, timestamp_s);
        let pose = self.pose().interpolate(&end.pose(), scale);

        let mut fx_n = [0.0; 4];
        let mut fy_n = [0.0; 4];
        for i in 0..4 {
            fx_n[i] = lerp(self.fx_n[i], end.fx_n[i], scale);
            fy_n[i] = lerp(self.fy_n[i], end.fy_n[i], scale);
        }

        Self {
            timestamp_s: lerp(self.timestamp_s, end.timestamp_s, scale),
            x_m: pose.x(),
            y_m: pose.y(),
            heading_rad: pose.heading_rad,
            vx_ms: lerp(self.vx_ms, end.vx_ms, scale),
            vy_ms: lerp(self.vy_ms, end.vy_ms, scale),
            omega_rads: lerp(self.omega_rads, end.omega_rads, scale),
            ax_mss: lerp(self.ax_mss, end.ax_mss, scale),
            ay_mss: lerp(self.ay_mss, end.ay_mss, scale),
            alpha_radss: lerp(self.alpha_radss, end.alpha_radss, scale),
            fx_n,
            fy_n,
        }
    }

    fn flipped(&self, flipper: &AllianceFlipper) -> Self {
        let fx = &self.fx_n;
        let fy = &self.fy_n;

        match flipper.symmetry {
            // Reflecting in X swaps the robot's left and right sides: FL <-> FR and BL <-> BR.
            Symmetry::Mirrored => Self {
                timestamp_s: self.timestamp_s,
                x_m: flipper.flip_x(self.x_m),
                y_m: flipper.flip_y(self.y_m),
                heading_rad: flipper.flip_heading(self.heading_rad),
                vx_ms: -self.vx_ms,
                vy_ms: self.vy_ms,
                omega_rads: -self.omega_rads,
                ax_mss: -self.ax_mss,
                ay_mss: self.ay_mss,
                alpha_radss: -self.alpha_radss,
                fx_n: [-fx[3], -fx[2], -fx[1], -fx[0]],
                fy_n: [fy[3], fy[2], fy[1], fy[0]],
            },
            // A rotation preserves handedness, so angular terms and module order are unchanged.
            Symmetry::RotateAround => Self {
                timestamp_s: self.timestamp_s,
                x_m: flipper.flip_x(self.x_m),
                y_m: flipper.flip_y(self.y_m),
                heading_rad: flipper.flip_heading(self.heading_rad),
                vx_ms: -self.vx_ms,
                vy_ms: -self.vy_ms,
                omega_rads: self.omega_rads,
                ax_mss: -self.ax_mss,
                ay_mss: -self.ay_mss,
                alpha_radss: self.alpha_radss,
                fx_n: [-fx[0], -fx[1], -fx[2], -fx[3]],
                fy_n: [-fy[0], -fy[1], -fy[2], -fy[3]],
            },
        }
    }

    fn offset_by(&self, offset_s: f64) -> Self {
        Self {
            timestamp_s: self.timestamp_s + offset_s,
            ..self.clone()
        }
    }
}
