//! Differential drivetrain samples

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

/// The state of a differential (tank) drivetrain at one instant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DifferentialSample {
    #[serde(rename = "t")]
    pub timestamp_s: f64,

    #[serde(rename = "x")]
    pub x_m: f64,

    #[serde(rename = "y")]
    pub y_m: f64,

    #[serde(rename = "heading")]
    pub heading_rad: f64,

    /// Left wheel velocity
    #[serde(rename = "vl")]
    pub vl_ms: f64,

    /// Right wheel velocity
    #[serde(rename = "vr")]
    pub vr_ms: f64,

    #[serde(rename = "omega")]
    pub omega_rads: f64,

    #[serde(rename = "al")]
    pub al_mss: f64,

    #[serde(rename = "ar")]
    pub ar_mss: f64,

    /// Left wheel force
    #[serde(rename = "fl", default)]
    pub fl_n: f64,

    /// Right wheel force
    #[serde(rename = "fr", default)]
    pub fr_n: f64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl TrajectorySample for DifferentialSample {
    const KIND: SampleKind = SampleKind::Differential;

    fn timestamp_s(&self) -> f64 {
        self.timestamp_s
    }

    fn pose(&self) -> Pose {
        Pose::new(self.x_m, self.y_m, self.heading_rad)
    }

    /// A differential drivetrain cannot move sideways, so the forward speed is the mean of the
    /// wheel speeds and the lateral speed is zero.
    fn chassis_speeds(&self) -> ChassisSpeeds {
        ChassisSpeeds::new((self.vl_ms + self.vr_ms) / 2.0, 0.0, self.omega_rads)
    }

    fn interpolate(&self, end: &Self, timestamp_s: f64) -> Self {
        if (end.timestamp_s - self.timestamp_s).abs() < COINCIDENT_EPSILON_S {
            return end.clone();
        }

        let scale = interpolation_scale(self.timestamp_s, end.timestamp_s, timestamp_s);
        let pose = self.pose().interpolate(&end.pose(), scale);

        Self {
            timestamp_s: lerp(self.timestamp_s, end.timestamp_s, scale),
            x_m: pose.x(),
            y_m: pose.y(),
            heading_rad: pose.heading_rad,
            vl_ms: lerp(self.vl_ms, end.vl_ms, scale),
            vr_ms: lerp(self.vr_ms, end.vr_ms, scale),
            omega_rads: lerp(self.omega_rads, end.omega_rads, scale),
            al_mss: lerp(self.al_mss, end.al_mss, scale),
            ar_mss: lerp(self.ar_mss, end.ar_mss, scale),
            fl_n: lerp(self.fl_n, end.fl_n, scale),
            fr_n: lerp(self.fr_n, end.fr_n, scale),
        }
    }

    fn flipped(&self, flipper: &AllianceFlipper) -> Self {
        match flipper.symmetry {
            // Mirroring swaps the left and right sides of the robot and reverses its rotation.
            Symmetry::Mirrored => Self {
                timestamp_s: self.timestamp_s,
                x_m: flipper.flip_x(self.x_m),
                y_m: flipper.flip_y(self.y_m),
                heading_rad: flipper.flip_heading(self.heading_rad),
                vl_ms: self.vr_ms,
                vr_ms: self.vl_ms,
                omega_rads: -self.omega_rads,
                al_mss: self.ar_mss,
                ar_mss: self.al_mss,
                fl_n: self.fr_n,
                fr_n: self.fl_n,
            },
            Symmetry::RotateAround => Self {
                timestamp_s: self.timestamp_s,
                x_m: flipper.flip_x(self.x_m),
                y_m: flipper.flip_y(self.y_m),
                heading_rad: flipper.flip_heading(self.heading_rad),
                ..self.clone()
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

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use util::maths::get_ang_dist;

    fn sample() -> DifferentialSample {
        DifferentialSample {
            timestamp_s: 0.4,
            x_m: 1.5,
            y_m: 6.0,
            heading_rad: -2.5,
            vl_ms: 1.0,
            vr_ms: 2.0,
            omega_rads: 0.8,
            al_mss: 0.1,
            ar_mss: 0.2,
            fl_n: 10.0,
            fr_n: 20.0,
        }
    }

    #[test]
    fn test_chassis_speeds() {
        assert_eq!(sample().chassis_speeds(), ChassisSpeeds::new(1.5, 0.0, 0.8));
    }

    #[test]
    fn test_mirrored() {
        let f = sample().flipped(&AllianceFlipper::mirrored(16.0, 8.0));

        assert_relative_eq!(f.x_m, 14.5);
        assert_relative_eq!(f.y_m, 6.0);
        assert_eq!((f.vl_ms, f.vr_ms, f.omega_rads), (2.0, 1.0, -0.8));
        assert_eq!((f.al_mss, f.ar_mss, f.fl_n, f.fr_n), (0.2, 0.1, 20.0, 10.0));
    }

    #[test]
    fn test_rotated() {
        let f = sample().flipped(&AllianceFlipper::rotate_around(16.0, 8.0));

        assert_relative_eq!(f.x_m, 14.5);
        assert_relative_eq!(f.y_m, 2.0);
        assert_relative_eq!(f.heading_rad, -2.5 + std::f64::consts::PI, epsilon = 1e-12);
        assert_eq!((f.vl_ms, f.vr_ms, f.omega_rads), (1.0, 2.0, 0.8));
    }

    #[test]
    fn test_flip_involution() {
        for flipper in &[
            AllianceFlipper::mirrored(16.542, 8.211),
            AllianceFlipper::rotate_around(17.548, 8.052),
        ] {
            let s = sample();
            let twice = s.flipped(flipper).flipped(flipper);

            assert_relative_eq!(twice.x_m, s.x_m, epsilon = 1e-12);
            assert_relative_eq!(twice.y_m, s.y_m, epsilon = 1e-12);
            assert_relative_eq!(get_ang_dist(twice.heading_rad, s.heading_rad), 0.0, epsilon = 1e-12);
            assert_eq!(
                (twice.vl_ms, twice.vr_ms, twice.omega_rads, twice.fl_n, twice.fr_n),
                (s.vl_ms, s.vr_ms, s.omega_rads, s.fl_n, s.fr_n)
            );
        }
    }

    #[test]
    fn test_interpolate() {
        let end = DifferentialSample {
            timestamp_s: 1.4,
            vl_ms: 3.0,
            ..sample()
        };

        let mid = sample().interpolate(&end, 0.9);
        assert_relative_eq!(mid.vl_ms, 2.0, epsilon = 1e-12);
        assert_relative_eq!(mid.vr_ms, 2.0);
        assert_relative_eq!(mid.heading_rad, -2.5);

        // Coincident samples return the later one rather than dividing by zero
        let coincident = DifferentialSample {
            timestamp_s: 0.4 + 1e-9,
            ..end.clone()
        };
        assert_eq!(sample().interpolate(&coincident, 0.4), coincident);
    }
}
