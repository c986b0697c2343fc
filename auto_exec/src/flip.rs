//! # Alliance flipping
//!
//! Trajectories are stored for the blue alliance. When running on the red alliance every
//! field-relative quantity is transformed onto the other half of the field. Fields are either
//! mirrored across their centre line or rotated 180 degrees about their centre, depending on the
//! season, so the transform is carried as an explicit [`AllianceFlipper`] value chosen by
//! configuration.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::rc::Rc;
use util::maths::wrap_to_pi;

use crate::geometry::Pose;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Season used when no season is configured.
pub const DEFAULT_SEASON: u16 = 2025;

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// The alliance the robot is playing for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alliance {
    Red,
    Blue,
}

/// The symmetry relating the two halves of the field.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Symmetry {
    /// X is mirrored across the field's centre line, Y is unchanged.
    Mirrored,

    /// Both axes are rotated 180 degrees about the centre of the field.
    RotateAround,
}

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Transforms blue-alliance field quantities into their red-alliance equivalents.
///
/// Every transform is an involution, flipping twice gives back the original value.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllianceFlipper {
    pub symmetry: Symmetry,
    pub field_length_m: f64,
    pub field_width_m: f64,
}

/// Source of the current alliance, `None` while it is unknown.
pub type AllianceSupplier = Rc<dyn Fn() -> Option<Alliance>>;

/// Everything needed to decide whether, and how, to flip on a given tick.
#[derive(Clone)]
pub struct AllianceContext {
    use_alliance_flipping: bool,
    alliance: AllianceSupplier,
    flipper: AllianceFlipper,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl fmt::Display for Alliance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alliance::Red => write!(f, "red"),
            Alliance::Blue => write!(f, "blue"),
        }
    }
}

impl AllianceFlipper {
    pub fn mirrored(field_length_m: f64, field_width_m: f64) -> Self {
        Self {
            symmetry: Symmetry::Mirrored,
            field_length_m,
            field_width_m,
        }
    }

    pub fn rotate_around(field_length_m: f64, field_width_m: f64) -> Self {
        Self {
            symmetry: Symmetry::RotateAround,
            field_length_m,
            field_width_m,
        }
    }

    /// Get the flipper for the field used in the given season, or `None` if the season is not
    /// known.
    pub fn for_season(season: u16) -> Option<Self> {
        match season {
            2018 | 2019 | 2022 => Some(Self::rotate_around(16.4592, 8.2296)),
            2020 => Some(Self::rotate_around(15.98295, 8.21055)),
            2023 | 2024 => Some(Self::mirrored(16.542, 8.211)),
            2025 => Some(Self::rotate_around(17.548, 8.052)),
            _ => None,
        }
    }

    pub fn flip_x(&self, x_m: f64) -> f64 {
        self.field_length_m - x_m
    }

    pub fn flip_y(&self, y_m: f64) -> f64 {
        match self.symmetry {
            Symmetry::Mirrored => y_m,
            Symmetry::RotateAround => self.field_width_m - y_m,
        }
    }

    /// Flip a heading, the result is wrapped into (-pi, pi].
    pub fn flip_heading(&self, heading_rad: f64) -> f64 {
        match self.symmetry {
            Symmetry::Mirrored => wrap_to_pi(PI - heading_rad),
            Symmetry::RotateAround => wrap_to_pi(heading_rad + PI),
        }
    }

    pub fn flip_position(&self, position_m: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(self.flip_x(position_m[0]), self.flip_y(position_m[1]))
    }

    pub fn flip_pose(&self, pose: &Pose) -> Pose {
        Pose {
            position_m: self.flip_position(&pose.position_m),
            heading_rad: self.flip_heading(pose.heading_rad),
        }
    }
}

impl Default for AllianceFlipper {
    fn default() -> Self {
        Self::rotate_around(17.548, 8.052)
    }
}

impl AllianceContext {
    pub fn new(
        use_alliance_flipping: bool,
        alliance: AllianceSupplier,
        flipper: AllianceFlipper,
    ) -> Self {
        Self {
            use_alliance_flipping,
            alliance,
            flipper,
        }
    }

    /// A context which never flips.
    pub fn never_flip() -> Self {
        Self::new(false, Rc::new(|| None), AllianceFlipper::default())
    }

    pub fn use_alliance_flipping(&self) -> bool {
        self.use_alliance_flipping
    }

    pub fn flipper(&self) -> &AllianceFlipper {
        &self.flipper
    }

    pub fn alliance(&self) -> Option<Alliance> {
        (self.alliance)()
    }

    /// Whether data should be flipped right now.
    ///
    /// Returns `None` when flipping is enabled but the alliance is not yet known.
    pub fn should_flip(&self) -> Option<bool> {
        if !self.use_alliance_flipping {
            return Some(false);
        }

        self.alliance().map(|a| a == Alliance::Red)
    }

    /// True when flipping is disabled or the alliance is known.
    pub fn alliance_ready(&self) -> bool {
        self.should_flip().is_some()
    }

    /// The flipper to apply right now, if any.
    pub fn active_flipper(&self) -> Option<&AllianceFlipper> {
        match self.should_flip() {
            Some(true) => Some(&self.flipper),
            _ => None,
        }
    }

    /// Flip a blue-alliance pose for the current alliance, or `None` if the alliance is unknown.
    pub fn flip_pose(&self, pose: &Pose) -> Option<Pose> {
        self.should_flip().map(|flip| {
            if flip {
                self.flipper.flip_pose(pose)
            }
            else {
                *pose
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use std::cell::Cell;

    #[test]
    fn test_mirrored_pose() {
        let flipper = AllianceFlipper::mirrored(16.0, 8.0);
        let flipped = flipper.flip_pose(&Pose::new(1.0, 2.0, 0.3));

        assert_relative_eq!(flipped.x(), 15.0);
        assert_relative_eq!(flipped.y(), 2.0);
        assert_relative_eq!(flipped.heading_rad, PI - 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_rotated_pose() {
        let flipper = AllianceFlipper::rotate_around(16.0, 8.0);
        let flipped = flipper.flip_pose(&Pose::new(1.0, 2.0, 0.3));

        assert_relative_eq!(flipped.x(), 15.0);
        assert_relative_eq!(flipped.y(), 6.0);
        assert_relative_eq!(flipped.heading_rad, 0.3 - PI, epsilon = 1e-12);
    }

    #[test]
    fn test_pose_involution() {
        let poses = [
            Pose::new(0.0, 0.0, 0.0),
            Pose::new(3.2, 7.9, PI),
            Pose::new(12.5, 0.4, -2.9),
            Pose::new(8.0, 4.0, 1.0),
        ];

        for flipper in &[AllianceFlipper::mirrored(16.542, 8.211), AllianceFlipper::default()] {
            for pose in &poses {
                let twice = flipper.flip_pose(&flipper.flip_pose(pose));
                assert_relative_eq!(twice.x(), pose.x(), epsilon = 1e-12);
                assert_relative_eq!(twice.y(), pose.y(), epsilon = 1e-12);
                assert_relative_eq!(pose.heading_error_to(&twice), 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_season_presets() {
        assert_eq!(
            AllianceFlipper::for_season(2024).map(|f| f.symmetry),
            Some(Symmetry::Mirrored)
        );
        assert_eq!(AllianceFlipper::for_season(DEFAULT_SEASON), Some(AllianceFlipper::default()));
        assert_eq!(
            AllianceFlipper::for_season(2022).map(|f| f.symmetry),
            Some(Symmetry::RotateAround)
        );
        assert_eq!(AllianceFlipper::for_season(1999), None);
    }

    #[test]
    fn test_context() {
        let alliance = Rc::new(Cell::new(None));
        let supplier = alliance.clone();
        let ctx = AllianceContext::new(
            true,
            Rc::new(move || supplier.get()),
            AllianceFlipper::default(),
        );

        assert_eq!(ctx.should_flip(), None);
        assert!(!ctx.alliance_ready());
        assert_eq!(ctx.flip_pose(&Pose::default()), None);

        alliance.set(Some(Alliance::Blue));
        assert_eq!(ctx.should_flip(), Some(false));
        assert!(ctx.active_flipper().is_none());

        alliance.set(Some(Alliance::Red));
        assert_eq!(ctx.should_flip(), Some(true));
        assert!(ctx.active_flipper().is_some());

        let never = AllianceContext::never_flip();
        assert_eq!(never.should_flip(), Some(false));
        assert!(never.alliance_ready());
    }
}
