//! # Autonomous Parameters
//!
//! This module provides the parameters of the autonomous library (`auto.toml`) and of the
//! autonomous executable (`exec.toml`).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auto::trajectory::{DEFAULT_TOLERANCE_M, DEFAULT_TOLERANCE_RAD};
use crate::auto::PoseTolerance;
use crate::flip::{AllianceContext, AllianceFlipper, AllianceSupplier, Symmetry};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Parameters of the autonomous library.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoParams {
    /// If true trajectories are flipped when the robot is on the red alliance
    pub use_alliance_flipping: bool,

    /// If true the trajectory cache is emptied each time a routine is created, so edited
    /// trajectory files are re-read
    pub clear_cache_on_new_routine: bool,

    /// Directory holding trajectory files, relative to the software root
    pub trajectory_dir: String,

    /// Translation tolerance used by event pose triggers
    pub default_tol_m: f64,

    /// Heading tolerance used by event pose triggers
    pub default_tol_rad: f64,

    /// How the field is flipped for the red alliance
    pub flipper: FlipperParams,
}

/// Parameters of the autonomous executable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoExecParams {
    /// Period of the main cycle
    pub cycle_period_s: f64,

    /// Name of the routine run by the executable
    pub routine_name: String,

    /// Alliance used when none is given on the command line, one of "red", "blue" or "unknown"
    pub default_alliance: String,

    /// Trajectories followed one after the other
    pub trajectories: Vec<String>,

    /// Event markers which are logged as the robot passes them
    #[serde(default)]
    pub logged_events: Vec<String>,
}

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Field symmetry, either by game season or given explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlipperParams {
    Season {
        season: u16,
    },
    Custom {
        symmetry: Symmetry,
        field_length_m: f64,
        field_width_m: f64,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum FlipperParamsError {
    #[error("No field symmetry is known for the {0} season")]
    UnknownSeason(u16),

    #[error("Field dimensions must be positive, found {length_m} x {width_m} m")]
    InvalidDimensions { length_m: f64, width_m: f64 },
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl Default for AutoParams {
    fn default() -> Self {
        Self {
            use_alliance_flipping: true,
            clear_cache_on_new_routine: false,
            trajectory_dir: String::from("deploy/trajectories"),
            default_tol_m: DEFAULT_TOLERANCE_M,
            default_tol_rad: DEFAULT_TOLERANCE_RAD,
            flipper: FlipperParams::Season { season: 2025 },
        }
    }
}

impl AutoParams {
    /// Tolerances used by event pose triggers.
    pub fn tolerance(&self) -> PoseTolerance {
        PoseTolerance {
            translation_m: self.default_tol_m,
            heading_rad: self.default_tol_rad,
        }
    }

    /// Build the alliance context for these parameters and the given alliance supplier.
    pub fn alliance_context(
        &self,
        alliance: AllianceSupplier,
    ) -> Result<AllianceContext, FlipperParamsError> {
        Ok(AllianceContext::new(
            self.use_alliance_flipping,
            alliance,
            self.flipper.flipper()?,
        ))
    }
}

impl FlipperParams {
    pub fn flipper(&self) -> Result<AllianceFlipper, FlipperParamsError> {
        match *self {
            FlipperParams::Season { season } => {
                AllianceFlipper::for_season(season).ok_or(FlipperParamsError::UnknownSeason(season))
            }
            FlipperParams::Custom {
                symmetry,
                field_length_m,
                field_width_m,
            } => {
                if !(field_length_m > 0.0 && field_width_m > 0.0) {
                    return Err(FlipperParamsError::InvalidDimensions {
                        length_m: field_length_m,
                        width_m: field_width_m,
                    });
                }

                Ok(match symmetry {
                    Symmetry::Mirrored => AllianceFlipper::mirrored(field_length_m, field_width_m),
                    Symmetry::RotateAround => {
                        AllianceFlipper::rotate_around(field_length_m, field_width_m)
                    }
                })
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use std::rc::Rc;
    use util::params;

    #[test]
    fn test_auto_params() {
        let p: AutoParams = params::from_str(
            r#"
            use_alliance_flipping = false
            default_tol_m = 0.1

            [flipper]
            symmetry = "Mirrored"
            field_length_m = 16.542
            field_width_m = 8.211
            "#,
        )
        .unwrap();

        assert!(!p.use_alliance_flipping);
        assert!(!p.clear_cache_on_new_routine);
        assert_eq!(p.trajectory_dir, "deploy/trajectories");
        assert_relative_eq!(p.tolerance().translation_m, 0.1);
        assert_relative_eq!(p.tolerance().heading_rad, DEFAULT_TOLERANCE_RAD);

        let flipper = p.flipper.flipper().unwrap();
        assert_eq!(flipper, AllianceFlipper::mirrored(16.542, 8.211));

        let ctx = p.alliance_context(Rc::new(|| None)).unwrap();
        assert_eq!(ctx.should_flip(), Some(false));
    }

    #[test]
    fn test_flipper_params() {
        let season: AutoParams = params::from_str("[flipper]\nseason = 2022").unwrap();
        assert_eq!(season.flipper, FlipperParams::Season { season: 2022 });
        assert_eq!(
            season.flipper.flipper().unwrap(),
            AllianceFlipper::for_season(2022).unwrap()
        );

        assert_eq!(
            FlipperParams::Season { season: 1999 }.flipper(),
            Err(FlipperParamsError::UnknownSeason(1999))
        );

        let bad = FlipperParams::Custom {
            symmetry: Symmetry::RotateAround,
            field_length_m: 0.0,
            field_width_m: 8.0,
        };
        assert!(matches!(
            bad.flipper(),
            Err(FlipperParamsError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_exec_params() {
        let p: AutoExecParams = params::from_str(
            r#"
            cycle_period_s = 0.02
            routine_name = "two piece"
            default_alliance = "blue"
            trajectories = ["first", "second"]
            "#,
        )
        .unwrap();

        assert_eq!(p.trajectories, vec!["first", "second"]);
        assert!(p.logged_events.is_empty());
    }
}
