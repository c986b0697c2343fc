//! # Simulated drivetrain
//!
//! `SimDrive` stands in for a real drivetrain and its odometry. Each cycle it moves its velocity
//! towards the demanded chassis speeds, within the drivetrain's acceleration and speed limits, and
//! integrates the velocity into a field-relative pose.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, trace};
use nalgebra::Vector2;
use serde::Serialize;
use thiserror::Error;

use crate::geometry::{ChassisSpeeds, Pose};
use util::{maths::wrap_to_pi, module::State};

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;

pub use params::Params;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Simulated drivetrain module state
#[derive(Debug, Default)]
pub struct SimDrive {
    params: Params,

    /// Current field-relative pose
    pose: Pose,

    /// Current field-relative velocity
    speeds: ChassisSpeeds,
}

/// Input data to SimDrive.
#[derive(Debug, Copy, Clone, Default)]
pub struct InputData {
    /// The demanded field-relative velocity
    pub demand: ChassisSpeeds,

    /// Time since the previous cycle
    pub dt_s: f64,
}

/// Output from SimDrive, the simulated odometry.
#[derive(Debug, Copy, Clone, Default, Serialize)]
pub struct OutputData {
    pub pose: Pose,
    pub speeds: ChassisSpeeds,
}

/// Status report for SimDrive processing.
#[derive(Debug, Copy, Clone, Default, Serialize)]
pub struct StatusReport {
    /// If true the translational acceleration was limited this cycle
    pub accel_limited: bool,

    /// If true the angular acceleration was limited this cycle
    pub ang_accel_limited: bool,

    /// If true the translation speed was limited this cycle
    pub speed_limited: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum SimDriveError {
    #[error("Invalid parameter {0}, limits must be positive")]
    InvalidParam(&'static str),

    #[error("Invalid time step of {0} s")]
    InvalidTimeStep(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for SimDrive {
    type InitData = Params;
    type InitError = SimDriveError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = SimDriveError;

    /// Initialise the SimDrive module.
    fn init(&mut self, init_data: Self::InitData) -> Result<(), Self::InitError> {
        if !(init_data.max_accel_mss > 0.0) {
            return Err(SimDriveError::InvalidParam("max_accel_mss"));
        }
        if !(init_data.max_ang_accel_radss > 0.0) {
            return Err(SimDriveError::InvalidParam("max_ang_accel_radss"));
        }
        if !(init_data.max_speed_ms > 0.0) {
            return Err(SimDriveError::InvalidParam("max_speed_ms"));
        }

        let [x_m, y_m, heading_rad] = init_data.initial_pose;
        self.pose = Pose::new(x_m, y_m, heading_rad);
        self.speeds = ChassisSpeeds::zero();
        self.params = init_data;

        debug!("SimDrive initialised at {:?}", self.pose);

        Ok(())
    }

    /// Step the drivetrain by one cycle.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let dt_s = input_data.dt_s;
        if !(dt_s > 0.0) || !dt_s.is_finite() {
            return Err(SimDriveError::InvalidTimeStep(dt_s));
        }

        let mut report = StatusReport::default();

        // ---- TRANSLATION ----

        let current = Vector2::new(self.speeds.vx_ms, self.speeds.vy_ms);
        let mut demand = Vector2::new(input_data.demand.vx_ms, input_data.demand.vy_ms);

        if demand.norm() > self.params.max_speed_ms {
            demand *= self.params.max_speed_ms / demand.norm();
            report.speed_limited = true;
        }

        let max_dv = self.params.max_accel_mss * dt_s;
        let mut dv = demand - current;
        if dv.norm() > max_dv {
            dv *= max_dv / dv.norm();
            report.accel_limited = true;
        }
        let velocity = current + dv;

        // ---- ROTATION ----

        let max_dw = self.params.max_ang_accel_radss * dt_s;
        let dw = input_data.demand.omega_rads - self.speeds.omega_rads;
        let omega_rads = if dw.abs() > max_dw {
            report.ang_accel_limited = true;
            self.speeds.omega_rads + max_dw.copysign(dw)
        }
        else {
            input_data.demand.omega_rads
        };

        // ---- INTEGRATION ----

        // Trapezoidal integration of the velocity over the step
        self.pose.position_m += (current + velocity) * 0.5 * dt_s;
        self.pose.heading_rad = wrap_to_pi(
            self.pose.heading_rad + (self.speeds.omega_rads + omega_rads) * 0.5 * dt_s,
        );
        self.speeds = ChassisSpeeds::new(velocity[0], velocity[1], omega_rads);

        trace!("SimDrive pose: {:?}, speeds: {:?}", self.pose, self.speeds);

        Ok((
            OutputData {
                pose: self.pose,
                speeds: self.speeds,
            },
            report,
        ))
    }
}

impl SimDrive {
    /// Move the drivetrain to `pose`, as an odometry reset does.
    pub fn reset(&mut self, pose: &Pose) {
        debug!("SimDrive reset to {:?}", pose);
        self.pose = *pose;
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn speeds(&self) -> ChassisSpeeds {
        self.speeds
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    fn sim(params: Params) -> SimDrive {
        let mut s = SimDrive::default();
        s.init(params).unwrap();
        s
    }

    fn step(s: &mut SimDrive, demand: ChassisSpeeds, dt_s: f64) -> (OutputData, StatusReport) {
        s.proc(&InputData { demand, dt_s }).unwrap()
    }

    #[test]
    fn test_init() {
        let s = sim(Params {
            initial_pose: [1.0, 2.0, 0.5],
            ..Params::default()
        });
        assert_eq!(s.pose(), Pose::new(1.0, 2.0, 0.5));

        let mut s = SimDrive::default();
        assert_eq!(
            s.init(Params {
                max_accel_mss: 0.0,
                ..Params::default()
            }),
            Err(SimDriveError::InvalidParam("max_accel_mss"))
        );
    }

    #[test]
    fn test_accel_limit() {
        let mut s = sim(Params {
            max_accel_mss: 1.0,
            ..Params::default()
        });

        let (out, report) = step(&mut s, ChassisSpeeds::new(2.0, 0.0, 0.0), 0.5);
        assert!(report.accel_limited);
        assert_relative_eq!(out.speeds.vx_ms, 0.5);
        assert_relative_eq!(out.pose.x(), 0.125);

        // Steady state once the demand is reachable
        for _ in 0..10 {
            step(&mut s, ChassisSpeeds::new(2.0, 0.0, 0.0), 0.5);
        }
        let (out, report) = step(&mut s, ChassisSpeeds::new(2.0, 0.0, 0.0), 0.5);
        assert!(!report.accel_limited);
        assert_relative_eq!(out.speeds.vx_ms, 2.0);
    }

    #[test]
    fn test_speed_and_turn_limits() {
        let mut s = sim(Params {
            max_accel_mss: 100.0,
            max_ang_accel_radss: 1.0,
            max_speed_ms: 1.0,
            initial_pose: [0.0; 3],
        });

        let (out, report) = step(&mut s, ChassisSpeeds::new(3.0, 4.0, 2.0), 0.1);
        assert!(report.speed_limited);
        assert!(report.ang_accel_limited);
        assert_relative_eq!(out.speeds.speed_ms(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(out.speeds.omega_rads, 0.1, epsilon = 1e-9);
    }

    #[test]
    fn test_heading_wraps() {
        let mut s = sim(Params {
            max_ang_accel_radss: 100.0,
            initial_pose: [0.0, 0.0, 3.1],
            ..Params::default()
        });

        step(&mut s, ChassisSpeeds::new(0.0, 0.0, 1.0), 0.1);
        let (out, _) = step(&mut s, ChassisSpeeds::new(0.0, 0.0, 1.0), 0.1);
        assert!(out.pose.heading_rad < 0.0);
    }

    #[test]
    fn test_invalid_time_step() {
        let mut s = sim(Params::default());
        assert_eq!(
            s.proc(&InputData {
                demand: ChassisSpeeds::zero(),
                dt_s: 0.0,
            })
            .unwrap_err(),
            SimDriveError::InvalidTimeStep(0.0)
        );
    }
}
