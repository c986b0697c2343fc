//! # Follow control module
//!
//! Follow control computes the field-relative velocity command which keeps the robot on a
//! trajectory. The sample's own velocity is used as a feedforward term, and PID controllers
//! correct the position and heading errors between the robot and the sample.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;
use serde::Serialize;
use std::rc::Rc;

use crate::clock::Clock;
use crate::geometry::{ChassisSpeeds, Pose};
use crate::sample::TrajectorySample;

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;

pub use params::Params;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A PID controller
#[derive(Debug, Serialize, Clone)]
pub struct PidController {
    /// Previous time that the error was passed in
    #[serde(skip)]
    prev_time_s: Option<f64>,

    /// Proportional gain
    k_p: f64,

    /// Integral gain
    k_i: f64,

    /// Dervative gain
    k_d: f64,

    /// Previous error
    prev_error: Option<f64>,

    /// The integral accumulation
    integral: f64,
}

/// Feedforward plus PID controller for holonomic trajectory following
pub struct FollowCtrl {
    params: Params,
    clock: Rc<dyn Clock>,

    x_ctrl: PidController,
    y_ctrl: PidController,
    head_ctrl: PidController,

    report: StatusReport,
}

/// Errors between the robot and the reference sample on the last cycle
#[derive(Debug, Default, Copy, Clone, Serialize)]
pub struct StatusReport {
    pub x_error_m: f64,
    pub y_error_m: f64,
    pub head_error_rad: f64,

    /// If true the commanded translation speed was limited
    pub speed_limited: bool,

    /// If true the commanded turn rate was limited
    pub turn_rate_limited: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidController {
    /// Create a new controller with the given gains.
    pub fn new(k_p: f64, k_i: f64, k_d: f64) -> Self {
        Self {
            k_p,
            k_i,
            k_d,
            integral: 0f64,
            prev_time_s: None,
            prev_error: None,
        }
    }

    /// Get the value of the controller for the given error at time `now_s`.
    pub fn get(&mut self, error: f64, now_s: f64) -> f64 {
        let dt = match self.prev_time_s {
            Some(t0) if now_s > t0 => Some(now_s - t0),
            _ => None,
        };

        // Without a time step neither the integral nor the derivative can be estimated, so both
        // are left out rather than producing a spike
        if let Some(t) = dt {
            self.integral += error * t;
        }

        let deriv = match (self.prev_error, dt) {
            (Some(e), Some(t)) => (error - e) / t,
            _ => 0f64,
        };

        let out = self.k_p * error + self.k_i * self.integral + self.k_d * deriv;

        self.prev_error = Some(error);
        self.prev_time_s = Some(now_s);

        out
    }

    /// Forget the integral and previous error.
    pub fn reset(&mut self) {
        self.integral = 0f64;
        self.prev_error = None;
        self.prev_time_s = None;
    }
}

impl FollowCtrl {
    pub fn new(params: Params, clock: Rc<dyn Clock>) -> Self {
        Self {
            x_ctrl: PidController::new(params.trans_k_p, params.trans_k_i, params.trans_k_d),
            y_ctrl: PidController::new(params.trans_k_p, params.trans_k_i, params.trans_k_d),
            head_ctrl: PidController::new(params.head_k_p, params.head_k_i, params.head_k_d),
            params,
            clock,
            report: StatusReport::default(),
        }
    }

    /// Compute the velocity command which moves the robot from `pose` onto `sample`.
    pub fn calculate<S: TrajectorySample>(&mut self, pose: &Pose, sample: &S) -> ChassisSpeeds {
        let now_s = self.clock.now_s();
        let reference = sample.pose();
        let feedforward = sample.chassis_speeds();

        self.report = StatusReport {
            x_error_m: reference.x() - pose.x(),
            y_error_m: reference.y() - pose.y(),
            head_error_rad: pose.heading_error_to(&reference),
            ..Default::default()
        };

        let mut speeds = ChassisSpeeds::new(
            feedforward.vx_ms + self.x_ctrl.get(self.report.x_error_m, now_s),
            feedforward.vy_ms + self.y_ctrl.get(self.report.y_error_m, now_s),
            feedforward.omega_rads + self.head_ctrl.get(self.report.head_error_rad, now_s),
        );

        let speed_ms = speeds.speed_ms();
        if speed_ms > self.params.max_speed_ms {
            let scale = self.params.max_speed_ms / speed_ms;
            speeds.vx_ms *= scale;
            speeds.vy_ms *= scale;
            self.report.speed_limited = true;
        }

        if speeds.omega_rads.abs() > self.params.max_turn_rate_rads {
            speeds.omega_rads = self.params.max_turn_rate_rads.copysign(speeds.omega_rads);
            self.report.turn_rate_limited = true;
        }

        trace!("FollowCtrl errors: {:?}, demand: {:?}", self.report, speeds);

        speeds
    }

    /// Reset the controllers, for example at the start of a new trajectory.
    pub fn reset(&mut self) {
        self.x_ctrl.reset();
        self.y_ctrl.reset();
        self.head_ctrl.reset();
        self.report = StatusReport::default();
    }

    pub fn report(&self) -> &StatusReport {
        &self.report
    }
}
