//! Trajectory following control parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for trajectory following control
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Params {
    /// Translation controller proportional gain, applied to both X and Y
    pub trans_k_p: f64,

    /// Translation controller integral gain
    pub trans_k_i: f64,

    /// Translation controller derivative gain
    pub trans_k_d: f64,

    /// Heading controller proportional gain
    pub head_k_p: f64,

    /// Heading controller integral gain
    pub head_k_i: f64,

    /// Heading controller derivative gain
    pub head_k_d: f64,

    /// Limit on the magnitude of the commanded translation speed
    pub max_speed_ms: f64,

    /// Limit on the magnitude of the commanded turn rate
    pub max_turn_rate_rads: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            trans_k_p: 10.0,
            trans_k_i: 0.0,
            trans_k_d: 0.0,
            head_k_p: 7.5,
            head_k_i: 0.0,
            head_k_d: 0.0,
            max_speed_ms: 4.5,
            max_turn_rate_rads: 4.0 * std::f64::consts::PI,
        }
    }
}
