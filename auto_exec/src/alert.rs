//! # Alerts
//!
//! Problems found while building or running a routine are never allowed to stop the control loop.
//! Instead they are logged and recorded in an [`Alerts`] list which the host can inspect (and
//! tests can assert on).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{error, warn};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

use crate::store::TrajectoryError;

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Severity of an alert.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AlertLevel {
    Warning,
    Error,
}

/// Recoverable problems reported through the alert channel.
#[derive(Debug, Error)]
pub enum AutoDiagnostic {
    #[error("Could not load trajectory \"{name}\": {source}")]
    LoadFailed {
        name: String,
        source: TrajectoryError,
    },

    #[error("Trajectory \"{name}\" has no split {index}")]
    SplitNotFound { name: String, index: usize },

    #[error("Event \"{event}\" not found in trajectory \"{trajectory}\"")]
    EventNotFound { event: String, trajectory: String },

    #[error("Trajectory \"{trajectory}\" has no samples, it will not be followed")]
    EmptySamples { trajectory: String },

    #[error(
        "Trigger time {time_s} s is outside of trajectory \"{trajectory}\" (0 to {total_s} s), \
         the trigger will never fire"
    )]
    InvalidTriggerTime {
        time_s: f64,
        trajectory: String,
        total_s: f64,
    },

    #[error("Alliance is unknown at the start of routine \"{routine}\", the routine was killed")]
    UnknownAllianceAtStart { routine: String },

    #[error("Alliance lost while following trajectory \"{trajectory}\", holding still")]
    AllianceLost { trajectory: String },

    #[error("Routine \"{routine}\" was killed")]
    RoutineKilled { routine: String },
}

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// A single recorded alert.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub level: AlertLevel,
    pub text: String,
}

/// Shared, append-only record of the alerts raised by a factory and everything it built.
#[derive(Debug, Clone, Default)]
pub struct Alerts {
    alerts: Rc<RefCell<Vec<Alert>>>,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl Alerts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log and record a warning.
    pub fn warn<D: fmt::Display>(&self, diagnostic: D) {
        let text = diagnostic.to_string();
        warn!("{}", text);
        self.push(AlertLevel::Warning, text);
    }

    /// Log and record an error.
    pub fn error<D: fmt::Display>(&self, diagnostic: D) {
        let text = diagnostic.to_string();
        error!("{}", text);
        self.push(AlertLevel::Error, text);
    }

    /// A copy of every alert raised so far, oldest first.
    pub fn all(&self) -> Vec<Alert> {
        self.alerts.borrow().clone()
    }

    pub fn count(&self, level: AlertLevel) -> usize {
        self.alerts.borrow().iter().filter(|a| a.level == level).count()
    }

    /// Whether any alert's text contains `pattern`.
    pub fn contains(&self, pattern: &str) -> bool {
        self.alerts.borrow().iter().any(|a| a.text.contains(pattern))
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.borrow().is_empty()
    }

    fn push(&self, level: AlertLevel, text: String) {
        self.alerts.borrow_mut().push(Alert { level, text });
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_alerts_are_shared() {
        let alerts = Alerts::new();
        let other = alerts.clone();

        other.warn(AutoDiagnostic::EventNotFound {
            event: "intake".into(),
            trajectory: "start".into(),
        });
        alerts.error(AutoDiagnostic::EmptySamples {
            trajectory: "missing".into(),
        });

        assert_eq!(alerts.count(AlertLevel::Warning), 1);
        assert_eq!(alerts.count(AlertLevel::Error), 1);
        assert!(alerts.contains("Event \"intake\" not found"));
        assert!(!alerts.contains("killed"));
        assert_eq!(other.all().len(), 2);
    }
}
