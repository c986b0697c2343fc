//! # Trajectory
//!
//! An immutable, time-ordered sequence of samples plus the named event markers placed along it.
//! A trajectory may also be divided into splits, each of which can be followed on its own.
//!
//! Sampling never extrapolates. Times before the first sample give the first sample and times at
//! or after the end give the last sample, anything in between is interpolated from the two
//! samples bracketing the requested time.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::flip::AllianceFlipper;
use crate::geometry::Pose;
use crate::sample::{TrajectorySample, COINCIDENT_EPSILON_S};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// A named point in time along a trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMarker {
    #[serde(rename = "timestamp")]
    pub timestamp_s: f64,

    pub event: String,
}

/// A loaded trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory<S> {
    name: String,
    samples: Vec<S>,
    splits: Vec<usize>,
    events: Vec<EventMarker>,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl EventMarker {
    pub fn new<T: Into<String>>(timestamp_s: f64, event: T) -> Self {
        Self {
            timestamp_s,
            event: event.into(),
        }
    }

    /// Markers must have a name and must not be placed before the start of the trajectory.
    pub fn is_valid(&self) -> bool {
        self.timestamp_s >= 0.0 && !self.event.is_empty()
    }

    pub fn offset_by(&self, offset_s: f64) -> Self {
        Self {
            timestamp_s: self.timestamp_s + offset_s,
            event: self.event.clone(),
        }
    }
}

impl<S: TrajectorySample> Trajectory<S> {
    /// Build a trajectory.
    ///
    /// Split index 0 is added if missing and invalid event markers are dropped. The samples must
    /// already be in time order.
    pub fn new<T: Into<String>>(
        name: T,
        samples: Vec<S>,
        mut splits: Vec<usize>,
        mut events: Vec<EventMarker>,
    ) -> Self {
        splits.push(0);
        splits.sort_unstable();
        splits.dedup();

        events.retain(EventMarker::is_valid);

        Self {
            name: name.into(),
            samples,
            splits,
            events,
        }
    }

    /// A trajectory with no samples, used in place of one which could not be loaded.
    pub fn empty<T: Into<String>>(name: T) -> Self {
        Self::new(name, Vec::new(), Vec::new(), Vec::new())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn samples(&self) -> &[S] {
        &self.samples
    }

    /// Sample indices at which each split starts, always beginning with 0.
    pub fn splits(&self) -> &[usize] {
        &self.splits
    }

    pub fn events(&self) -> &[EventMarker] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Timestamp of the last sample, or 0 for an empty trajectory.
    pub fn total_time_s(&self) -> f64 {
        self.samples.last().map_or(0.0, |s| s.timestamp_s())
    }

    /// Sample the trajectory at `time_s`, flipping the result if a flipper is given.
    ///
    /// Returns `None` only for an empty trajectory.
    pub fn sample_at(&self, time_s: f64, flipper: Option<&AllianceFlipper>) -> Option<S> {
        let sample = self.sample_unflipped(time_s)?;

        Some(match flipper {
            Some(f) => sample.flipped(f),
            None => sample,
        })
    }

    pub fn initial_sample(&self, flipper: Option<&AllianceFlipper>) -> Option<S> {
        self.samples.first().map(|s| maybe_flip(s, flipper))
    }

    pub fn final_sample(&self, flipper: Option<&AllianceFlipper>) -> Option<S> {
        self.samples.last().map(|s| maybe_flip(s, flipper))
    }

    pub fn initial_pose(&self, flipper: Option<&AllianceFlipper>) -> Option<Pose> {
        self.initial_sample(flipper).map(|s| s.pose())
    }

    pub fn final_pose(&self, flipper: Option<&AllianceFlipper>) -> Option<Pose> {
        self.final_sample(flipper).map(|s| s.pose())
    }

    /// The pose of every sample, in order.
    pub fn poses(&self) -> Vec<Pose> {
        self.samples.iter().map(|s| s.pose()).collect()
    }

    /// A copy of this trajectory as seen from the other alliance.
    pub fn flipped(&self, flipper: &AllianceFlipper) -> Self {
        Self {
            name: self.name.clone(),
            samples: self.samples.iter().map(|s| s.flipped(flipper)).collect(),
            splits: self.splits.clone(),
            events: self.events.clone(),
        }
    }

    /// All event markers with the given name, in time order.
    pub fn events_named(&self, event: &str) -> Vec<&EventMarker> {
        let mut events: Vec<&EventMarker> =
            self.events.iter().filter(|e| e.event == event).collect();
        events.sort_by(|a, b| a.timestamp_s.total_cmp(&b.timestamp_s));
        events
    }

    pub fn num_splits(&self) -> usize {
        self.splits.len()
    }

    /// Get split `index` as a trajectory of its own, re-based to start at time 0.
    ///
    /// The split runs from its starting sample up to and including the first sample of the next
    /// split. Event markers within the split's time span are kept. Returns `None` if there is no
    /// such split.
    pub fn get_split(&self, index: usize) -> Option<Self> {
        let start = *self.splits.get(index)?;
        let end = match self.splits.get(index + 1) {
            Some(next) => next + 1,
            None => self.samples.len(),
        };

        let samples = self.samples.get(start..end.min(self.samples.len()))?;
        let start_s = samples.first()?.timestamp_s();
        let end_s = samples.last()?.timestamp_s();

        Some(Self {
            name: format!("{}[{}]", self.name, index),
            samples: samples.iter().map(|s| s.offset_by(-start_s)).collect(),
            splits: vec![0],
            events: self
                .events
                .iter()
                .filter(|e| e.timestamp_s >= start_s && e.timestamp_s <= end_s)
                .map(|e| e.offset_by(-start_s))
                .collect(),
        })
    }

    fn sample_unflipped(&self, time_s: f64) -> Option<S> {
        let first = self.samples.first()?;
        let last = self.samples.last()?;

        if time_s < first.timestamp_s() {
            return Some(first.clone());
        }
        if time_s >= self.total_time_s() {
            return Some(last.clone());
        }

        // Index of the first sample strictly after the requested time
        let ahead = self.samples.partition_point(|s| s.timestamp_s() <= time_s);
        if ahead == 0 {
            return Some(first.clone());
        }
        if ahead >= self.samples.len() {
            return Some(last.clone());
        }

        let behind = &self.samples[ahead - 1];
        let ahead = &self.samples[ahead];

        if ahead.timestamp_s() - behind.timestamp_s() < COINCIDENT_EPSILON_S {
            return Some(ahead.clone());
        }

        Some(behind.interpolate(ahead, time_s))
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn maybe_flip<S: TrajectorySample>(sample: &S, flipper: Option<&AllianceFlipper>) -> S {
    match flipper {
        Some(f) => sample.flipped(f),
        None => sample.clone(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sample::SwerveSample;
    use approx::assert_relative_eq;

    fn swerve(t: f64, x: f64, y: f64, heading: f64, v: f64, omega: f64) -> SwerveSample {
        SwerveSample {
            timestamp_s: t,
            x_m: x,
            y_m: y,
            heading_rad: heading,
            vx_ms: v,
            vy_ms: v,
            omega_rads: omega,
            ..Default::default()
        }
    }

    fn two_sample() -> Trajectory<SwerveSample> {
        Trajectory::new(
            "two",
            vec![
                swerve(0.0, 0.0, 0.0, 0.0, 0.0, 0.0),
                swerve(1.0, 0.5, 0.1, 0.2, 3.0, 10.0),
            ],
            vec![],
            vec![],
        )
    }

    fn long() -> Trajectory<SwerveSample> {
        Trajectory::new(
            "long",
            vec![
                swerve(0.0, 0.0, 0.0, 0.0, 0.0, 0.0),
                swerve(0.5, 1.0, 0.5, 0.3, 1.0, 0.5),
                swerve(1.0, 2.0, 1.5, 0.1, 2.0, -0.5),
                swerve(1.7, 3.5, 1.0, -0.4, 1.0, -1.0),
                swerve(2.0, 4.0, 0.0, -0.5, 0.0, 0.0),
            ],
            vec![2],
            vec![
                EventMarker::new(0.25, "intake"),
                EventMarker::new(1.8, "shoot"),
                EventMarker::new(0.75, "intake"),
                EventMarker::new(-1.0, "bad"),
                EventMarker::new(1.0, ""),
            ],
        )
    }

    #[test]
    fn test_midpoint_interpolation() {
        let traj = two_sample();
        let mid = traj.sample_at(0.5, None).unwrap();

        assert_relative_eq!(mid.x_m, 0.25);
        assert_relative_eq!(mid.y_m, 0.05);
        assert_relative_eq!(mid.heading_rad, 0.1);
        assert_relative_eq!(mid.vx_ms, 1.5);
        assert_relative_eq!(mid.vy_ms, 1.5);
        assert_relative_eq!(mid.omega_rads, 5.0);
    }

    #[test]
    fn test_clamp() {
        let traj = two_sample();

        assert_eq!(traj.sample_at(-1.0, None), Some(traj.samples()[0].clone()));
        assert_eq!(traj.sample_at(5.0, None), Some(traj.samples()[1].clone()));
        assert_eq!(traj.sample_at(1.0, None), Some(traj.samples()[1].clone()));
        assert_eq!(traj.total_time_s(), 1.0);
    }

    #[test]
    fn test_exact_round_trip() {
        let traj = long();

        for s in traj.samples() {
            assert_eq!(traj.sample_at(s.timestamp_s, None).as_ref(), Some(s));
        }
    }

    #[test]
    fn test_interpolation_bounded() {
        let traj = long();

        for pair in traj.samples().windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            for k in 1..10 {
                let t = a.timestamp_s + (b.timestamp_s - a.timestamp_s) * k as f64 / 10.0;
                let s = traj.sample_at(t, None).unwrap();

                let fields = [
                    (s.x_m, a.x_m, b.x_m),
                    (s.y_m, a.y_m, b.y_m),
                    (s.heading_rad, a.heading_rad, b.heading_rad),
                    (s.vx_ms, a.vx_ms, b.vx_ms),
                    (s.omega_rads, a.omega_rads, b.omega_rads),
                ];
                for &(v, fa, fb) in fields.iter() {
                    assert!(v >= fa.min(fb) - 1e-12 && v <= fa.max(fb) + 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_single_and_empty() {
        let single = Trajectory::new("one", vec![swerve(0.3, 1.0, 2.0, 0.5, 1.0, 0.0)], vec![], vec![]);
        for &t in [-1.0, 0.0, 0.3, 0.31, 100.0].iter() {
            assert_eq!(single.sample_at(t, None).as_ref(), Some(&single.samples()[0]));
        }

        let empty = Trajectory::<SwerveSample>::empty("none");
        assert_eq!(empty.total_time_s(), 0.0);
        assert_eq!(empty.sample_at(0.0, None), None);
        assert_eq!(empty.initial_pose(None), None);
        assert_eq!(empty.get_split(0), None);
    }

    #[test]
    fn test_duplicate_timestamps() {
        let traj = Trajectory::new(
            "dup",
            vec![
                swerve(0.0, 0.0, 0.0, 0.0, 0.0, 0.0),
                swerve(0.5, 1.0, 0.0, 0.0, 1.0, 0.0),
                swerve(0.5, 2.0, 0.0, 0.0, 2.0, 0.0),
                swerve(1.0, 3.0, 0.0, 0.0, 3.0, 0.0),
            ],
            vec![],
            vec![],
        );

        let s = traj.sample_at(0.5, None).unwrap();
        assert!(s.x_m.is_finite());
        assert_relative_eq!(traj.sample_at(0.75, None).unwrap().x_m, 2.5);
    }

    #[test]
    fn test_flip_on_sample() {
        let traj = two_sample();
        let flipper = AllianceFlipper::rotate_around(16.0, 8.0);

        let flipped = traj.sample_at(0.0, Some(&flipper)).unwrap();
        assert_relative_eq!(flipped.x_m, 16.0);
        assert_relative_eq!(flipped.y_m, 8.0);

        // Stored data is untouched
        assert_eq!(traj.samples()[0].x_m, 0.0);
        assert_eq!(traj.final_pose(Some(&flipper)).map(|p| p.x()), Some(15.5));
        assert_eq!(traj.flipped(&flipper).samples()[1].x_m, 15.5);
    }

    #[test]
    fn test_events() {
        let traj = long();

        assert_eq!(traj.events().len(), 3);
        let intakes: Vec<f64> = traj.events_named("intake").iter().map(|e| e.timestamp_s).collect();
        assert_eq!(intakes, vec![0.25, 0.75]);
        assert!(traj.events_named("bad").is_empty());
    }

    #[test]
    fn test_splits() {
        let traj = long();
        assert_eq!(traj.splits(), &[0, 2]);
        assert_eq!(traj.num_splits(), 2);

        let first = traj.get_split(0).unwrap();
        assert_eq!(first.name(), "long[0]");
        assert_eq!(first.len(), 3);
        assert_relative_eq!(first.total_time_s(), 1.0);
        assert_eq!(first.events().len(), 2);

        let second = traj.get_split(1).unwrap();
        assert_eq!(second.name(), "long[1]");
        assert_eq!(second.len(), 3);
        assert_relative_eq!(second.samples()[0].timestamp_s, 0.0);
        assert_relative_eq!(second.total_time_s(), 1.0);
        assert_eq!(second.events().len(), 1);
        assert_relative_eq!(second.events()[0].timestamp_s, 0.8, epsilon = 1e-12);
        assert_eq!(second.splits(), &[0]);

        assert_eq!(traj.get_split(2), None);
    }
}
