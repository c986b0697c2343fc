//! # Trajectory cache
//!
//! Loading a trajectory touches the file system, so it is done once per trajectory (or split) and
//! the result kept in memory. Failed loads are cached too, as empty trajectories, so a bad file is
//! reported once rather than on every request.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::debug;
use std::collections::HashMap;
use std::rc::Rc;

use crate::alert::{Alerts, AutoDiagnostic};
use crate::sample::TrajectorySample;
use crate::store::{self, TrajectoryStore};
use crate::trajectory::Trajectory;

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Key identifying a whole trajectory or one of its splits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub name: String,
    pub split: Option<usize>,
}

/// Memoises trajectories read from a store.
pub struct TrajectoryCache<S> {
    store: Box<dyn TrajectoryStore>,
    alerts: Alerts,
    trajectories: HashMap<CacheKey, Rc<Trajectory<S>>>,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl CacheKey {
    pub fn whole(name: &str) -> Self {
        Self {
            name: name.to_string(),
            split: None,
        }
    }

    pub fn split(name: &str, index: usize) -> Self {
        Self {
            name: name.to_string(),
            split: Some(index),
        }
    }
}

impl<S: TrajectorySample> TrajectoryCache<S> {
    pub fn new(store: Box<dyn TrajectoryStore>, alerts: Alerts) -> Self {
        Self {
            store,
            alerts,
            trajectories: HashMap::new(),
        }
    }

    /// Get the named trajectory, loading it if this is the first request for it.
    ///
    /// If the trajectory cannot be loaded an error alert is raised and an empty trajectory is
    /// returned (and cached).
    pub fn load(&mut self, name: &str) -> Rc<Trajectory<S>> {
        let key = CacheKey::whole(name);

        if let Some(traj) = self.trajectories.get(&key) {
            return traj.clone();
        }

        let traj = match store::load::<S>(self.store.as_ref(), name) {
            Ok(t) => {
                debug!("Loaded trajectory \"{}\" ({} samples)", name, t.len());
                t
            }
            Err(source) => {
                self.alerts.error(AutoDiagnostic::LoadFailed {
                    name: name.to_string(),
                    source,
                });
                Trajectory::empty(name)
            }
        };

        let traj = Rc::new(traj);
        self.trajectories.insert(key, traj.clone());
        traj
    }

    /// Get one split of the named trajectory, loading the whole trajectory first if needed.
    ///
    /// A split which does not exist raises a warning and gives an empty trajectory.
    pub fn load_split(&mut self, name: &str, index: usize) -> Rc<Trajectory<S>> {
        let key = CacheKey::split(name, index);

        if let Some(traj) = self.trajectories.get(&key) {
            return traj.clone();
        }

        let parent = self.load(name);
        let split = match parent.get_split(index) {
            Some(s) => s,
            None => {
                // An unloadable parent has already been reported
                if !parent.is_empty() {
                    self.alerts.warn(AutoDiagnostic::SplitNotFound {
                        name: name.to_string(),
                        index,
                    });
                }
                Trajectory::empty(format!("{}[{}]", name, index))
            }
        };

        let split = Rc::new(split);
        self.trajectories.insert(key, split.clone());
        split
    }

    /// Forget every cached trajectory so the next request re-reads the store.
    pub fn clear(&mut self) {
        debug!("Clearing {} cached trajectories", self.trajectories.len());
        self.trajectories.clear();
    }

    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.trajectories.contains_key(key)
    }
}
