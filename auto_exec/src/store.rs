//! # Trajectory store
//!
//! Trajectories are produced offline and deployed as `.traj` JSON files. This module reads them
//! from a [`TrajectoryStore`] and turns them into [`Trajectory`] values. The sample kind is taken
//! from the file's `sampleType` tag and checked once here, nothing downstream ever re-checks it.
//!
//! File layout:
//!
//! ```json
//! {
//!     "name": "start",
//!     "version": 1,
//!     "trajectory": {
//!         "sampleType": "Swerve",
//!         "samples": [ { "t": 0.0, "x": 1.0, ... } ],
//!         "splits": [0, 12]
//!     },
//!     "events": [ { "timestamp": 0.4, "event": "intake" } ]
//! }
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::debug;
use serde::Deserialize;
use serde_json::Value;
use std::cell::Cell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::sample::{DifferentialSample, SampleKind, SwerveSample, TrajectorySample};
use crate::trajectory::{EventMarker, Trajectory};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The trajectory file schema version this library reads.
pub const SCHEMA_VERSION: u64 = 1;

/// Extension of trajectory files.
pub const TRAJECTORY_FILE_EXTENSION: &str = ".traj";

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Errors which can occur while loading a trajectory.
#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("Cannot read trajectory file {path:?}: {source}")]
    FileNotFound { path: PathBuf, source: io::Error },

    #[error("Trajectory \"{name}\" has schema version {found}, expected {expected}")]
    SchemaVersionMismatch {
        name: String,
        found: String,
        expected: u64,
    },

    #[error("Trajectory \"{name}\" is malformed: {source}")]
    MalformedTrajectory {
        name: String,
        source: serde_json::Error,
    },

    #[error("Trajectory \"{name}\" holds {found} samples, expected {expected} samples")]
    SampleTypeMismatch {
        name: String,
        found: SampleKind,
        expected: SampleKind,
    },

    #[error("Trajectory \"{name}\" has a sample out of time order at index {index}")]
    NonMonotonicTimestamps { name: String, index: usize },
}

/// A trajectory of whichever sample kind its file declared.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyTrajectory {
    Swerve(Trajectory<SwerveSample>),
    Differential(Trajectory<DifferentialSample>),
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Somewhere trajectory files can be read from.
pub trait TrajectoryStore {
    /// Read the raw JSON of the named trajectory.
    fn read(&self, name: &str) -> Result<String, TrajectoryError>;
}

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Reads `<dir>/<name>.traj` files.
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
}

/// Holds trajectory JSON in memory, counting how many reads were made.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: HashMap<String, String>,
    num_reads: Cell<usize>,
}

#[derive(Deserialize)]
struct TrajectoryFile {
    name: String,
    trajectory: TrajectoryBody,
    #[serde(default)]
    events: Vec<EventMarker>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrajectoryBody {
    sample_type: SampleKind,
    samples: Value,
    #[serde(default)]
    splits: Vec<usize>,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl DirStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file holding the named trajectory.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}", strip_extension(name), TRAJECTORY_FILE_EXTENSION))
    }
}

impl TrajectoryStore for DirStore {
    fn read(&self, name: &str) -> Result<String, TrajectoryError> {
        let path = self.path_for(name);

        debug!("Reading trajectory file {:?}", path);

        fs::read_to_string(&path).map_err(|source| TrajectoryError::FileNotFound { path, source })
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<N: Into<String>, J: Into<String>>(&mut self, name: N, json: J) {
        self.files.insert(name.into(), json.into());
    }

    /// Number of reads made so far, successful or not.
    pub fn num_reads(&self) -> usize {
        self.num_reads.get()
    }
}

impl TrajectoryStore for MemoryStore {
    fn read(&self, name: &str) -> Result<String, TrajectoryError> {
        self.num_reads.set(self.num_reads.get() + 1);

        let name = strip_extension(name);
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| TrajectoryError::FileNotFound {
                path: PathBuf::from(format!("{}{}", name, TRAJECTORY_FILE_EXTENSION)),
                source: io::Error::new(io::ErrorKind::NotFound, "not in memory store"),
            })
    }
}

impl AnyTrajectory {
    pub fn kind(&self) -> SampleKind {
        match self {
            AnyTrajectory::Swerve(_) => SampleKind::Swerve,
            AnyTrajectory::Differential(_) => SampleKind::Differential,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AnyTrajectory::Swerve(t) => t.name(),
            AnyTrajectory::Differential(t) => t.name(),
        }
    }

    pub fn total_time_s(&self) -> f64 {
        match self {
            AnyTrajectory::Swerve(t) => t.total_time_s(),
            AnyTrajectory::Differential(t) => t.total_time_s(),
        }
    }
}

impl TrajectoryFile {
    fn into_trajectory<S: TrajectorySample>(self) -> Result<Trajectory<S>, TrajectoryError> {
        if self.trajectory.sample_type != S::KIND {
            return Err(TrajectoryError::SampleTypeMismatch {
                name: self.name,
                found: self.trajectory.sample_type,
                expected: S::KIND,
            });
        }

        let samples: Vec<S> = match serde_json::from_value(self.trajectory.samples) {
            Ok(s) => s,
            Err(source) => {
                return Err(TrajectoryError::MalformedTrajectory {
                    name: self.name,
                    source,
                })
            }
        };

        if let Some(i) = samples
            .windows(2)
            .position(|w| w[1].timestamp_s() < w[0].timestamp_s())
        {
            return Err(TrajectoryError::NonMonotonicTimestamps {
                name: self.name,
                index: i + 1,
            });
        }

        Ok(Trajectory::new(
            self.name,
            samples,
            self.trajectory.splits,
            self.events,
        ))
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a trajectory of a known sample kind from the store.
///
/// A trailing `.traj` in `name` is ignored.
pub fn load<S: TrajectorySample>(
    store: &dyn TrajectoryStore,
    name: &str,
) -> Result<Trajectory<S>, TrajectoryError> {
    let name = strip_extension(name);
    let json = store.read(name)?;
    parse(name, &json)
}

/// Load a trajectory of whatever sample kind the file declares.
pub fn load_any(store: &dyn TrajectoryStore, name: &str) -> Result<AnyTrajectory, TrajectoryError> {
    let name = strip_extension(name);
    let file = parse_file(name, &store.read(name)?)?;

    match file.trajectory.sample_type {
        SampleKind::Swerve => file.into_trajectory().map(AnyTrajectory::Swerve),
        SampleKind::Differential => file.into_trajectory().map(AnyTrajectory::Differential),
    }
}

/// Parse trajectory JSON.
pub fn parse<S: TrajectorySample>(name: &str, json: &str) -> Result<Trajectory<S>, TrajectoryError> {
    parse_file(name, json)?.into_trajectory()
}

fn parse_file(name: &str, json: &str) -> Result<TrajectoryFile, TrajectoryError> {
    let malformed = |source| TrajectoryError::MalformedTrajectory {
        name: name.to_string(),
        source,
    };

    let value: Value = serde_json::from_str(json).map_err(malformed)?;

    // The version is checked before anything else as other versions may be laid out differently
    let version = value.get("version");
    if version.and_then(Value::as_u64) != Some(SCHEMA_VERSION) {
        return Err(TrajectoryError::SchemaVersionMismatch {
            name: name.to_string(),
            found: version.map_or_else(|| String::from("none"), Value::to_string),
            expected: SCHEMA_VERSION,
        });
    }

    serde_json::from_value(value).map_err(malformed)
}

fn strip_extension(name: &str) -> &str {
    name.strip_suffix(TRAJECTORY_FILE_EXTENSION).unwrap_or(name)
}
