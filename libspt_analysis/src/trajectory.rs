//! Linked particle trajectories.
//!
//! A [`TrajectoryStore`] holds one [`Trajectory`] per particle id; every trajectory is a
//! frame-ordered list of [`Observation`]s. Stores are never mutated by the analysis:
//! every filter returns a new store.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use super::constants::TRAJECTORY_COLUMNS;
use super::error::TrajectoryError;

/// One detected particle at one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub frame: u64,
    #[serde(rename = "particle")]
    pub particle_id: i64,
    pub x: f64,
    pub y: f64,
    pub time: f64,
}

impl Observation {
    /// Create an observation, deriving its time from the frame rate
    pub fn new(frame: u64, particle_id: i64, x: f64, y: f64, frame_rate: f64) -> Self {
        Self {
            frame,
            particle_id,
            x,
            y,
            time: frame as f64 / frame_rate,
        }
    }

    /// Euclidean distance in pixels
    pub fn distance_to(&self, other: &Observation) -> f64 {
        self.squared_distance_to(other).sqrt()
    }

    pub fn squared_distance_to(&self, other: &Observation) -> f64 {
        (self.x - other.x).powi(2) + (self.y - other.y).powi(2)
    }
}

/// Row layout of trajectory tables on disk. Extra columns (as written by other
/// tracking tools) are ignored; time is always rederived from the frame.
#[derive(Debug, Deserialize)]
struct TrajectoryRow {
    frame: u64,
    particle: i64,
    x: f64,
    y: f64,
}

/// The frame-ordered observations of a single particle
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    particle_id: i64,
    observations: Vec<Observation>,
}

impl Trajectory {
    /// Build a trajectory, sorting the observations by frame.
    ///
    /// Fails if an observation belongs to another particle, if two observations share a
    /// frame, or if a position is not finite.
    pub fn new(
        particle_id: i64,
        mut observations: Vec<Observation>,
    ) -> Result<Self, TrajectoryError> {
        for obs in observations.iter() {
            if obs.particle_id != particle_id {
                return Err(TrajectoryError::MismatchedParticle(
                    obs.particle_id,
                    particle_id,
                ));
            }
            if !(obs.x.is_finite() && obs.y.is_finite()) {
                return Err(TrajectoryError::NonFinitePosition(particle_id, obs.frame));
            }
        }
        observations.sort_by_key(|obs| obs.frame);
        for pair in observations.windows(2) {
            if pair[0].frame == pair[1].frame {
                return Err(TrajectoryError::DuplicateFrame(particle_id, pair[0].frame));
            }
        }
        Ok(Self {
            particle_id,
            observations,
        })
    }

    pub fn particle_id(&self) -> i64 {
        self.particle_id
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first(&self) -> Option<&Observation> {
        self.observations.first()
    }

    pub fn last(&self) -> Option<&Observation> {
        self.observations.last()
    }

    /// Get the observation at a given frame, if the particle was seen there
    pub fn at_frame(&self, frame: u64) -> Option<&Observation> {
        self.observations
            .binary_search_by_key(&frame, |obs| obs.frame)
            .ok()
            .map(|idx| &self.observations[idx])
    }

    /// Copy of the trajectory keeping only frames up to and including `max_frame`.
    /// None if nothing is left.
    pub fn truncated(&self, max_frame: u64) -> Option<Self> {
        let observations: Vec<Observation> = self
            .observations
            .iter()
            .take_while(|obs| obs.frame <= max_frame)
            .copied()
            .collect();
        if observations.is_empty() {
            None
        } else {
            Some(Self {
                particle_id: self.particle_id,
                observations,
            })
        }
    }
}

/// All linked trajectories of one sample, keyed (and ordered) by particle id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrajectoryStore {
    trajectories: BTreeMap<i64, Trajectory>,
}

impl TrajectoryStore {
    /// Group a flat list of observations into trajectories
    pub fn from_observations(observations: Vec<Observation>) -> Result<Self, TrajectoryError> {
        let mut grouped: BTreeMap<i64, Vec<Observation>> = BTreeMap::new();
        for obs in observations {
            grouped.entry(obs.particle_id).or_default().push(obs);
        }
        let mut trajectories = BTreeMap::new();
        for (particle_id, group) in grouped {
            trajectories.insert(particle_id, Trajectory::new(particle_id, group)?);
        }
        Ok(Self { trajectories })
    }

    /// Number of particles
    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    pub fn n_observations(&self) -> usize {
        self.trajectories.values().map(|t| t.len()).sum()
    }

    pub fn particle_ids(&self) -> Vec<i64> {
        self.trajectories.keys().copied().collect()
    }

    pub fn get(&self, particle_id: i64) -> Option<&Trajectory> {
        self.trajectories.get(&particle_id)
    }

    /// Iterate over trajectories in ascending particle id
    pub fn trajectories(&self) -> impl Iterator<Item = &Trajectory> {
        self.trajectories.values()
    }

    /// The first and last frame observed anywhere in the store
    pub fn frame_range(&self) -> Option<(u64, u64)> {
        let first = self.trajectories.values().filter_map(|t| t.first()).map(|o| o.frame).min()?;
        let last = self.trajectories.values().filter_map(|t| t.last()).map(|o| o.frame).max()?;
        Some((first, last))
    }

    /// Ids of all particles that have an observation at a given frame
    pub fn particles_at_frame(&self, frame: u64) -> Vec<i64> {
        self.trajectories
            .values()
            .filter(|t| t.at_frame(frame).is_some())
            .map(|t| t.particle_id)
            .collect()
    }

    /// New store with only the given particles
    pub fn retain_particles(&self, particle_ids: &BTreeSet<i64>) -> Self {
        Self {
            trajectories: self
                .trajectories
                .iter()
                .filter(|(id, _)| particle_ids.contains(id))
                .map(|(id, t)| (*id, t.clone()))
                .collect(),
        }
    }

    /// New store without the given particles
    pub fn without_particles(&self, particle_ids: &[i64]) -> Self {
        Self {
            trajectories: self
                .trajectories
                .iter()
                .filter(|(id, _)| !particle_ids.contains(id))
                .map(|(id, t)| (*id, t.clone()))
                .collect(),
        }
    }

    /// New store without trajectories shorter than `min_length` observations
    pub fn filter_stubs(&self, min_length: usize) -> Self {
        Self {
            trajectories: self
                .trajectories
                .iter()
                .filter(|(_, t)| t.len() >= min_length)
                .map(|(id, t)| (*id, t.clone()))
                .collect(),
        }
    }

    /// New store keeping only frames up to and including `max_frame`
    pub fn truncate_frames(&self, max_frame: u64) -> Self {
        Self {
            trajectories: self
                .trajectories
                .iter()
                .filter_map(|(id, t)| t.truncated(max_frame).map(|t| (*id, t)))
                .collect(),
        }
    }

    /// Read a trajectory table (columns frame, particle, x, y; others ignored).
    ///
    /// Time is rederived from the frame using the frame rate.
    pub fn read_csv(path: &Path, frame_rate: f64) -> Result<Self, TrajectoryError> {
        if !(frame_rate.is_finite() && frame_rate > 0.0) {
            return Err(TrajectoryError::BadFrameRate(frame_rate));
        }
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        for column in TRAJECTORY_COLUMNS {
            if !headers.iter().any(|h| h.trim() == column) {
                return Err(TrajectoryError::MissingColumn(
                    column.to_string(),
                    path.to_path_buf(),
                ));
            }
        }
        let mut observations = Vec::new();
        for row in reader.deserialize::<TrajectoryRow>() {
            let row = row?;
            observations.push(Observation::new(
                row.frame,
                row.particle,
                row.x,
                row.y,
                frame_rate,
            ));
        }
        Self::from_observations(observations)
    }

    /// Write the store as a table ordered by frame, then particle
    pub fn write_csv(&self, path: &Path) -> Result<(), TrajectoryError> {
        let mut rows: Vec<&Observation> = self
            .trajectories
            .values()
            .flat_map(|t| t.observations.iter())
            .collect();
        rows.sort_by_key(|obs| (obs.frame, obs.particle_id));
        let mut writer = csv::Writer::from_path(path)?;
        for obs in rows {
            writer.serialize(obs)?;
        }
        writer.flush()?;
        Ok(())
    }
}
