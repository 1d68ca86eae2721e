//! Detection input and trajectory linking.
//!
//! Particle location in the raw image stacks is done by an external locator which exports
//! a detection table (`frame, x, y, mass`). A [`Detector`] turns such an export into
//! [`Detection`]s, and a [`Linker`] assigns stable particle ids across frames. Inputs
//! that were already linked elsewhere (they carry a `particle` column) skip both steps.
use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::config::Config;
use super::constants::DETECTION_COLUMNS;
use super::error::LinkingError;
use super::trajectory::{Observation, TrajectoryStore};

/// One located blob in one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub frame: u64,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub mass: f64,
}

/// Parameters controlling how detections are joined into trajectories
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkParameters {
    /// Largest displacement between two linked detections, in pixels per frame
    pub search_range: f64,
    /// Number of frames a particle may go undetected before its identity is dropped
    pub memory: u64,
}

impl LinkParameters {
    pub fn from_config(config: &Config) -> Self {
        Self {
            search_range: config.search_range(),
            memory: config.memory,
        }
    }
}

/// Source of particle detections for one sample
pub trait Detector {
    fn locate(&self, source: &Path) -> Result<Vec<Detection>, LinkingError>;
}

/// Links detections into trajectories
pub trait Linker {
    fn link(
        &self,
        detections: &[Detection],
        params: &LinkParameters,
        frame_rate: f64,
    ) -> Result<TrajectoryStore, LinkingError>;
}

/// Reads detection tables exported by the external locator, dropping dim detections
#[derive(Debug, Clone, Copy)]
pub struct CsvDetector {
    pub min_mass: f64,
}

impl Detector for CsvDetector {
    fn locate(&self, source: &Path) -> Result<Vec<Detection>, LinkingError> {
        let mut reader = csv::Reader::from_path(source)?;
        let headers = reader.headers()?.clone();
        for column in DETECTION_COLUMNS {
            if !headers.iter().any(|h| h.trim() == column) {
                return Err(LinkingError::MissingColumn(
                    column.to_string(),
                    source.to_path_buf(),
                ));
            }
        }
        let mut detections = Vec::new();
        for row in reader.deserialize::<Detection>() {
            let detection = row?;
            if detection.mass >= self.min_mass {
                detections.push(detection);
            }
        }
        if detections.is_empty() {
            return Err(LinkingError::NoDetections(self.min_mass));
        }
        Ok(detections)
    }
}

#[derive(Debug)]
struct ActiveTrack {
    particle_id: i64,
    x: f64,
    y: f64,
    last_frame: u64,
}

/// Greedy frame-to-frame nearest neighbour linking with memory.
///
/// In every frame, candidate (track, detection) pairs within the search range are
/// accepted closest first; leftover detections start new particles. A track that has
/// not been matched for more than `memory` frames is retired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighborLinker;

impl Linker for NearestNeighborLinker {
    fn link(
        &self,
        detections: &[Detection],
        params: &LinkParameters,
        frame_rate: f64,
    ) -> Result<TrajectoryStore, LinkingError> {
        if !(params.search_range.is_finite() && params.search_range > 0.0) {
            return Err(LinkingError::InvalidSearchRange(params.search_range));
        }
        let mut frames: BTreeMap<u64, Vec<&Detection>> = BTreeMap::new();
        for detection in detections {
            frames.entry(detection.frame).or_default().push(detection);
        }

        let max_sq = params.search_range * params.search_range;
        let mut active: Vec<ActiveTrack> = Vec::new();
        let mut observations = Vec::with_capacity(detections.len());
        let mut next_id: i64 = 0;

        for (frame, frame_detections) in frames {
            active.retain(|t| frame - t.last_frame <= params.memory + 1);

            let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
            for (t_idx, track) in active.iter().enumerate() {
                for (d_idx, det) in frame_detections.iter().enumerate() {
                    let dist_sq = (track.x - det.x).powi(2) + (track.y - det.y).powi(2);
                    if dist_sq <= max_sq {
                        candidates.push((dist_sq, t_idx, d_idx));
                    }
                }
            }
            candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

            let mut track_taken = vec![false; active.len()];
            let mut assignment: FxHashMap<usize, usize> = FxHashMap::default();
            for (_, t_idx, d_idx) in candidates {
                if track_taken[t_idx] || assignment.contains_key(&d_idx) {
                    continue;
                }
                track_taken[t_idx] = true;
                assignment.insert(d_idx, t_idx);
            }

            for (d_idx, det) in frame_detections.iter().enumerate() {
                let particle_id = match assignment.get(&d_idx) {
                    Some(t_idx) => {
                        let track = &mut active[*t_idx];
                        track.x = det.x;
                        track.y = det.y;
                        track.last_frame = frame;
                        track.particle_id
                    }
                    None => {
                        let id = next_id;
                        next_id += 1;
                        active.push(ActiveTrack {
                            particle_id: id,
                            x: det.x,
                            y: det.y,
                            last_frame: frame,
                        });
                        id
                    }
                };
                observations.push(Observation::new(frame, particle_id, det.x, det.y, frame_rate));
            }
        }

        spdlog::debug!(
            "Linked {} detections into {} trajectories",
            detections.len(),
            next_id
        );
        Ok(TrajectoryStore::from_observations(observations)?)
    }
}

/// What a sample input file contains
#[derive(Debug, Clone)]
pub enum SampleInput {
    Linked(TrajectoryStore),
    Detections(Vec<Detection>),
}

impl SampleInput {
    /// Load a sample input file; tables with a `particle` column are already linked
    pub fn load(path: &Path, config: &Config) -> Result<Self, LinkingError> {
        let mut reader = csv::Reader::from_path(path)?;
        let is_linked = reader.headers()?.iter().any(|h| h.trim() == "particle");
        if is_linked {
            Ok(Self::Linked(TrajectoryStore::read_csv(path, config.frame_rate)?))
        } else {
            let detector = CsvDetector {
                min_mass: config.min_mass,
            };
            Ok(Self::Detections(detector.locate(path)?))
        }
    }

    /// Produce trajectories, linking detections when needed
    pub fn into_trajectories(
        self,
        linker: &dyn Linker,
        config: &Config,
    ) -> Result<TrajectoryStore, LinkingError> {
        match self {
            Self::Linked(store) => Ok(store),
            Self::Detections(detections) => linker.link(
                &detections,
                &LinkParameters::from_config(config),
                config.frame_rate,
            ),
        }
    }
}
