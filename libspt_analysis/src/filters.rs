//! Subsets of a [`TrajectoryStore`] used to choose which particles feed an ensemble MSD.
//!
//! Finding nothing is a normal outcome for these filters, so they return a [`Selection`]
//! instead of an error and leave it to the caller to log or skip.
use std::collections::BTreeSet;
use std::fmt::Display;

use super::constants::{CENTER_REGION_HIGH, CENTER_REGION_LOW};
use super::trajectory::TrajectoryStore;

/// Why a filter selected nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptySelection {
    NoCenteredParticles,
    NoUnbrokenTrajectories,
}

impl Display for EmptySelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCenteredParticles => write!(f, "No particles near the center"),
            Self::NoUnbrokenTrajectories => write!(f, "No unbroken trajectories"),
        }
    }
}

/// Either the selected value, or the reason nothing qualified
#[derive(Debug, Clone, PartialEq)]
pub enum Selection<T> {
    Selected(T),
    Empty(EmptySelection),
}

impl<T> Selection<T> {
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Selection<U> {
        match self {
            Self::Selected(value) => Selection::Selected(f(value)),
            Self::Empty(reason) => Selection::Empty(reason),
        }
    }

    pub fn selected(self) -> Option<T> {
        match self {
            Self::Selected(value) => Some(value),
            Self::Empty(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty(_))
    }
}

/// Particles that start in the middle half of the frame.
///
/// A particle qualifies if its observation at frame 0 lies strictly inside the central
/// region in both x and y. The result is cut at the last frame `F` such that every
/// qualifying particle is present at every frame `0..=F`, so the population is constant.
pub fn center_start(
    store: &TrajectoryStore,
    frame_width: f64,
    frame_height: f64,
) -> Selection<TrajectoryStore> {
    let in_center = |value: f64, size: f64| {
        CENTER_REGION_LOW * size < value && value < CENTER_REGION_HIGH * size
    };
    let centered: Vec<i64> = store
        .trajectories()
        .filter(|t| match t.at_frame(0) {
            Some(obs) => in_center(obs.x, frame_width) && in_center(obs.y, frame_height),
            None => false,
        })
        .map(|t| t.particle_id())
        .collect();
    if centered.is_empty() {
        return Selection::Empty(EmptySelection::NoCenteredParticles);
    }

    // Every centered trajectory is present at frame 0; walk forward until one drops out
    let mut last_full_frame = 0;
    'frames: loop {
        let next = last_full_frame + 1;
        for id in centered.iter() {
            let present = store.get(*id).and_then(|t| t.at_frame(next)).is_some();
            if !present {
                break 'frames;
            }
        }
        last_full_frame = next;
    }

    let ids: BTreeSet<i64> = centered.into_iter().collect();
    let selected = store.retain_particles(&ids).truncate_frames(last_full_frame);
    if selected.is_empty() {
        Selection::Empty(EmptySelection::NoCenteredParticles)
    } else {
        Selection::Selected(selected)
    }
}

/// Particles observed at both the first and the last frame of the store.
///
/// Gaps in between are allowed; only presence at the two ends matters.
pub fn full_trajectory(store: &TrajectoryStore) -> Selection<TrajectoryStore> {
    let (first, last) = match store.frame_range() {
        Some(range) => range,
        None => return Selection::Empty(EmptySelection::NoUnbrokenTrajectories),
    };
    let ids: BTreeSet<i64> = store
        .trajectories()
        .filter(|t| t.at_frame(first).is_some() && t.at_frame(last).is_some())
        .map(|t| t.particle_id())
        .collect();
    if ids.is_empty() {
        Selection::Empty(EmptySelection::NoUnbrokenTrajectories)
    } else {
        Selection::Selected(store.retain_particles(&ids))
    }
}
