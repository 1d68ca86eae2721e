use std::path::Path;

use super::constants::{
    PARTICLE_SPEED_PLOT_PREFIX, SPEED_INDEX_NAME, SPEED_TABLE_NAME, TOTAL_SPEED_PLOT_NAME,
};
use super::density::DensityEstimate;
use super::error::AnalysisError;
use super::plot::render_distribution;
use super::table::ParticleTable;
use super::trajectory::{Trajectory, TrajectoryStore};

/// Instantaneous speeds (um/s) of one particle, one per consecutive observation pair
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleSpeeds {
    pub particle_id: i64,
    pub speeds: Vec<f64>,
    /// pairs dropped because both observations had the same time
    pub skipped_pairs: usize,
}

impl ParticleSpeeds {
    /// Compute the speed between every pair of consecutive observations.
    ///
    /// A trajectory with a single observation has no speeds.
    pub fn from_trajectory(trajectory: &Trajectory, microns_per_pixel: f64) -> Self {
        let mut speeds = Vec::with_capacity(trajectory.len().saturating_sub(1));
        let mut skipped_pairs = 0;
        for pair in trajectory.observations().windows(2) {
            let dt = pair[1].time - pair[0].time;
            if dt == 0.0 {
                skipped_pairs += 1;
                continue;
            }
            speeds.push(pair[0].distance_to(&pair[1]) * microns_per_pixel / dt);
        }
        Self {
            particle_id: trajectory.particle_id(),
            speeds,
            skipped_pairs,
        }
    }
}

/// Summary of a speed distribution, everything needed to draw it
#[derive(Debug, Clone)]
pub struct SpeedDistribution {
    pub n_samples: usize,
    pub mean: f64,
    pub max_observed: f64,
    /// upper end of the speed axis; never below the expected maximum speed
    pub axis_max: f64,
    pub density: DensityEstimate,
    /// density value at the mean, for the mean marker
    pub mean_density: f64,
}

impl SpeedDistribution {
    /// Returns None when there are no samples
    pub fn new(samples: &[f64], expected_max: f64) -> Option<Self> {
        let density = DensityEstimate::gaussian(samples)?;
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let max_observed = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            n_samples: samples.len(),
            mean,
            max_observed,
            axis_max: expected_max.max(max_observed),
            mean_density: density.interpolate(mean),
            density,
        })
    }
}

/// Speeds of every particle in a sample plus the pooled ensemble
#[derive(Debug, Clone, Default)]
pub struct VelocityReport {
    pub particles: Vec<ParticleSpeeds>,
    pub ensemble: Vec<f64>,
}

impl VelocityReport {
    pub fn compute(store: &TrajectoryStore, microns_per_pixel: f64) -> Self {
        let particles: Vec<ParticleSpeeds> = store
            .trajectories()
            .map(|t| ParticleSpeeds::from_trajectory(t, microns_per_pixel))
            .collect();
        let ensemble = particles
            .iter()
            .flat_map(|p| p.speeds.iter().copied())
            .collect();
        let report = Self {
            particles,
            ensemble,
        };
        let skipped = report.skipped_pairs();
        if skipped > 0 {
            spdlog::warn!(
                "Skipped {} observation pairs with zero time difference while computing speeds",
                skipped
            );
        }
        report
    }

    pub fn skipped_pairs(&self) -> usize {
        self.particles.iter().map(|p| p.skipped_pairs).sum()
    }

    pub fn ensemble_distribution(&self, expected_max: f64) -> Option<SpeedDistribution> {
        SpeedDistribution::new(&self.ensemble, expected_max)
    }

    /// One column per particle id, padded to the longest speed sequence
    pub fn to_table(&self) -> ParticleTable {
        ParticleTable::from_ragged(
            SPEED_INDEX_NAME,
            self.particles
                .iter()
                .map(|p| (p.particle_id.to_string(), p.speeds.clone()))
                .collect(),
        )
    }

    /// Write the speed table and, if requested, the per particle and ensemble plots
    pub fn save(
        &self,
        output_dir: &Path,
        expected_max: f64,
        render_plots: bool,
    ) -> Result<(), AnalysisError> {
        self.to_table().write_csv(&output_dir.join(SPEED_TABLE_NAME))?;
        if !render_plots {
            return Ok(());
        }
        for particle in self.particles.iter() {
            if let Some(dist) = SpeedDistribution::new(&particle.speeds, expected_max) {
                render_distribution(
                    &output_dir.join(format!(
                        "{}{}.png",
                        PARTICLE_SPEED_PLOT_PREFIX, particle.particle_id
                    )),
                    &dist,
                    &format!("speed distribution, particle {}", particle.particle_id),
                )?;
            }
        }
        save_ensemble_distribution(output_dir, &self.ensemble, expected_max)?;
        Ok(())
    }
}

/// Render the pooled distribution to `vd_all.png`; an empty ensemble is only logged
pub fn save_ensemble_distribution(
    output_dir: &Path,
    ensemble: &[f64],
    expected_max: f64,
) -> Result<(), AnalysisError> {
    match SpeedDistribution::new(ensemble, expected_max) {
        Some(dist) => {
            spdlog::info!(
                "Mean speed {:.2} um/s over {} samples",
                dist.mean,
                dist.n_samples
            );
            render_distribution(
                &output_dir.join(TOTAL_SPEED_PLOT_NAME),
                &dist,
                "total speed distribution",
            )?;
        }
        None => spdlog::warn!("No speed samples; skipping the total speed distribution"),
    }
    Ok(())
}
