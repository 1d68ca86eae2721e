//! Mean squared displacement.
//!
//! Per-particle curves are always computed. The ensemble curve depends on the
//! [`EnsembleMode`]: every mode is a (possibly trivial) trajectory filter followed by one
//! of two reducers:
//!
//! - [`CurveMean`] averages the per-particle MSD values that exist at each lag, so every
//!   particle weighs the same.
//! - [`PooledDisplacement`] pools all squared displacements of all particles at each lag,
//!   so every displacement pair weighs the same and long trajectories dominate.
use std::borrow::Cow;
use std::path::Path;
use std::str::FromStr;

use super::config::Config;
use super::constants::{
    CENTER_FRAME_MSD_NAME, EMSD_NAME, ENSEMBLE_COLUMN_NAME, FULL_TRAJECTORY_MSD_NAME,
    LAG_INDEX_NAME, MEAN_MSD_NAME, MSD_TABLE_NAME,
};
use super::error::{AnalysisError, ConfigError, TableError};
use super::filters::{center_start, full_trajectory, EmptySelection, Selection};
use super::plot::render_msd_table;
use super::table::ParticleTable;
use super::trajectory::{Trajectory, TrajectoryStore};

/// Sum of squared displacements (um^2) and number of pairs at one lag
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LagSum {
    pub sum_squared: f64,
    pub pairs: usize,
}

impl LagSum {
    pub fn msd(&self) -> Option<f64> {
        if self.pairs == 0 {
            None
        } else {
            Some(self.sum_squared / self.pairs as f64)
        }
    }
}

/// MSD of one particle for lags `0..=max_lag` frames, where `max_lag` never exceeds the
/// frame span of the trajectory
#[derive(Debug, Clone, PartialEq)]
pub struct MsdCurve {
    pub particle_id: i64,
    lags: Vec<LagSum>,
}

impl MsdCurve {
    /// Pairs are observations whose frames differ by exactly the lag, so gaps left by
    /// linking memory do not shift the lag. Lag 0 pairs every observation with itself.
    pub fn from_trajectory(trajectory: &Trajectory, max_lag: u64, microns_per_pixel: f64) -> Self {
        let span = match (trajectory.first(), trajectory.last()) {
            (Some(first), Some(last)) => last.frame - first.frame,
            _ => 0,
        };
        let max_lag = max_lag.min(span);
        let mut lags = vec![LagSum::default(); max_lag as usize + 1];
        let observations = trajectory.observations();
        lags[0].pairs = observations.len();
        let scale = microns_per_pixel * microns_per_pixel;
        for (i, start) in observations.iter().enumerate() {
            for end in observations[i + 1..].iter() {
                let lag = end.frame - start.frame;
                if lag > max_lag {
                    break;
                }
                let entry = &mut lags[lag as usize];
                entry.sum_squared += start.squared_distance_to(end) * scale;
                entry.pairs += 1;
            }
        }
        Self {
            particle_id: trajectory.particle_id(),
            lags,
        }
    }

    /// Longest lag the curve covers
    pub fn max_lag(&self) -> u64 {
        (self.lags.len() - 1) as u64
    }

    pub fn lag_sum(&self, lag: u64) -> Option<&LagSum> {
        self.lags.get(lag as usize)
    }

    pub fn msd_at(&self, lag: u64) -> Option<f64> {
        self.lag_sum(lag).and_then(|l| l.msd())
    }

    /// Largest lag with at least one displacement pair (0 if none)
    pub fn reached_lag(&self) -> u64 {
        self.lags
            .iter()
            .rposition(|l| l.pairs > 0)
            .unwrap_or(0) as u64
    }

    /// Whether the particle has any displacement at a lag of at least one frame
    pub fn has_displacement(&self) -> bool {
        self.reached_lag() > 0
    }
}

/// Ensemble MSD values for lags `1..=max_lag`; None where nothing contributed
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleCurve {
    pub values: Vec<(u64, Option<f64>)>,
}

impl EnsembleCurve {
    pub fn msd_at(&self, lag: u64) -> Option<f64> {
        self.values
            .iter()
            .find(|(l, _)| *l == lag)
            .and_then(|(_, v)| *v)
    }

    /// Single column table indexed by lag time, skipping lags without a value
    pub fn to_table(&self, frame_rate: f64) -> ParticleTable {
        let defined: Vec<(f64, f64)> = self
            .values
            .iter()
            .filter_map(|(lag, v)| v.map(|v| (*lag as f64 / frame_rate, v)))
            .collect();
        ParticleTable::from_series(LAG_INDEX_NAME, ENSEMBLE_COLUMN_NAME, &defined)
    }
}

/// Combines per-particle curves into one ensemble curve
pub trait EnsembleReducer {
    fn reduce(&self, curves: &[MsdCurve], max_lag: u64) -> EnsembleCurve;
}

/// Lags an ensemble spans: up to `max_lag`, but no further than the longest curve
fn ensemble_lags(curves: &[MsdCurve], max_lag: u64) -> std::ops::RangeInclusive<u64> {
    let longest = curves.iter().map(|c| c.max_lag()).max().unwrap_or(0);
    1..=max_lag.min(longest)
}

/// Mean over particles of the per-particle MSD at each lag
#[derive(Debug, Clone, Copy, Default)]
pub struct CurveMean {
    /// only use particles that reach the largest lag any particle reaches
    pub complete_curves_only: bool,
}

impl EnsembleReducer for CurveMean {
    fn reduce(&self, curves: &[MsdCurve], max_lag: u64) -> EnsembleCurve {
        let used: Vec<&MsdCurve> = curves.iter().filter(|c| c.has_displacement()).collect();
        let used = if self.complete_curves_only {
            let longest = used.iter().map(|c| c.reached_lag()).max().unwrap_or(0);
            used.into_iter()
                .filter(|c| (1..=longest).all(|lag| c.msd_at(lag).is_some()))
                .collect()
        } else {
            used
        };
        let values = ensemble_lags(curves, max_lag)
            .map(|lag| {
                let (sum, count) = used
                    .iter()
                    .filter_map(|c| c.msd_at(lag))
                    .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
                (lag, (count > 0).then(|| sum / count as f64))
            })
            .collect();
        EnsembleCurve { values }
    }
}

/// All squared displacements of all particles pooled at each lag
#[derive(Debug, Clone, Copy, Default)]
pub struct PooledDisplacement;

impl EnsembleReducer for PooledDisplacement {
    fn reduce(&self, curves: &[MsdCurve], max_lag: u64) -> EnsembleCurve {
        let values = ensemble_lags(curves, max_lag)
            .map(|lag| {
                let pooled = curves
                    .iter()
                    .filter_map(|c| c.lag_sum(lag))
                    .fold(LagSum::default(), |acc, l| LagSum {
                        sum_squared: acc.sum_squared + l.sum_squared,
                        pairs: acc.pairs + l.pairs,
                    });
                (lag, pooled.msd())
            })
            .collect();
        EnsembleCurve { values }
    }
}

/// How the ensemble MSD of a sample is formed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsembleMode {
    /// mean of per-particle curves
    Mean,
    /// pooled displacements of all particles
    Emsd,
    /// mean of per-particle curves of particles seen at the first and last frame
    FullTrajectory,
    /// pooled displacements of particles that start in the center of the frame
    CenterFrame,
}

impl FromStr for EnsembleMode {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "emsd" => Ok(Self::Emsd),
            "full_trajectory" | "ft" => Ok(Self::FullTrajectory),
            "center_frame" | "frame" => Ok(Self::CenterFrame),
            _ => Err(ConfigError::UnknownEnsembleMode(s.to_string())),
        }
    }
}

impl EnsembleMode {
    /// File name (without extension) of this mode's ensemble output
    pub fn output_name(&self) -> &'static str {
        match self {
            Self::Mean => MEAN_MSD_NAME,
            Self::Emsd => EMSD_NAME,
            Self::FullTrajectory => FULL_TRAJECTORY_MSD_NAME,
            Self::CenterFrame => CENTER_FRAME_MSD_NAME,
        }
    }

    /// The trajectories this mode averages over
    pub fn select<'a>(
        &self,
        store: &'a TrajectoryStore,
        config: &Config,
    ) -> Selection<Cow<'a, TrajectoryStore>> {
        match self {
            Self::Mean | Self::Emsd => Selection::Selected(Cow::Borrowed(store)),
            Self::FullTrajectory => full_trajectory(store).map(Cow::Owned),
            Self::CenterFrame => {
                center_start(store, config.frame_width, config.frame_height).map(Cow::Owned)
            }
        }
    }

    pub fn reducer(&self, config: &Config) -> Box<dyn EnsembleReducer> {
        match self {
            Self::Mean | Self::FullTrajectory => Box::new(CurveMean {
                complete_curves_only: config.complete_curves_only,
            }),
            Self::Emsd | Self::CenterFrame => Box::new(PooledDisplacement),
        }
    }
}

/// What happened to the ensemble output of a sample
#[derive(Debug, Clone, PartialEq)]
pub enum EnsembleOutcome {
    Computed(EnsembleMode, EnsembleCurve),
    Skipped(EnsembleMode, EmptySelection),
    Misconfigured(String),
}

#[derive(Debug, Clone)]
pub struct MsdReport {
    pub curves: Vec<MsdCurve>,
    pub ensemble: EnsembleOutcome,
}

impl MsdReport {
    /// Per-particle curves, only particles with at least one displacement
    pub fn table(&self, frame_rate: f64) -> Result<ParticleTable, TableError> {
        curves_to_table(&self.curves, frame_rate)
    }
}

/// One column per particle, rows are lag times `1..=reached lag`
pub fn curves_to_table(
    curves: &[MsdCurve],
    frame_rate: f64,
) -> Result<ParticleTable, TableError> {
    let used: Vec<&MsdCurve> = curves.iter().filter(|c| c.has_displacement()).collect();
    let n_lags = used.iter().map(|c| c.reached_lag()).max().unwrap_or(0);
    let columns = used
        .into_iter()
        .map(|curve| {
            (
                curve.particle_id.to_string(),
                (1..=n_lags).map(|lag| curve.msd_at(lag)).collect(),
            )
        })
        .collect();
    ParticleTable::from_columns(
        LAG_INDEX_NAME,
        (1..=n_lags).map(|lag| lag as f64 / frame_rate).collect(),
        columns,
    )
}

/// Mean MSD of a table of per-particle curves (used on the combined cross-sample table)
pub fn mean_of_table(table: &ParticleTable, complete_curves_only: bool) -> ParticleTable {
    let source = if complete_curves_only {
        Cow::Owned(table.complete_columns())
    } else {
        Cow::Borrowed(table)
    };
    let means: Vec<(f64, f64)> = source
        .index()
        .iter()
        .zip(source.row_means())
        .filter_map(|(lag, mean)| mean.map(|m| (*lag, m)))
        .collect();
    ParticleTable::from_series(table.index_name(), ENSEMBLE_COLUMN_NAME, &means)
}

/// Computes and persists the MSD outputs of a sample
#[derive(Debug, Clone)]
pub struct MsdAnalyzer<'a> {
    config: &'a Config,
    max_lag: u64,
}

impl<'a> MsdAnalyzer<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            max_lag: config.max_lag_frames(),
        }
    }

    fn curves(&self, store: &TrajectoryStore) -> Vec<MsdCurve> {
        store
            .trajectories()
            .map(|t| MsdCurve::from_trajectory(t, self.max_lag, self.config.microns_per_pixel))
            .collect()
    }

    pub fn compute(&self, store: &TrajectoryStore) -> MsdReport {
        let curves = self.curves(store);
        let ensemble = match EnsembleMode::from_str(&self.config.ensemble_mode) {
            Ok(mode) => match mode.select(store, self.config) {
                Selection::Selected(subset) => {
                    let subset_curves = match subset {
                        Cow::Borrowed(_) => Cow::Borrowed(&curves),
                        Cow::Owned(s) => Cow::Owned(self.curves(&s)),
                    };
                    let curve = mode.reducer(self.config).reduce(&subset_curves, self.max_lag);
                    EnsembleOutcome::Computed(mode, curve)
                }
                Selection::Empty(reason) => EnsembleOutcome::Skipped(mode, reason),
            },
            Err(e) => EnsembleOutcome::Misconfigured(e.to_string()),
        };
        MsdReport { curves, ensemble }
    }

    /// Write `MSD` and the ensemble output of the configured mode.
    ///
    /// A skipped or misconfigured ensemble is logged; the per-particle table is written
    /// regardless.
    pub fn save(&self, report: &MsdReport, output_dir: &Path) -> Result<(), AnalysisError> {
        let table = report.table(self.config.frame_rate)?;
        if table.is_empty() {
            spdlog::warn!("No particle is long enough for a single MSD lag");
        }
        save_msd_table(&table, &output_dir.join(MSD_TABLE_NAME), self.config.render_plots)?;

        match &report.ensemble {
            EnsembleOutcome::Computed(mode, curve) => {
                save_msd_table(
                    &curve.to_table(self.config.frame_rate),
                    &output_dir.join(mode.output_name()),
                    self.config.render_plots,
                )?;
            }
            EnsembleOutcome::Skipped(mode, reason) => {
                spdlog::warn!("{reason}; skipping {}", mode.output_name());
            }
            EnsembleOutcome::Misconfigured(msg) => {
                spdlog::error!("Mean square displacement filter not correctly defined: {msg}");
            }
        }
        Ok(())
    }
}

/// Write an MSD table and its `.png` overlay next to it
pub fn save_msd_table(
    table: &ParticleTable,
    path: &Path,
    render_plots: bool,
) -> Result<(), AnalysisError> {
    table.write_csv(path)?;
    if render_plots && !table.is_empty() {
        let mut plot_path = path.as_os_str().to_owned();
        plot_path.push(".png");
        render_msd_table(Path::new(&plot_path), table)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::Observation;
    use approx::assert_relative_eq;

    fn line(particle: i64, frames: std::ops::Range<u64>, step: f64) -> Vec<Observation> {
        frames
            .map(|f| Observation::new(f, particle, f as f64 * step, 0.0, 1.0))
            .collect()
    }

    fn config(mode: &str) -> Config {
        Config {
            ensemble_mode: mode.to_string(),
            frame_rate: 1.0,
            microns_per_pixel: 1.0,
            max_lagtime: 5.0,
            frame_width: 100.0,
            frame_height: 100.0,
            render_plots: false,
            ..Config::default()
        }
    }

    #[test]
    fn test_lag_zero_is_zero() {
        let traj = Trajectory::new(0, line(0, 0..1, 1.0)).unwrap();
        let curve = MsdCurve::from_trajectory(&traj, 3, 0.5);
        assert_eq!(curve.msd_at(0), Some(0.0));
        assert!(!curve.has_displacement());
    }

    #[test]
    fn test_ballistic_msd() {
        // constant velocity: msd(k) = (k * step * mpp)^2
        let traj = Trajectory::new(0, line(0, 0..10, 2.0)).unwrap();
        let curve = MsdCurve::from_trajectory(&traj, 4, 0.5);
        for lag in 1..=4 {
            assert_relative_eq!(curve.msd_at(lag).unwrap(), (lag as f64).powi(2));
        }
        assert_eq!(curve.lag_sum(3).unwrap().pairs, 7);
    }

    #[test]
    fn test_huge_max_lagtime_is_bounded_by_trajectory() {
        let mut observations = line(0, 0..6, 1.0);
        observations.extend(line(1, 10..13, 2.0));
        let store = TrajectoryStore::from_observations(observations).unwrap();
        let conf = Config {
            max_lagtime: 1e12,
            ..config("emsd")
        };
        assert!(conf.validate().is_ok());
        let analyzer = MsdAnalyzer::new(&conf);
        let report = analyzer.compute(&store);

        let spans: Vec<u64> = report.curves.iter().map(|c| c.max_lag()).collect();
        assert_eq!(spans, vec![5, 2]);
        match &report.ensemble {
            EnsembleOutcome::Computed(_, curve) => {
                assert_eq!(curve.values.len(), 5);
                assert_relative_eq!(curve.msd_at(5).unwrap(), 25.0);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(report.table(conf.frame_rate).unwrap().n_rows(), 5);
    }

    #[test]
    fn test_gaps_do_not_shift_lags() {
        let traj = Trajectory::new(
            0,
            vec![
                Observation::new(0, 0, 0.0, 0.0, 1.0),
                Observation::new(2, 0, 2.0, 0.0, 1.0),
            ],
        )
        .unwrap();
        let curve = MsdCurve::from_trajectory(&traj, 3, 1.0);
        assert_eq!(curve.msd_at(1), None);
        assert_eq!(curve.msd_at(2), Some(4.0));
        assert_eq!(curve.reached_lag(), 2);
    }

    #[test]
    fn test_emsd_differs_from_mean() {
        // particle 0 has 10 observations with diffusive-looking jitter, particle 1 only 2
        let mut observations: Vec<Observation> = (0..10)
            .map(|f| Observation::new(f, 0, (f * f) as f64 * 0.1, 0.0, 1.0))
            .collect();
        observations.extend(line(1, 0..2, 5.0));
        let store = TrajectoryStore::from_observations(observations).unwrap();

        let conf = config("mean");
        let analyzer = MsdAnalyzer::new(&conf);
        let curves = analyzer.curves(&store);
        let mean = CurveMean::default().reduce(&curves, 5);
        let pooled = PooledDisplacement.reduce(&curves, 5);

        let m0 = curves[0].msd_at(1).unwrap();
        let m1 = curves[1].msd_at(1).unwrap();
        assert_relative_eq!(mean.msd_at(1).unwrap(), (m0 + m1) / 2.0);
        let expected_pooled = (m0 * 9.0 + m1) / 10.0;
        assert_relative_eq!(pooled.msd_at(1).unwrap(), expected_pooled);
        assert!((mean.msd_at(1).unwrap() - pooled.msd_at(1).unwrap()).abs() > 1e-6);

        // only particle 0 reaches lag 2; both reducers agree there
        assert_relative_eq!(mean.msd_at(2).unwrap(), curves[0].msd_at(2).unwrap());
        assert_relative_eq!(pooled.msd_at(2).unwrap(), curves[0].msd_at(2).unwrap());
    }

    #[test]
    fn test_complete_curves_only() {
        let mut observations = line(0, 0..6, 1.0);
        observations.extend(line(1, 0..2, 3.0));
        let store = TrajectoryStore::from_observations(observations).unwrap();
        let conf = config("mean");
        let curves = MsdAnalyzer::new(&conf).curves(&store);

        let all = CurveMean::default().reduce(&curves, 5);
        assert_relative_eq!(all.msd_at(1).unwrap(), 5.0);
        let complete = CurveMean {
            complete_curves_only: true,
        }
        .reduce(&curves, 5);
        assert_relative_eq!(complete.msd_at(1).unwrap(), 1.0);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(EnsembleMode::from_str("mean").unwrap(), EnsembleMode::Mean);
        assert_eq!(EnsembleMode::from_str("EMSD").unwrap(), EnsembleMode::Emsd);
        assert_eq!(EnsembleMode::from_str("ft").unwrap(), EnsembleMode::FullTrajectory);
        assert_eq!(EnsembleMode::from_str("frame").unwrap(), EnsembleMode::CenterFrame);
        assert!(matches!(
            EnsembleMode::from_str("median"),
            Err(ConfigError::UnknownEnsembleMode(_))
        ));
    }

    #[test]
    fn test_table_drops_particles_without_displacement() {
        let mut observations = line(0, 0..4, 1.0);
        observations.push(Observation::new(0, 9, 0.0, 0.0, 1.0));
        let store = TrajectoryStore::from_observations(observations).unwrap();
        let conf = config("mean");
        let report = MsdAnalyzer::new(&conf).compute(&store);
        let table = report.table(1.0).unwrap();
        assert_eq!(table.n_columns(), 1);
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.index(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_unknown_mode_still_writes_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrajectoryStore::from_observations(line(0, 0..4, 1.0)).unwrap();
        let conf = config("median");
        let analyzer = MsdAnalyzer::new(&conf);
        let report = analyzer.compute(&store);
        assert!(matches!(report.ensemble, EnsembleOutcome::Misconfigured(_)));
        analyzer.save(&report, dir.path()).unwrap();
        assert!(dir.path().join(MSD_TABLE_NAME).exists());
        assert!(!dir.path().join(MEAN_MSD_NAME).exists());
    }

    #[test]
    fn test_full_trajectory_mode() {
        let mut observations = line(0, 0..6, 1.0);
        observations.extend(line(1, 2..6, 3.0));
        let store = TrajectoryStore::from_observations(observations).unwrap();
        let conf = config("full_trajectory");
        let report = MsdAnalyzer::new(&conf).compute(&store);
        match report.ensemble {
            EnsembleOutcome::Computed(EnsembleMode::FullTrajectory, curve) => {
                assert_relative_eq!(curve.msd_at(1).unwrap(), 1.0);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        // the per-particle curves still cover every particle
        assert_eq!(report.curves.len(), 2);
    }

    #[test]
    fn test_center_frame_mode_skips() {
        // particle sits in the corner
        let store = TrajectoryStore::from_observations(line(0, 0..6, 1.0)).unwrap();
        let conf = config("center_frame");
        let dir = tempfile::tempdir().unwrap();
        let analyzer = MsdAnalyzer::new(&conf);
        let report = analyzer.compute(&store);
        assert_eq!(
            report.ensemble,
            EnsembleOutcome::Skipped(EnsembleMode::CenterFrame, EmptySelection::NoCenteredParticles)
        );
        analyzer.save(&report, dir.path()).unwrap();
        assert!(!dir.path().join(CENTER_FRAME_MSD_NAME).exists());
    }

    #[test]
    fn test_ensemble_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut observations = line(0, 0..8, 0.7);
        observations.extend(line(1, 0..3, 1.3));
        let store = TrajectoryStore::from_observations(observations).unwrap();
        let conf = Config {
            frame_rate: 36.4407,
            max_lagtime: 0.2,
            ..config("emsd")
        };
        let analyzer = MsdAnalyzer::new(&conf);
        let report = analyzer.compute(&store);
        analyzer.save(&report, dir.path()).unwrap();

        let table = ParticleTable::read_csv(&dir.path().join(MSD_TABLE_NAME)).unwrap();
        assert_eq!(table, report.table(conf.frame_rate).unwrap());
        let ensemble = ParticleTable::read_csv(&dir.path().join(EMSD_NAME)).unwrap();
        match &report.ensemble {
            EnsembleOutcome::Computed(_, curve) => {
                assert_eq!(ensemble, curve.to_table(conf.frame_rate))
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_mean_of_table() {
        let mut table = ParticleTable::new(LAG_INDEX_NAME, vec![0.5, 1.0, 1.5]);
        table.push_column("a", vec![Some(1.0), Some(2.0), None]).unwrap();
        table.push_column("b", vec![Some(3.0), None, None]).unwrap();
        let mean = mean_of_table(&table, false);
        assert_eq!(mean.index(), &[0.5, 1.0]);
        assert_eq!(mean.column(ENSEMBLE_COLUMN_NAME).unwrap().values, vec![Some(2.0), Some(2.0)]);
    }
}
