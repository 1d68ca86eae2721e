use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use super::aggregate::{aggregate, AggregateSummary};
use super::config::{Config, SamplePaths};
use super::constants::{
    MASS_HISTOGRAM_NAME, NUMBERED_TRAJECTORY_PLOT_NAME, REMOVED_LIST_NAME,
    TRAJECTORY_PLOT_NAME, TRAJECTORY_TABLE_NAME,
};
use super::error::{AggregatorError, ProcessorError, SampleError};
use super::linking::{Detection, Linker, NearestNeighborLinker, SampleInput};
use super::msd::MsdAnalyzer;
use super::plot::{render_mass_histogram, render_trajectories};
use super::sample_status::{SampleStatus, Stage};
use super::trajectory::TrajectoryStore;
use super::velocity::VelocityReport;

/// What came out of one successfully processed sample
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSummary {
    pub name: String,
    pub output_dir: PathBuf,
    /// particles left after the short trajectory cut
    pub n_particles: usize,
    /// particles that went into the analysis
    pub n_analyzed: usize,
    pub n_speed_samples: usize,
}

/// Outcome of a whole run
#[derive(Debug, Default)]
pub struct ProcessReport {
    pub completed: Vec<SampleSummary>,
    pub failed: Vec<(String, SampleError)>,
    /// None when aggregation is disabled
    pub aggregate: Option<Result<AggregateSummary, AggregatorError>>,
}

impl ProcessReport {
    pub fn aggregate_failed(&self) -> bool {
        matches!(self.aggregate, Some(Err(_)))
    }
}

/// Render the mass histogram of the first frame's detections
fn save_detection_diagnostics(detections: &[Detection], output_dir: &Path) -> Result<(), SampleError> {
    let first_frame = match detections.iter().map(|d| d.frame).min() {
        Some(f) => f,
        None => return Ok(()),
    };
    let first: Vec<Detection> = detections
        .iter()
        .filter(|d| d.frame == first_frame)
        .copied()
        .collect();
    spdlog::info!("Found {} particles in frame {}", first.len(), first_frame);
    render_mass_histogram(&output_dir.join(MASS_HISTOGRAM_NAME), &first)?;
    Ok(())
}

/// Write the ids that were explicitly excluded, one per line, sorted
fn write_removed_list(path: &Path, particle_ids: &[i64]) -> Result<(), SampleError> {
    let mut ids = particle_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    let mut contents = String::from("particle\n");
    for id in ids {
        contents.push_str(&format!("{id}\n"));
    }
    std::fs::write(path, contents)?;
    Ok(())
}

/// The per-sample loop of spt_analysis.
///
/// Loads (and if needed links) the sample, applies the trajectory cuts and runs the
/// velocity and MSD analyses, writing every artifact into the sample's output directory.
pub fn process_sample(
    config: &Config,
    sample: &SamplePaths,
    linker: &dyn Linker,
    tx: &Sender<SampleStatus>,
    sample_index: usize,
    n_samples: usize,
) -> Result<SampleSummary, SampleError> {
    let progress = |fraction: f32| (sample_index as f32 + fraction) / n_samples as f32;

    if !sample.input.exists() {
        return Err(SampleError::MissingInput(sample.input.clone()));
    }
    std::fs::create_dir_all(&sample.output)?;
    tx.send(SampleStatus::new(
        progress(0.0),
        sample_index,
        &sample.name,
        Stage::Loading,
    ))?;
    spdlog::info!(
        "Input size: {}",
        human_bytes::human_bytes(std::fs::metadata(&sample.input)?.len() as f64)
    );

    let input = SampleInput::load(&sample.input, config)?;
    if let SampleInput::Detections(detections) = &input {
        spdlog::info!("Linking {} detections...", detections.len());
        if config.render_plots {
            save_detection_diagnostics(detections, &sample.output)?;
        }
    }
    let linked = input.into_trajectories(linker, config)?;

    let store = linked.filter_stubs(config.min_trajectory_length);
    spdlog::info!("Before: {} particles", linked.len());
    spdlog::info!("After: {} particles", store.len());
    if store.is_empty() {
        spdlog::warn!(
            "No trajectory has at least {} observations",
            config.min_trajectory_length
        );
    }
    store.write_csv(&sample.output.join(TRAJECTORY_TABLE_NAME))?;

    let analyzed: TrajectoryStore = if config.remove_particles.is_empty() {
        store.clone()
    } else {
        for id in config.remove_particles.iter() {
            if store.get(*id).is_none() {
                spdlog::warn!("Particle {id} was asked to be removed but does not exist");
            }
        }
        store.without_particles(&config.remove_particles)
    };
    write_removed_list(
        &sample.output.join(REMOVED_LIST_NAME),
        &config.remove_particles,
    )?;

    tx.send(SampleStatus::new(
        progress(0.25),
        sample_index,
        &sample.name,
        Stage::Velocity,
    ))?;
    let velocity = VelocityReport::compute(&analyzed, config.microns_per_pixel);
    velocity.save(&sample.output, config.expected_max_speed, config.render_plots)?;

    tx.send(SampleStatus::new(
        progress(0.5),
        sample_index,
        &sample.name,
        Stage::Msd,
    ))?;
    let analyzer = MsdAnalyzer::new(config);
    let msd = analyzer.compute(&analyzed);
    analyzer.save(&msd, &sample.output)?;

    if config.render_plots {
        tx.send(SampleStatus::new(
            progress(0.75),
            sample_index,
            &sample.name,
            Stage::Plotting,
        ))?;
        for (name, numbered) in [
            (TRAJECTORY_PLOT_NAME, false),
            (NUMBERED_TRAJECTORY_PLOT_NAME, true),
        ] {
            render_trajectories(
                &sample.output.join(name),
                &analyzed,
                config.frame_width,
                config.frame_height,
                numbered,
            )?;
        }
    }

    tx.send(SampleStatus::new(
        progress(1.0),
        sample_index,
        &sample.name,
        Stage::Finished,
    ))?;
    Ok(SampleSummary {
        name: sample.name.clone(),
        output_dir: sample.output.clone(),
        n_particles: store.len(),
        n_analyzed: analyzed.len(),
        n_speed_samples: velocity.ensemble.len(),
    })
}

/// The function to be called by a separate thread (typically the CLI).
///
/// Processes every sample in order. A failing sample is logged and recorded, the others
/// still run. After all samples the cross-sample aggregate is built from the samples that
/// completed in this run, if enabled.
pub fn process(config: Config, tx: Sender<SampleStatus>) -> Result<ProcessReport, ProcessorError> {
    config.validate()?;
    let samples = config.get_sample_paths()?;
    if samples.is_empty() {
        return Err(ProcessorError::NoInputFiles(
            config.input_path.clone(),
            config.filename_prefix.clone(),
        ));
    }
    std::fs::create_dir_all(&config.output_path)?;

    let linker = NearestNeighborLinker;
    let mut report = ProcessReport::default();
    for (idx, sample) in samples.iter().enumerate() {
        spdlog::info!("Processing sample {}...", sample.name);
        match process_sample(&config, sample, &linker, &tx, idx, samples.len()) {
            Ok(summary) => {
                spdlog::info!("Finished processing sample {}.", sample.name);
                report.completed.push(summary);
            }
            Err(SampleError::SendError(e)) => return Err(ProcessorError::SendError(e)),
            Err(e) => {
                spdlog::error!("Sample {} failed: {e}", sample.name);
                report.failed.push((sample.name.clone(), e));
            }
        }
    }
    if report.completed.is_empty() {
        return Err(ProcessorError::AllSamplesFailed(samples.len()));
    }

    if config.aggregate {
        tx.send(SampleStatus::new(
            1.0,
            samples.len(),
            &config.filename_prefix,
            Stage::Aggregating,
        ))?;
        let sample_dirs: Vec<PathBuf> = report
            .completed
            .iter()
            .map(|summary| summary.output_dir.clone())
            .collect();
        let result = aggregate(&config, &sample_dirs);
        match &result {
            Ok(summary) => spdlog::info!(
                "Combined {} samples into {}",
                summary.samples_used,
                summary.output_dir.display()
            ),
            Err(e) => spdlog::error!("Aggregation failed: {e}"),
        }
        report.aggregate = Some(result);
    }

    spdlog::info!(
        "Processed {} of {} samples.",
        report.completed.len(),
        samples.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{
        COMBINED_MSD_TABLE_NAME, MEAN_MSD_NAME, MSD_TABLE_NAME, SPEED_TABLE_NAME,
        TOTAL_SPEED_PLOT_NAME,
    };
    use crate::table::ParticleTable;
    use std::sync::mpsc::channel;

    fn linked_table() -> String {
        let mut contents = String::from("frame,particle,x,y\n");
        for frame in 0..8 {
            contents.push_str(&format!("{frame},0,{},100.0\n", 10.0 + frame as f64));
            contents.push_str(&format!("{frame},1,500.0,{}\n", 50.0 + 2.0 * frame as f64));
        }
        // a stub that the length cut drops
        contents.push_str("0,2,900.0,900.0\n1,2,901.0,900.0\n");
        contents
    }

    fn detection_table() -> String {
        let mut contents = String::from("frame,x,y,mass\n");
        for frame in 0..10 {
            let f = frame as f64;
            contents.push_str(&format!("{frame},{},200.0,500.0\n", 100.0 + f));
            contents.push_str(&format!("{frame},800.0,{},450.0\n", 300.0 - f));
            // too dim to be kept
            contents.push_str(&format!("{frame},1500.0,1500.0,20.0\n"));
        }
        contents
    }

    fn setup(files: &[(&str, String)]) -> (tempfile::TempDir, tempfile::TempDir, Config) {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            std::fs::write(input.path().join(name), contents).unwrap();
        }
        let config = Config {
            input_path: input.path().to_path_buf(),
            output_path: output.path().to_path_buf(),
            filename_prefix: String::from("cubes"),
            render_plots: false,
            ..Config::default()
        };
        (input, output, config)
    }

    fn sample_dir(config: &Config, name: &str) -> PathBuf {
        config.output_path.join(name)
    }

    #[test]
    fn test_process_isolates_failing_samples() {
        let (_input, _output, config) = setup(&[
            ("cubes_a.csv", linked_table()),
            ("cubes_b.csv", detection_table()),
            ("cubes_c.csv", String::from("foo,bar\n1,2\n")),
            ("spheres.csv", linked_table()),
        ]);
        let (tx, rx) = channel();
        let report = process(config.clone(), tx).unwrap();

        assert_eq!(report.completed.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "cubes_c.csv");
        assert!(matches!(report.failed[0].1, SampleError::LinkingError(_)));

        let linked = &report.completed[0];
        assert_eq!(linked.n_particles, 2);
        assert_eq!(linked.n_speed_samples, 14);
        let detected = &report.completed[1];
        assert_eq!(detected.n_particles, 2);

        for name in ["cubes_a.csv", "cubes_b.csv"] {
            let dir = sample_dir(&config, name);
            for artifact in [
                TRAJECTORY_TABLE_NAME,
                REMOVED_LIST_NAME,
                SPEED_TABLE_NAME,
                MSD_TABLE_NAME,
                MEAN_MSD_NAME,
            ] {
                assert!(dir.join(artifact).exists(), "{name} is missing {artifact}");
            }
        }
        assert!(!sample_dir(&config, "spheres.csv").exists());

        let total = config.get_total_directory();
        assert!(total.ends_with("cubes_Total"));
        assert!(total.join(SPEED_TABLE_NAME).exists());
        assert!(total.join(MEAN_MSD_NAME).exists());
        assert!(!report.aggregate_failed());

        let statuses: Vec<SampleStatus> = rx.try_iter().collect();
        assert!(statuses.iter().any(|s| s.stage == Stage::Aggregating));
        assert!(statuses.iter().all(|s| s.progress <= 1.0));
    }

    #[test]
    fn test_removed_particles_are_excluded() {
        let (_input, _output, mut config) = setup(&[("cubes_a.csv", linked_table())]);
        config.remove_particles = vec![1, 42];
        config.aggregate = false;
        let (tx, _rx) = channel();
        let report = process(config.clone(), tx).unwrap();
        assert!(report.aggregate.is_none());

        let summary = &report.completed[0];
        assert_eq!(summary.n_particles, 2);
        assert_eq!(summary.n_analyzed, 1);

        let dir = sample_dir(&config, "cubes_a.csv");
        let removed = std::fs::read_to_string(dir.join(REMOVED_LIST_NAME)).unwrap();
        assert_eq!(removed, "particle\n1\n42\n");
        // the trajectory table is written before the removal
        let t1 = TrajectoryStore::read_csv(&dir.join(TRAJECTORY_TABLE_NAME), config.frame_rate)
            .unwrap();
        assert_eq!(t1.particle_ids(), vec![0, 1]);
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let (_input, _output, config) = setup(&[("cubes_a.csv", linked_table())]);
        let (tx, _rx) = channel();
        process(config.clone(), tx.clone()).unwrap();
        let report = process(config, tx).unwrap();
        assert_eq!(report.completed.len(), 1);
    }

    #[test]
    fn test_process_renders_plots() {
        let (_input, _output, mut config) = setup(&[
            ("cubes_a.csv", linked_table()),
            ("cubes_b.csv", detection_table()),
        ]);
        config.render_plots = true;
        let (tx, _rx) = channel();
        let report = process(config.clone(), tx).unwrap();
        assert_eq!(report.completed.len(), 2);
        assert!(!report.aggregate_failed());

        let assert_plots = |dir: &Path, plots: &[String]| {
            for plot in plots {
                let path = dir.join(plot);
                assert!(path.exists(), "{dir:?} is missing {plot}");
                assert!(std::fs::metadata(&path).unwrap().len() > 0);
            }
        };
        let per_sample = [
            TOTAL_SPEED_PLOT_NAME.to_string(),
            format!("{MSD_TABLE_NAME}.png"),
            format!("{MEAN_MSD_NAME}.png"),
            TRAJECTORY_PLOT_NAME.to_string(),
            NUMBERED_TRAJECTORY_PLOT_NAME.to_string(),
        ];
        let linked = sample_dir(&config, "cubes_a.csv");
        assert_plots(&linked, &per_sample);
        assert_plots(&linked, &["vd0.png".to_string(), "vd1.png".to_string()]);
        // the mass histogram only exists for detection input
        assert!(!linked.join(MASS_HISTOGRAM_NAME).exists());

        let detected = sample_dir(&config, "cubes_b.csv");
        assert_plots(&detected, &per_sample);
        assert_plots(&detected, &[MASS_HISTOGRAM_NAME.to_string()]);

        assert_plots(
            &config.get_total_directory(),
            &[
                TOTAL_SPEED_PLOT_NAME.to_string(),
                format!("{COMBINED_MSD_TABLE_NAME}.png"),
                format!("{MEAN_MSD_NAME}.png"),
            ],
        );
    }

    #[test]
    fn test_aggregate_uses_only_this_runs_samples() {
        let (input, _output, config) = setup(&[
            ("cubes_a.csv", linked_table()),
            ("cubes_b.csv", linked_table()),
        ]);
        let (tx, _rx) = channel();
        let first = process(config.clone(), tx.clone()).unwrap();
        assert_eq!(first.aggregate.unwrap().unwrap().samples_used, 2);

        // cubes_b.csv leaves a stale output directory behind, and another prefix left
        // its own total directory in the same output path
        std::fs::remove_file(input.path().join("cubes_b.csv")).unwrap();
        let stray = config.output_path.join("cubes_a_Total");
        std::fs::create_dir_all(&stray).unwrap();
        std::fs::copy(
            sample_dir(&config, "cubes_a.csv").join(SPEED_TABLE_NAME),
            stray.join(SPEED_TABLE_NAME),
        )
        .unwrap();

        let second = process(config.clone(), tx).unwrap();
        let summary = second.aggregate.unwrap().unwrap();
        assert_eq!(summary.samples_used, 1);
        assert_eq!(summary.msd_columns, 2);
        let speed =
            ParticleTable::read_csv(&config.get_total_directory().join(SPEED_TABLE_NAME))
                .unwrap();
        assert_eq!(speed.n_columns(), 2);
    }

    #[test]
    fn test_no_input_files() {
        let (_input, _output, config) = setup(&[("spheres.csv", linked_table())]);
        let (tx, _rx) = channel();
        assert!(matches!(
            process(config, tx),
            Err(ProcessorError::NoInputFiles(_, _))
        ));
    }

    #[test]
    fn test_all_samples_failed() {
        let (_input, _output, config) = setup(&[(
            "cubes_dim.csv",
            String::from("frame,x,y,mass\n0,1.0,1.0,3.0\n"),
        )]);
        let (tx, _rx) = channel();
        assert!(matches!(
            process(config, tx),
            Err(ProcessorError::AllSamplesFailed(1))
        ));
    }

    #[test]
    fn test_invalid_config() {
        let (_input, _output, mut config) = setup(&[("cubes_a.csv", linked_table())]);
        config.frame_rate = 0.0;
        let (tx, _rx) = channel();
        assert!(matches!(
            process(config, tx),
            Err(ProcessorError::ConfigError(_))
        ));
    }
}
