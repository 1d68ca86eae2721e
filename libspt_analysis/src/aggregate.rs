use std::path::{Path, PathBuf};

use super::config::Config;
use super::constants::{
    COMBINED_MSD_TABLE_NAME, MEAN_MSD_NAME, MSD_TABLE_NAME, SPEED_TABLE_NAME,
};
use super::error::AggregatorError;
use super::msd::{mean_of_table, save_msd_table};
use super::table::ParticleTable;
use super::velocity::save_ensemble_distribution;

/// What the aggregator combined
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSummary {
    pub output_dir: PathBuf,
    pub samples_used: usize,
    pub speed_columns: usize,
    pub msd_columns: usize,
}

/// Read one table of a sample, None (with a warning) if the sample does not have it
fn read_sample_table(
    sample_dir: &Path,
    name: &str,
) -> Result<Option<ParticleTable>, AggregatorError> {
    let path = sample_dir.join(name);
    if !path.exists() {
        spdlog::warn!("Sample {sample_dir:?} has no {name} table; skipping it");
        return Ok(None);
    }
    Ok(Some(ParticleTable::read_csv(&path)?))
}

/// Combine the `speed` and `MSD` tables of the given sample output directories into the
/// cross-sample directory.
///
/// Only the listed directories are read, so leftovers of earlier runs and the output of
/// other prefixes in the same output path never leak into the aggregate. Tables are
/// concatenated column-wise with rows aligned by index value. The combined speeds are
/// pooled into one distribution and the combined MSD columns are averaged.
pub fn aggregate(
    config: &Config,
    sample_dirs: &[PathBuf],
) -> Result<AggregateSummary, AggregatorError> {
    let mut speed_tables = Vec::new();
    let mut msd_tables = Vec::new();
    let mut samples_used = 0;
    for dir in sample_dirs.iter() {
        let speed = read_sample_table(dir, SPEED_TABLE_NAME)?;
        let msd = read_sample_table(dir, MSD_TABLE_NAME)?;
        if speed.is_some() || msd.is_some() {
            samples_used += 1;
        }
        speed_tables.extend(speed);
        msd_tables.extend(msd);
    }
    if samples_used == 0 {
        return Err(AggregatorError::NoSampleTables(
            config.filename_prefix.clone(),
        ));
    }

    let output_dir = config.get_total_directory();
    std::fs::create_dir_all(&output_dir)?;
    spdlog::info!(
        "Combining {} samples into {}",
        samples_used,
        output_dir.display()
    );

    let speed = ParticleTable::hconcat(&speed_tables);
    speed.write_csv(&output_dir.join(SPEED_TABLE_NAME))?;
    if config.render_plots {
        save_ensemble_distribution(
            &output_dir,
            &speed.flatten_values(),
            config.expected_max_speed,
        )?;
    }

    let msd = ParticleTable::hconcat(&msd_tables);
    save_msd_table(
        &msd,
        &output_dir.join(COMBINED_MSD_TABLE_NAME),
        config.render_plots,
    )?;
    let mean = mean_of_table(&msd, config.complete_curves_only);
    save_msd_table(
        &mean,
        &output_dir.join(MEAN_MSD_NAME),
        config.render_plots,
    )?;

    Ok(AggregateSummary {
        output_dir,
        samples_used,
        speed_columns: speed.n_columns(),
        msd_columns: msd.n_columns(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{
        ENSEMBLE_COLUMN_NAME, LAG_INDEX_NAME, SPEED_INDEX_NAME, TOTAL_SPEED_PLOT_NAME,
    };

    fn config(output: &Path) -> Config {
        Config {
            output_path: output.to_path_buf(),
            filename_prefix: String::from("cubes"),
            render_plots: false,
            ..Config::default()
        }
    }

    fn write_sample(
        root: &Path,
        name: &str,
        speeds: Vec<(String, Vec<f64>)>,
        msd: &ParticleTable,
    ) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        ParticleTable::from_ragged(SPEED_INDEX_NAME, speeds)
            .write_csv(&dir.join(SPEED_TABLE_NAME))
            .unwrap();
        msd.write_csv(&dir.join(MSD_TABLE_NAME)).unwrap();
        dir
    }

    fn single_lag_msd(value: f64) -> ParticleTable {
        ParticleTable::from_series(LAG_INDEX_NAME, "0", &[(0.5, value)])
    }

    #[test]
    fn test_aggregate_ragged_samples() {
        let dir = tempfile::tempdir().unwrap();

        let msd_a = ParticleTable::from_columns(
            LAG_INDEX_NAME,
            vec![0.5, 1.0, 1.5],
            vec![
                ("0".to_string(), vec![Some(1.0), Some(2.0), Some(3.0)]),
                ("1".to_string(), vec![Some(3.0), None, None]),
            ],
        )
        .unwrap();
        let a = write_sample(
            dir.path(),
            "cubes_a.csv",
            vec![
                ("0".to_string(), vec![1.0, 2.0, 3.0]),
                ("1".to_string(), vec![4.0]),
            ],
            &msd_a,
        );
        let b = write_sample(
            dir.path(),
            "cubes_b.csv",
            vec![("0".to_string(), vec![10.0])],
            &single_lag_msd(5.0),
        );
        // not in the sample list, must be ignored
        write_sample(dir.path(), "spheres.csv", vec![], &single_lag_msd(7.0));

        let conf = config(dir.path());
        let summary = aggregate(&conf, &[a, b]).unwrap();
        assert_eq!(summary.samples_used, 2);
        assert_eq!(summary.speed_columns, 3);
        assert_eq!(summary.msd_columns, 3);

        let total = conf.get_total_directory();
        let speed = ParticleTable::read_csv(&total.join(SPEED_TABLE_NAME)).unwrap();
        assert_eq!(speed.n_rows(), 3);
        let mut values = speed.flatten_values();
        values.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 10.0]);

        let msd = ParticleTable::read_csv(&total.join(COMBINED_MSD_TABLE_NAME)).unwrap();
        assert_eq!(msd.index(), &[0.5, 1.0, 1.5]);
        assert_eq!(msd.columns()[2].values, vec![Some(5.0), None, None]);

        let mean = ParticleTable::read_csv(&total.join(MEAN_MSD_NAME)).unwrap();
        assert_eq!(
            mean.column(ENSEMBLE_COLUMN_NAME).unwrap().values,
            vec![Some(3.0), Some(2.0), Some(3.0)]
        );
        // plots are off
        assert!(!total.join(TOTAL_SPEED_PLOT_NAME).exists());
    }

    #[test]
    fn test_other_prefix_totals_and_stale_samples_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_sample(
            dir.path(),
            "cubes_a.csv",
            vec![("0".to_string(), vec![1.0])],
            &single_lag_msd(1.0),
        );
        // left over from a run on an input that no longer exists
        write_sample(
            dir.path(),
            "cubes_old.csv",
            vec![("0".to_string(), vec![9.0])],
            &single_lag_msd(9.0),
        );

        // a run with the longer prefix leaves cubes_a_Total behind
        let narrow = Config {
            filename_prefix: String::from("cubes_a"),
            ..config(dir.path())
        };
        assert_eq!(aggregate(&narrow, &[a.clone()]).unwrap().samples_used, 1);
        assert!(dir.path().join("cubes_a_Total").join(SPEED_TABLE_NAME).exists());

        let conf = config(dir.path());
        let summary = aggregate(&conf, &[a.clone()]).unwrap();
        assert_eq!(summary.samples_used, 1);
        assert_eq!(summary.msd_columns, 1);
        // running again with the total directory in place changes nothing
        assert_eq!(aggregate(&conf, &[a]).unwrap(), summary);

        let speed =
            ParticleTable::read_csv(&conf.get_total_directory().join(SPEED_TABLE_NAME)).unwrap();
        assert_eq!(speed.flatten_values(), vec![1.0]);
    }

    #[test]
    fn test_aggregate_renders_plots() {
        let dir = tempfile::tempdir().unwrap();
        let msd = ParticleTable::from_columns(
            LAG_INDEX_NAME,
            vec![0.5, 1.0],
            vec![
                ("0".to_string(), vec![Some(1.0), Some(2.0)]),
                ("1".to_string(), vec![Some(1.5), None]),
            ],
        )
        .unwrap();
        let a = write_sample(
            dir.path(),
            "cubes_a.csv",
            vec![
                ("0".to_string(), vec![1.0, 2.5, 3.0]),
                ("1".to_string(), vec![4.0, 2.0]),
            ],
            &msd,
        );
        let conf = Config {
            render_plots: true,
            ..config(dir.path())
        };
        aggregate(&conf, &[a]).unwrap();

        let total = conf.get_total_directory();
        for plot in [
            TOTAL_SPEED_PLOT_NAME.to_string(),
            format!("{COMBINED_MSD_TABLE_NAME}.png"),
            format!("{MEAN_MSD_NAME}.png"),
        ] {
            let path = total.join(&plot);
            assert!(path.exists(), "missing {plot}");
            assert!(std::fs::metadata(&path).unwrap().len() > 0);
        }
    }

    #[test]
    fn test_no_tables() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("cubes_empty");
        std::fs::create_dir_all(&empty).unwrap();
        let result = aggregate(&config(dir.path()), &[empty]);
        assert!(matches!(result, Err(AggregatorError::NoSampleTables(_))));
        assert!(matches!(
            aggregate(&config(dir.path()), &[]),
            Err(AggregatorError::NoSampleTables(_))
        ));
    }
}
