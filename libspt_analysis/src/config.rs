use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::constants::{DEFAULT_MIN_TRAJECTORY_LENGTH, TOTAL_DIRECTORY_SUFFIX};
use super::error::ConfigError;

/// Structure representing the analysis configuration. Contains pathing, the physical
/// calibration of the microscope, and the tracking/analysis parameters.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub filename_prefix: String,
    /// frames per second
    pub frame_rate: f64,
    pub microns_per_pixel: f64,
    /// sensor size in pixels
    pub frame_width: f64,
    pub frame_height: f64,
    /// microns per second; bounds the linking search range and the plot axes
    pub expected_max_speed: f64,
    /// pixels, must be odd
    pub particle_diameter: u32,
    pub min_mass: f64,
    /// frames a particle may vanish and still keep its identity
    pub memory: u64,
    pub min_trajectory_length: usize,
    /// seconds
    pub max_lagtime: f64,
    pub ensemble_mode: String,
    pub complete_curves_only: bool,
    pub remove_particles: Vec<i64>,
    pub render_plots: bool,
    pub aggregate: bool,
}

impl Default for Config {
    /// Generate a new Config object. Paths will be empty/invalid, the calibration is that
    /// of the Andor camera setup the pipeline was first used with
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("None"),
            output_path: PathBuf::from("None"),
            filename_prefix: String::from(""),
            frame_rate: 36.4407,
            microns_per_pixel: 0.4630,
            frame_width: 2560.0,
            frame_height: 2160.0,
            expected_max_speed: 100.0,
            particle_diameter: 5,
            min_mass: 200.0,
            memory: 3,
            min_trajectory_length: DEFAULT_MIN_TRAJECTORY_LENGTH,
            max_lagtime: 10.0,
            ensemble_mode: String::from("mean"),
            complete_curves_only: false,
            remove_particles: vec![],
            render_plots: true,
            aggregate: true,
        }
    }
}

/// Where a sample is read from and where its artifacts go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePaths {
    pub name: String,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    /// Check the physical constants and tracking parameters.
    ///
    /// The ensemble mode is deliberately not checked here; an unknown mode only disables
    /// the ensemble MSD output.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("frame_rate", self.frame_rate),
            ("microns_per_pixel", self.microns_per_pixel),
            ("frame_width", self.frame_width),
            ("frame_height", self.frame_height),
            ("expected_max_speed", self.expected_max_speed),
            ("max_lagtime", self.max_lagtime),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidValue(
                    field,
                    format!("{value} is not a positive number"),
                ));
            }
        }
        if self.particle_diameter % 2 == 0 {
            return Err(ConfigError::InvalidValue(
                "particle_diameter",
                format!("{} is not an odd number", self.particle_diameter),
            ));
        }
        if !self.min_mass.is_finite() {
            return Err(ConfigError::InvalidValue(
                "min_mass",
                format!("{} is not finite", self.min_mass),
            ));
        }
        Ok(())
    }

    /// Find every input file whose name starts with the prefix, sorted by name.
    ///
    /// Each sample gets an output directory named after its input file.
    pub fn get_sample_paths(&self) -> Result<Vec<SamplePaths>, ConfigError> {
        if !self.input_path.exists() {
            return Err(ConfigError::BadFilePath(self.input_path.clone()));
        }
        let mut samples = Vec::new();
        for item in self.input_path.read_dir()? {
            let item_path = item?.path();
            if !item_path.is_file() {
                continue;
            }
            let name = match item_path.file_name() {
                Some(n) => n.to_string_lossy().to_string(),
                None => continue,
            };
            if name.starts_with(&self.filename_prefix) {
                samples.push(SamplePaths {
                    output: self.output_path.join(&name),
                    input: item_path,
                    name,
                });
            }
        }
        samples.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(samples)
    }

    /// Get the path to the cross-sample output directory
    pub fn get_total_directory(&self) -> PathBuf {
        self.output_path
            .join(format!("{}{}", self.filename_prefix, TOTAL_DIRECTORY_SUFFIX))
    }

    /// Seconds between two frames
    pub fn frame_interval(&self) -> f64 {
        1.0 / self.frame_rate
    }

    /// Largest displacement (pixels per frame) a particle may make and still be linked
    pub fn search_range(&self) -> f64 {
        self.expected_max_speed / self.microns_per_pixel * self.frame_interval()
    }

    /// The maximum MSD lag expressed in frames (truncated)
    pub fn max_lag_frames(&self) -> u64 {
        (self.max_lagtime * self.frame_rate) as u64
    }
}
