use plotters::drawing::DrawingAreaErrorKind;
use std::path::PathBuf;
use thiserror::Error;

use super::sample_status::SampleStatus;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config field {0} has an invalid value: {1}")]
    InvalidValue(&'static str, String),
    #[error("Unrecognized MSD ensemble mode {0:?}; expected one of mean, emsd, full_trajectory, center_frame")]
    UnknownEnsembleMode(String),
}

#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("TrajectoryStore failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("TrajectoryStore failed to parse CSV: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Trajectory table {1:?} is missing the required column {0:?}")]
    MissingColumn(String, PathBuf),
    #[error("Particle {0} has more than one observation at frame {1}")]
    DuplicateFrame(i64, u64),
    #[error("Observation of particle {0} was given to the trajectory of particle {1}")]
    MismatchedParticle(i64, i64),
    #[error("Observation of particle {0} at frame {1} has a non-finite position")]
    NonFinitePosition(i64, u64),
    #[error("Frame rate must be positive and finite, got {0}")]
    BadFrameRate(f64),
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("ParticleTable failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("ParticleTable failed to parse CSV: {0}")]
    CsvError(#[from] csv::Error),
    #[error("ParticleTable file {0:?} has no header row")]
    MissingHeader(PathBuf),
    #[error("ParticleTable could not parse value {value:?} in row {row}, column {column}")]
    BadValue {
        row: usize,
        column: usize,
        value: String,
    },
    #[error("ParticleTable column {label} has {given} rows; the table index has {expected}")]
    LengthMismatch {
        label: String,
        given: usize,
        expected: usize,
    },
}

#[derive(Debug, Error)]
pub enum LinkingError {
    #[error("Linking failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Linking failed to parse detection CSV: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Detection table {1:?} is missing the required column {0:?}")]
    MissingColumn(String, PathBuf),
    #[error("Linking failed to build trajectories: {0}")]
    TrajectoryError(#[from] TrajectoryError),
    #[error("Linking search range must be positive and finite, got {0}")]
    InvalidSearchRange(f64),
    #[error("No detections survived the minimum mass cut of {0}")]
    NoDetections(f64),
}

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("Plotting failed while drawing: {0}")]
    Drawing(String),
    #[error("Plotting failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

impl<E: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<E>> for PlotError {
    fn from(value: DrawingAreaErrorKind<E>) -> Self {
        Self::Drawing(value.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Analysis failed to persist a table: {0}")]
    TableError(#[from] TableError),
    #[error("Analysis failed to render a plot: {0}")]
    PlotError(#[from] PlotError),
    #[error("Analysis failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("Sample input file {0:?} does not exist")]
    MissingInput(PathBuf),
    #[error("Sample failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Sample failed due to trajectory error: {0}")]
    TrajectoryError(#[from] TrajectoryError),
    #[error("Sample failed due to detection/linking error: {0}")]
    LinkingError(#[from] LinkingError),
    #[error("Sample failed due to analysis error: {0}")]
    AnalysisError(#[from] AnalysisError),
    #[error("Sample failed due to table error: {0}")]
    TableError(#[from] TableError),
    #[error("Sample failed due to plotting error: {0}")]
    PlotError(#[from] PlotError),
    #[error("Sample failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<SampleStatus>),
}

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("Aggregator found no speed or MSD tables for samples starting with {0:?}")]
    NoSampleTables(String),
    #[error("Aggregator failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Aggregator failed due to table error: {0}")]
    TableError(#[from] TableError),
    #[error("Aggregator failed due to analysis error: {0}")]
    AnalysisError(#[from] AnalysisError),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor found no files starting with {1:?} in {0:?}")]
    NoInputFiles(PathBuf, String),
    #[error("Processor failed because all {0} samples failed")]
    AllSamplesFailed(usize),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<SampleStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
