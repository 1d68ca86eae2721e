// Artifact names written into every sample directory
pub const TRAJECTORY_TABLE_NAME: &str = "t1";
pub const REMOVED_LIST_NAME: &str = "removed";
pub const SPEED_TABLE_NAME: &str = "speed";
pub const MSD_TABLE_NAME: &str = "MSD";
pub const PARTICLE_SPEED_PLOT_PREFIX: &str = "vd";
pub const TOTAL_SPEED_PLOT_NAME: &str = "vd_all.png";
pub const TRAJECTORY_PLOT_NAME: &str = "trajectories.png";
pub const NUMBERED_TRAJECTORY_PLOT_NAME: &str = "trajectories_numbered.png";
pub const MASS_HISTOGRAM_NAME: &str = "test_hist.png";

// Ensemble MSD outputs, one per mode
pub const MEAN_MSD_NAME: &str = "MSD_mean";
pub const EMSD_NAME: &str = "MSD_ensamble";
pub const FULL_TRAJECTORY_MSD_NAME: &str = "MSD_full_traj";
pub const CENTER_FRAME_MSD_NAME: &str = "MSD_Frame";

// Cross-sample outputs
pub const TOTAL_DIRECTORY_SUFFIX: &str = "_Total";
pub const COMBINED_MSD_TABLE_NAME: &str = "msd";

pub const TRAJECTORY_COLUMNS: [&str; 4] = ["frame", "particle", "x", "y"];
pub const DETECTION_COLUMNS: [&str; 3] = ["frame", "x", "y"];
pub const SPEED_INDEX_NAME: &str = "row";
pub const LAG_INDEX_NAME: &str = "lag time [s]";
pub const ENSEMBLE_COLUMN_NAME: &str = "msd";

/// Trajectories shorter than this are considered linking noise
pub const DEFAULT_MIN_TRAJECTORY_LENGTH: usize = 5;

/// The middle half of the frame counts as the center region
pub const CENTER_REGION_LOW: f64 = 0.25;
pub const CENTER_REGION_HIGH: f64 = 0.75;

/// Density curves extend this many bandwidths past the data
pub const DENSITY_CUT: f64 = 3.0;
pub const DENSITY_GRID_POINTS: usize = 200;
/// Used when the samples have no spread at all
pub const DEGENERATE_BANDWIDTH: f64 = 1.0;

pub const MASS_HISTOGRAM_BINS: usize = 20;
pub const PLOT_SIZE: (u32, u32) = (1200, 900);
