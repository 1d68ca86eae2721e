//! # spt_analysis
//!
//! spt_analysis turns single particle tracking data into transport statistics. It takes
//! particle trajectories (or the raw detections of an external particle locator), and
//! computes per-particle speed distributions and mean squared displacement (MSD) curves,
//! an ensemble MSD per sample, and finally a combined data set across all samples of an
//! experiment.
//!
//! ## Installation
//!
//! Currently the only method of install is from source, which is laid out below.
//!
//! ### Rust
//!
//! If you have not used Rust before, you will most likely need to install the Rust tool
//! chain. See the [Rust docs](https://www.rust-lang.org/tools/install) for installation
//! instructions.
//!
//! ### Downloading
//!
//! To download spt_analysis clone the git repository using
//! `git clone https://github.com/ldhaan/spt_analysis.git`
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./spt_analysis_cli` from the
//! top level spt_analysis repository. The binary will be installed to your cargo install
//! location (typically something like `~/.cargo/bin/`).
//!
//! ## Input
//!
//! Every file in the input directory whose name starts with the configured prefix is one
//! sample. A sample file is a CSV table in one of two forms:
//!
//! - Linked trajectories, with at least the columns `frame, particle, x, y` (pixels).
//! Other columns are ignored.
//! - Detections, with the columns `frame, x, y, mass`, as exported by the particle
//! locator. Detections dimmer than `min_mass` are discarded and the rest are linked into
//! trajectories using a search range derived from the expected maximum speed.
//!
//! ## Configuration
//!
//! The YAML format of a configuration file is as follows:
//!
//! ```yml
//! input_path: None
//! output_path: None
//! filename_prefix: ''
//! frame_rate: 36.4407
//! microns_per_pixel: 0.463
//! frame_width: 2560.0
//! frame_height: 2160.0
//! expected_max_speed: 100.0
//! particle_diameter: 5
//! min_mass: 200.0
//! memory: 3
//! min_trajectory_length: 5
//! max_lagtime: 10.0
//! ensemble_mode: mean
//! complete_curves_only: false
//! remove_particles: []
//! render_plots: true
//! aggregate: true
//! ```
//!
//! - `frame_rate` is in frames per second, `expected_max_speed` in um/s and `max_lagtime`
//! in seconds.
//! - `ensemble_mode` selects the ensemble MSD: `mean` (average of the particle curves),
//! `emsd` (all displacements pooled), `full_trajectory` or `ft` (average over the
//! particles seen in the first and last frame), `center_frame` or `frame` (pooled over the
//! particles starting in the middle of the field of view). An unknown mode is reported
//! and only disables the ensemble output.
//! - `complete_curves_only` restricts the `mean` ensemble to particles whose curve reaches
//! the longest lag of the sample.
//! - `remove_particles` lists particle ids to leave out of the analysis of every sample.
//!
//! ## Output
//!
//! Each sample gets a directory named after its input file containing:
//!
//! ```text
//! t1                          - trajectories after the short trajectory cut
//! removed                     - the excluded particle ids
//! speed                       - speeds per particle (um/s)
//! vd<particle>.png, vd_all.png - speed distributions
//! MSD, MSD.png                - MSD per particle (um^2) against lag time (s)
//! MSD_mean | MSD_ensamble | MSD_full_traj | MSD_Frame (+ .png) - ensemble MSD
//! trajectories.png, trajectories_numbered.png
//! test_hist.png               - detection mass histogram (detection input only)
//! ```
//!
//! The samples completed in a run are combined into `<prefix>_Total` in the output
//! directory: `speed`, `vd_all.png`, `msd`, `msd.png`, `MSD_mean` and `MSD_mean.png`.
//! Tables are CSV files with the index in the first column and blank cells for missing
//! values.
//!
//! A log file (`spt_analysis.log`) is written to the working directory. If an error
//! occurs, the log file will contain the detailed status of the run and indicate the
//! issue that occurred.
pub mod aggregate;
pub mod config;
pub mod constants;
pub mod density;
pub mod error;
pub mod filters;
pub mod linking;
pub mod msd;
pub mod plot;
pub mod process;
pub mod sample_status;
pub mod table;
pub mod trajectory;
pub mod velocity;
