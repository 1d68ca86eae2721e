use clap::{Arg, Command};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use libspt_analysis::config::Config;
use libspt_analysis::error::{ConfigError, ProcessorError};
use libspt_analysis::process::{process, ProcessReport};
use libspt_analysis::sample_status::SampleStatus;

const EXIT_CONFIG: u8 = 1;
const EXIT_NO_INPUT: u8 = 2;
const EXIT_SAMPLES_FAILED: u8 = 3;
const EXIT_AGGREGATION: u8 = 4;

fn make_template_config(path: &Path) -> Result<(), ConfigError> {
    Config::default().write_config_file(path)
}

/// Log to the terminal and to a log file in the working directory
fn setup_logging() -> Result<(), spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from("./spt_analysis.log"))
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sinks(spdlog::default_logger().sinks().to_owned())
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

fn exit_code(result: &Result<ProcessReport, ProcessorError>) -> u8 {
    match result {
        Ok(report) if report.aggregate_failed() => EXIT_AGGREGATION,
        Ok(_) => 0,
        Err(ProcessorError::NoInputFiles(_, _)) => EXIT_NO_INPUT,
        Err(ProcessorError::AllSamplesFailed(_)) => EXIT_SAMPLES_FAILED,
        Err(_) => EXIT_CONFIG,
    }
}

fn main() -> ExitCode {
    // Create a cli
    let matches = Command::new("spt_analysis_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .help("Path to the configuration file"),
        )
        .get_matches();

    // Initialize feedback
    if let Err(e) = setup_logging() {
        eprintln!("Could not create the log file, logging to the terminal only: {e}");
    }

    // Parse the cli
    let config_path = match matches.get_one::<String>("path") {
        Some(p) => PathBuf::from(p),
        None => {
            spdlog::error!("A configuration path is required (-p/--path)");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if let Some(("new", _)) = matches.subcommand() {
        spdlog::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        return match make_template_config(&config_path) {
            Ok(()) => {
                spdlog::info!("Done.");
                ExitCode::SUCCESS
            }
            Err(e) => {
                spdlog::error!("{e}");
                ExitCode::from(EXIT_CONFIG)
            }
        };
    }

    // Load our config
    spdlog::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            spdlog::error!("{e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    spdlog::info!("Config successfully loaded.");
    spdlog::info!("Input Path: {}", config.input_path.to_string_lossy());
    spdlog::info!("Output Path: {}", config.output_path.to_string_lossy());
    spdlog::info!("Filename Prefix: {}", config.filename_prefix);
    spdlog::info!(
        "Frame Rate: {} fps Calibration: {} um/px",
        config.frame_rate,
        config.microns_per_pixel
    );
    spdlog::info!("Ensemble Mode: {}", config.ensemble_mode);

    // Setup the progress bar
    let pb = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}") {
        pb.set_style(style);
    }
    let (tx, rx) = std::sync::mpsc::channel::<SampleStatus>();
    // Spawn the task!
    let handle = std::thread::spawn(move || process(config, tx));

    // The channel closes once the worker is done
    for status in rx.iter() {
        pb.set_position((status.progress * 100.0) as u64);
        pb.set_message(format!("{} - {}", status.sample_name, status.stage));
    }
    pb.finish();

    let result = match handle.join() {
        Ok(result) => result,
        Err(_) => {
            spdlog::error!("Failed to join processing task!");
            return ExitCode::FAILURE;
        }
    };
    match &result {
        Ok(report) => {
            for (name, e) in report.failed.iter() {
                spdlog::warn!("Sample {name} failed: {e}");
            }
            if report.aggregate_failed() {
                spdlog::error!("Aggregation failed, per-sample results were kept. Check the log file.");
            } else {
                spdlog::info!(
                    "Successfully analyzed {} samples!",
                    report.completed.len()
                );
            }
        }
        Err(e) => spdlog::error!("Analysis failed with error: {e}"),
    }

    spdlog::info!("Done.");
    ExitCode::from(exit_code(&result))
}
