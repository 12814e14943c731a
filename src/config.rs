//! Configuration parsing and validation

use crate::constants::audio::DEFAULT_CALIBRATION_OFFSET_DB;
use crate::constants::monitor::{DEFAULT_CLIP_NAME, DEFAULT_INTERVAL_SECS, DEFAULT_THRESHOLD_DB};
use crate::controller::ThresholdConfig;
use crate::error::{AppError, AppResult};
use crate::monitor::MonitorConfig;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

/// Command line arguments for the quietwatch application
#[derive(Parser)]
#[command(name = "quietwatch")]
#[command(author, version, about = "Ambient noise monitor that plays a clip while it is loud")]
pub struct Args {
    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sample the microphone periodically and loop a clip while it is loud
    Monitor(MonitorArgs),
    /// Take a single loudness reading and print it
    Measure(MeasureArgs),
    /// Pick an audio input device interactively
    List(ListArgs),
}

#[derive(Parser)]
pub struct MonitorArgs {
    /// Loudness above which the clip plays
    #[arg(long, default_value_t = DEFAULT_THRESHOLD_DB)]
    pub threshold: f64,

    /// Seconds between the starts of two measurements
    #[arg(long, default_value_t = DEFAULT_INTERVAL_SECS)]
    pub interval: f64,

    /// Audio file to loop (defaults to early_riser.mp3 in the download directory)
    #[arg(long, conflicts_with = "no_clip")]
    pub clip: Option<PathBuf>,

    /// Monitor without any playback
    #[arg(long)]
    pub no_clip: bool,

    /// Audio input device name (optional, uses default if not specified)
    #[arg(long)]
    pub device: Option<String>,

    /// Offset added to the dBFS level to get a readable 0-120 scale
    #[arg(long, default_value_t = DEFAULT_CALIBRATION_OFFSET_DB, allow_negative_numbers = true)]
    pub calibration_offset: f64,

    /// Run without the terminal UI, logging events instead
    #[arg(long)]
    pub headless: bool,

    /// In headless mode, retry starting the monitor every SECONDS while it is down
    #[arg(long, requires = "headless")]
    pub keep_alive: Option<f64>,

    /// Write logs to this file (the terminal UI otherwise suppresses them)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Parser)]
pub struct MeasureArgs {
    /// Audio input device name (optional, uses default if not specified)
    #[arg(long)]
    pub device: Option<String>,

    /// Offset added to the dBFS level to get a readable 0-120 scale
    #[arg(long, default_value_t = DEFAULT_CALIBRATION_OFFSET_DB, allow_negative_numbers = true)]
    pub calibration_offset: f64,

    /// Output only the integer value without labels
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Parser)]
pub struct ListArgs {}

impl Args {
    /// Get the log level filter based on verbosity flags
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else {
            match self.verbose {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }
}

/// Where log output goes
pub enum LogTarget {
    Stderr,
    File(PathBuf),
    Off,
}

/// Initialize the logging system
pub fn init_logging(level: LevelFilter, target: LogTarget) -> AppResult<()> {
    let mut builder = env_logger::Builder::new();

    match target {
        LogTarget::Stderr => {
            // Dependencies stay at warn, our own modules follow the flags
            builder.filter_level(LevelFilter::Warn);
            builder.filter_module("quietwatch", level);
        }
        LogTarget::File(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            builder.filter_level(LevelFilter::Warn);
            builder.filter_module("quietwatch", level);
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        LogTarget::Off => {
            builder.filter_level(LevelFilter::Off);
        }
    }

    builder.format_timestamp_millis().init();
    Ok(())
}

/// Monitoring configuration derived from command line arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub audio_clip_path: Option<PathBuf>,
    pub device_name: Option<String>,
    pub calibration_offset: f64,
    pub headless: bool,
    pub keep_alive: Option<Duration>,
    pub log_file: Option<PathBuf>,
}

fn seconds(value: f64, what: &str) -> AppResult<Duration> {
    if !value.is_finite() || value <= 0.0 {
        return Err(AppError::Config(format!("{} must be a positive number of seconds, got {}", what, value)));
    }
    let duration = Duration::try_from_secs_f64(value).map_err(|e| AppError::Config(format!("{}: {}", what, e)))?;
    if duration.is_zero() {
        return Err(AppError::Config(format!("{} of {} seconds rounds down to zero", what, value)));
    }
    Ok(duration)
}

pub fn validate_offset(offset: f64) -> AppResult<f64> {
    if !offset.is_finite() {
        return Err(AppError::Config(format!("Calibration offset must be finite, got {}", offset)));
    }
    Ok(offset)
}

/// `early_riser.mp3` in the user's download directory
pub fn default_clip_path() -> Option<PathBuf> {
    dirs::download_dir().map(|dir| dir.join(DEFAULT_CLIP_NAME))
}

impl Config {
    /// Create configuration from monitor arguments
    pub fn from_monitor_args(args: MonitorArgs) -> AppResult<Self> {
        if !args.threshold.is_finite() || args.threshold < 0.0 {
            return Err(AppError::Config(format!(
                "Threshold must be a non-negative number of dB, got {}",
                args.threshold
            )));
        }

        let sampling_interval = seconds(args.interval, "Interval")?;
        let keep_alive = args.keep_alive.map(|s| seconds(s, "Keep-alive period")).transpose()?;
        let calibration_offset = validate_offset(args.calibration_offset)?;

        let audio_clip_path = if args.no_clip {
            None
        } else {
            args.clip.or_else(default_clip_path)
        };

        Ok(Config {
            monitor: MonitorConfig {
                threshold: ThresholdConfig {
                    decibel_threshold: args.threshold,
                },
                sampling_interval,
            },
            audio_clip_path,
            device_name: args.device,
            calibration_offset,
            headless: args.headless,
            keep_alive,
            log_file: args.log_file,
        })
    }
}
