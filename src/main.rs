mod app;
mod audio;
mod config;
mod constants;
mod controller;
mod error;
mod events;
mod keep_alive;
mod loudness;
mod monitor;
mod playback;
mod state;
mod ui;

use clap::Parser;
use dialoguer::{Select, theme::ColorfulTheme};
use log::LevelFilter;

fn list_devices() -> error::AppResult<()> {
    let device_list = audio::input_device_names()?;

    if device_list.is_empty() {
        println!("No audio input devices found.");
        return Ok(());
    }

    // Interactive selection
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select an audio input device")
        .items(&device_list)
        .default(0)
        .interact()?;

    println!("{}", device_list[selection]);

    Ok(())
}

#[tokio::main]
async fn main() {
    use app::ExitCode;
    use config::{Args, Commands, LogTarget};

    let args = Args::parse();
    let level = args.log_level();

    match args.command {
        Commands::Monitor(monitor_args) => {
            let config = match config::Config::from_monitor_args(monitor_args) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(ExitCode::Error as i32);
                }
            };

            let target = match (&config.log_file, config.headless) {
                (Some(path), _) => LogTarget::File(path.clone()),
                (None, true) => LogTarget::Stderr,
                (None, false) => LogTarget::Off,
            };
            // Headless runs report every event at info level
            let level = if config.headless && !args.quiet {
                level.max(LevelFilter::Info)
            } else {
                level
            };
            if let Err(e) = config::init_logging(level, target) {
                eprintln!("Failed to open log file: {}", e);
                std::process::exit(ExitCode::Error as i32);
            }

            if config.headless {
                if let Err(e) = app::run_headless(config).await {
                    eprintln!("Application error: {}", e);
                    std::process::exit(ExitCode::Error as i32);
                }
                std::process::exit(ExitCode::Success as i32);
            }

            match app::App::new_with_config(config) {
                Ok(app) => {
                    let run_result = app.run().await;
                    match run_result.result {
                        Ok(_) => {
                            std::process::exit(run_result.exit_code as i32);
                        }
                        Err(e) => {
                            eprintln!("Application error: {}", e);
                            std::process::exit(ExitCode::Error as i32);
                        }
                    }
                }
                Err(e) => {
                    eprintln!("Setup error: {}", e);
                    std::process::exit(ExitCode::Error as i32);
                }
            }
        }
        Commands::Measure(measure_args) => {
            let _ = config::init_logging(level, LogTarget::Stderr);
            let offset = match config::validate_offset(measure_args.calibration_offset) {
                Ok(offset) => offset,
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(ExitCode::Error as i32);
                }
            };

            match app::measure_once(measure_args.device, offset).await {
                Ok(reading) => {
                    if measure_args.quiet {
                        println!("{}", reading.decibel().round() as i32);
                    } else {
                        println!("Current level: {}", reading);
                    }
                }
                Err(e) => {
                    eprintln!("Error during measurement: {}", e);
                    std::process::exit(ExitCode::Error as i32);
                }
            }
        }
        Commands::List(_) => {
            let _ = config::init_logging(level, LogTarget::Stderr);
            if let Err(e) = list_devices() {
                eprintln!("Error listing devices: {}", e);
                std::process::exit(ExitCode::Error as i32);
            }
        }
    }
}
