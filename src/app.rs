//! Main application logic and orchestration

use crate::audio::{LoudnessSource, MicrophoneSampler};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::events::{EventSink, LogSink, MonitorEvent};
use crate::keep_alive::keep_alive;
use crate::loudness::{LoudnessMeter, LoudnessReading};
use crate::monitor::Monitor;
use crate::playback::{Actuator, ClipPlayer};
use crate::state::AppState;
use crate::ui;
use chrono::Local;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::{info, warn};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio::sync::{Mutex, watch};

/// Main application struct
pub struct App {
    config: Config,
    terminal: Terminal<CrosstermBackend<std::io::Stdout>>,
}

/// Exit codes for the application
#[derive(Debug, Clone, Copy)]
pub enum ExitCode {
    Success = 0,
    UserExit = 1, // User pressed Escape or Ctrl+C
    Error = 2,    // Actual application error
}

/// Extended result that tracks exit reason
pub struct RunResult {
    pub result: AppResult<()>,
    pub exit_code: ExitCode,
}

/// What a key press asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Stop,
    Quit,
}

fn command_for(code: KeyCode, modifiers: KeyModifiers) -> Option<Command> {
    match code {
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Some(Command::Quit),
        KeyCode::Esc | KeyCode::Char('q') => Some(Command::Quit),
        KeyCode::Char('s') => Some(Command::Start),
        KeyCode::Char('x') => Some(Command::Stop),
        _ => None,
    }
}

fn build_parts(config: &Config) -> (MicrophoneSampler, ClipPlayer) {
    let sampler = MicrophoneSampler::new(
        config.device_name.clone(),
        LoudnessMeter::new(config.calibration_offset),
    );
    let player = ClipPlayer::new(config.audio_clip_path.clone());
    (sampler, player)
}

async fn start_monitoring<S, A, E>(monitor: &mut Monitor<S, A, E>, state: &mut AppState)
where
    S: LoudnessSource,
    A: Actuator,
    E: EventSink,
{
    if monitor.is_running() {
        return;
    }
    // Failures already reach the log through the monitor's status event
    if monitor.start().await.is_ok() {
        state.running = true;
        state.append_log(Local::now(), "Monitoring started");
    }
}

async fn stop_monitoring<S, A, E>(monitor: &mut Monitor<S, A, E>, state: &mut AppState)
where
    S: LoudnessSource,
    A: Actuator,
    E: EventSink,
{
    let was_running = monitor.is_running();
    monitor.stop().await;
    state.running = false;
    if was_running {
        state.append_log(Local::now(), "Monitoring stopped");
    }
}

fn drain_events(events: &mut UnboundedReceiver<MonitorEvent>, state: &mut AppState) {
    while let Ok(event) = events.try_recv() {
        state.apply(Local::now(), &event);
    }
}

impl App {
    /// Initialize the application with configuration
    pub fn new_with_config(config: Config) -> AppResult<Self> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(App { config, terminal })
    }

    /// Run the terminal UI until the user quits
    pub async fn run(mut self) -> RunResult {
        let (sampler, player) = build_parts(&self.config);
        let clip_name = player
            .clip()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "none".to_string());
        let (tx, mut events) = unbounded_channel();
        let mut monitor = Monitor::new(self.config.monitor.clone(), sampler, player, tx);

        let mut app_state = AppState::new(
            self.config
                .device_name
                .clone()
                .unwrap_or_else(|| "Default input".to_string()),
            clip_name,
            monitor.config().threshold.decibel_threshold,
            monitor.config().sampling_interval.as_secs_f64(),
        );

        start_monitoring(&mut monitor, &mut app_state).await;

        let mut interval =
            tokio::time::interval(Duration::from_millis(crate::constants::ui::UPDATE_INTERVAL_MS));
        let mut result = Ok(());
        let mut exit_reason = ExitCode::UserExit;

        loop {
            drain_events(&mut events, &mut app_state);

            if let Err(e) = self.terminal.draw(|f| ui::render_ui(f, &app_state)) {
                result = Err(AppError::from(e));
                exit_reason = ExitCode::Error;
                break;
            }

            let mut command = None;

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    command = Some(Command::Quit);
                }
                _ = interval.tick() => {}
            }

            // Check for keyboard events
            if command.is_none()
                && crossterm::event::poll(Duration::from_millis(0)).unwrap_or(false)
                && let Ok(Event::Key(key_event)) = crossterm::event::read()
            {
                command = command_for(key_event.code, key_event.modifiers);
            }

            match command {
                Some(Command::Start) => start_monitoring(&mut monitor, &mut app_state).await,
                Some(Command::Stop) => stop_monitoring(&mut monitor, &mut app_state).await,
                Some(Command::Quit) => break,
                None => {}
            }
        }

        monitor.stop().await;
        if let Err(e) = self.cleanup() {
            warn!("Failed to restore terminal: {}", e);
        }

        RunResult {
            result,
            exit_code: exit_reason,
        }
    }

    /// Clean up terminal state
    fn cleanup(mut self) -> AppResult<()> {
        disable_raw_mode()?;
        execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

/// Run without a terminal UI until Ctrl+C, logging every event
pub async fn run_headless(config: Config) -> AppResult<()> {
    let (sampler, player) = build_parts(&config);
    let monitor = Arc::new(Mutex::new(Monitor::new(
        config.monitor.clone(),
        sampler,
        player,
        LogSink,
    )));

    if let Err(e) = monitor.lock().await.start().await {
        // Without a supervisor nobody would try again
        if config.keep_alive.is_none() {
            return Err(e.into());
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let supervisor = config
        .keep_alive
        .map(|period| tokio::spawn(keep_alive(Arc::clone(&monitor), period, shutdown_rx)));

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, shutting down");

    let _ = shutdown_tx.send(true);
    if let Some(handle) = supervisor {
        let _ = handle.await;
    }
    monitor.lock().await.stop().await;
    Ok(())
}

/// Open the microphone, take one reading and close it again
pub async fn measure_once(device_name: Option<String>, calibration_offset: f64) -> AppResult<LoudnessReading> {
    let mut sampler = MicrophoneSampler::new(device_name, LoudnessMeter::new(calibration_offset));
    sampler.open()?;
    let reading = sampler.measure().await;
    sampler.close();
    Ok(reading?)
}
