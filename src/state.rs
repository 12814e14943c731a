//! Application state management

use crate::constants::ui::LOG_CAPACITY;
use crate::events::MonitorEvent;
use chrono::{DateTime, Local};
use std::collections::VecDeque;

/// What the terminal UI knows about the monitor
pub struct AppState {
    pub device_name: String,
    pub clip_name: String,
    pub threshold_db: f64,
    pub interval_secs: f64,
    pub running: bool,
    pub last_reading: Option<f64>,
    pub log: VecDeque<String>,
}

impl AppState {
    /// Create a new application state with default values
    pub fn new(device_name: String, clip_name: String, threshold_db: f64, interval_secs: f64) -> Self {
        Self {
            device_name,
            clip_name,
            threshold_db,
            interval_secs,
            running: false,
            last_reading: None,
            log: VecDeque::with_capacity(LOG_CAPACITY),
        }
    }

    /// Append a timestamped line, dropping the oldest when full
    pub fn append_log(&mut self, at: DateTime<Local>, message: &str) {
        if self.log.len() == LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(format!("{}: {}", at.format("%H:%M:%S"), message));
    }

    /// Update state from a monitor event
    pub fn apply(&mut self, at: DateTime<Local>, event: &MonitorEvent) {
        if let MonitorEvent::Reading { decibel } = event {
            self.last_reading = Some(*decibel);
        }
        self.append_log(at, &event.describe());
    }

    pub fn status(&self) -> String {
        if self.running {
            "Monitoring. Press x to stop, Esc to quit.".to_string()
        } else {
            "Stopped. Press s to start, Esc to quit.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
    }

    fn state() -> AppState {
        AppState::new("mic".into(), "clip.mp3".into(), 50.0, 900.0)
    }

    #[test]
    fn events_become_timestamped_lines() {
        let mut state = state();
        state.apply(at(7, 5, 9), &MonitorEvent::Reading { decibel: 61.26 });
        state.apply(at(7, 5, 9), &MonitorEvent::status("Playback started"));
        assert_eq!(state.last_reading, Some(61.26));
        assert_eq!(
            state.log.iter().cloned().collect::<Vec<_>>(),
            vec![
                "07:05:09: Current level: 61.3 dB".to_string(),
                "07:05:09: Playback started".to_string()
            ]
        );
    }

    #[test]
    fn log_is_bounded() {
        let mut state = state();
        for i in 0..LOG_CAPACITY + 10 {
            state.append_log(at(12, 0, 0), &format!("line {}", i));
        }
        assert_eq!(state.log.len(), LOG_CAPACITY);
        assert_eq!(state.log.front().unwrap(), "12:00:00: line 10");
    }

    #[test]
    fn status_follows_running_flag() {
        let mut state = state();
        assert!(state.status().starts_with("Stopped"));
        state.running = true;
        assert!(state.status().starts_with("Monitoring"));
    }
}
