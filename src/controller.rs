//! Threshold state machine deciding when playback should run

use crate::constants::monitor::DEFAULT_THRESHOLD_DB;
use crate::loudness::LoudnessReading;

/// Threshold configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdConfig {
    /// Readings strictly above this start playback; readings at or below stop it
    pub decibel_threshold: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            decibel_threshold: DEFAULT_THRESHOLD_DB,
        }
    }
}

/// Playback intent recorded by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
}

/// What the driver should do after a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    StartPlayback,
    StopPlayback,
    NoOp,
}

/// Two-state controller with no hysteresis band.
///
/// A reading equal to the threshold counts as quiet, so a level sitting on
/// the boundary never starts playback but does stop it.
#[derive(Debug, Default)]
pub struct ThresholdController {
    state: PlaybackState,
}

impl ThresholdController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Decide on one reading, emitting at most one transition
    pub fn evaluate(&mut self, reading: LoudnessReading, config: &ThresholdConfig) -> Action {
        let loud = reading.decibel() > config.decibel_threshold;
        match (self.state, loud) {
            (PlaybackState::Idle, true) => {
                self.state = PlaybackState::Playing;
                Action::StartPlayback
            }
            (PlaybackState::Playing, false) => {
                self.state = PlaybackState::Idle;
                Action::StopPlayback
            }
            _ => Action::NoOp,
        }
    }

    /// Back to `Idle` for a fresh session
    pub fn reset(&mut self) {
        self.state = PlaybackState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(db: f64) -> LoudnessReading {
        LoudnessReading::new(db)
    }

    fn config(threshold: f64) -> ThresholdConfig {
        ThresholdConfig {
            decibel_threshold: threshold,
        }
    }

    #[test]
    fn starts_idle_with_default_threshold() {
        let controller = ThresholdController::new();
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert_eq!(ThresholdConfig::default().decibel_threshold, 50.0);
    }

    #[test]
    fn repeated_reading_is_noop_the_second_time() {
        let cfg = config(50.0);
        for db in [0.0, 30.0, 50.0, 50.1, 75.0, 120.0] {
            let mut controller = ThresholdController::new();
            controller.evaluate(reading(db), &cfg);
            assert_eq!(controller.evaluate(reading(db), &cfg), Action::NoOp, "reading {}", db);
        }
    }

    #[test]
    fn quiet_then_loud_starts() {
        let cfg = config(50.0);
        let mut controller = ThresholdController::new();
        assert_eq!(controller.evaluate(reading(40.0), &cfg), Action::NoOp);
        assert_eq!(controller.evaluate(reading(60.0), &cfg), Action::StartPlayback);
    }

    #[test]
    fn loud_then_quiet_starts_then_stops() {
        let cfg = config(50.0);
        let mut controller = ThresholdController::new();
        assert_eq!(controller.evaluate(reading(60.0), &cfg), Action::StartPlayback);
        assert_eq!(controller.evaluate(reading(40.0), &cfg), Action::StopPlayback);
    }

    #[test]
    fn threshold_value_counts_as_quiet() {
        let cfg = config(50.0);
        let mut controller = ThresholdController::new();
        assert_eq!(controller.evaluate(reading(50.0), &cfg), Action::NoOp);
        assert_eq!(controller.state(), PlaybackState::Idle);

        controller.evaluate(reading(70.0), &cfg);
        assert_eq!(controller.evaluate(reading(50.0), &cfg), Action::StopPlayback);
        assert_eq!(controller.state(), PlaybackState::Idle);
    }

    #[test]
    fn readings_sequence_visits_expected_states() {
        let cfg = config(50.0);
        let mut controller = ThresholdController::new();
        let mut actions = Vec::new();
        let mut states = Vec::new();
        for db in [10.0, 20.0, 60.0, 55.0, 40.0] {
            actions.push(controller.evaluate(reading(db), &cfg));
            states.push(controller.state());
        }
        assert_eq!(
            actions,
            vec![
                Action::NoOp,
                Action::NoOp,
                Action::StartPlayback,
                Action::NoOp,
                Action::StopPlayback
            ]
        );
        assert_eq!(
            states,
            vec![
                PlaybackState::Idle,
                PlaybackState::Idle,
                PlaybackState::Playing,
                PlaybackState::Playing,
                PlaybackState::Idle
            ]
        );
    }

    // Known limitation: without a hysteresis band a level straddling the
    // threshold toggles playback on every crossing.
    #[test]
    fn oscillating_around_threshold_toggles_every_crossing() {
        let cfg = config(50.0);
        let mut controller = ThresholdController::new();
        let actions: Vec<_> = [50.1, 50.0, 50.1, 50.0]
            .into_iter()
            .map(|db| controller.evaluate(reading(db), &cfg))
            .collect();
        assert_eq!(
            actions,
            vec![
                Action::StartPlayback,
                Action::StopPlayback,
                Action::StartPlayback,
                Action::StopPlayback
            ]
        );
    }

    #[test]
    fn reset_returns_to_idle() {
        let cfg = config(10.0);
        let mut controller = ThresholdController::new();
        controller.evaluate(reading(90.0), &cfg);
        assert_eq!(controller.state(), PlaybackState::Playing);
        controller.reset();
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert_eq!(controller.evaluate(reading(90.0), &cfg), Action::StartPlayback);
    }
}
