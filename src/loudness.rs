//! Loudness estimation from 16-bit PCM buffers

use crate::constants::audio::{DEFAULT_CALIBRATION_OFFSET_DB, FULL_SCALE};
use std::fmt;

/// A single decibel-equivalent loudness value, never negative.
///
/// This is a relative level derived from dBFS, not a calibrated sound
/// pressure level.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct LoudnessReading(f64);

impl LoudnessReading {
    /// Wrap a raw value, flooring it at zero. NaN becomes zero.
    pub fn new(decibel: f64) -> Self {
        Self(decibel.max(0.0))
    }

    pub fn decibel(self) -> f64 {
        self.0
    }
}

impl fmt::Display for LoudnessReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} dB", self.0)
    }
}

/// Root-mean-square amplitude of a buffer; zero for an empty buffer
pub fn rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&s| {
            let s = s as f64;
            s * s
        })
        .sum();
    (sum / samples.len() as f64).sqrt()
}

/// Convert an RMS amplitude to decibels relative to 16-bit full scale.
/// Yields negative infinity for silence.
pub fn rms_to_dbfs(rms: f64) -> f64 {
    20.0 * (rms / FULL_SCALE).log10()
}

/// Turns PCM buffers into readings using a calibration offset
#[derive(Debug, Clone, Copy)]
pub struct LoudnessMeter {
    calibration_offset: f64,
}

impl LoudnessMeter {
    pub fn new(calibration_offset: f64) -> Self {
        Self { calibration_offset }
    }

    pub fn calibration_offset(&self) -> f64 {
        self.calibration_offset
    }

    /// `max(0, 20 * log10(rms / 32767) + offset)`
    pub fn reading(&self, samples: &[i16]) -> LoudnessReading {
        if samples.is_empty() {
            return LoudnessReading::default();
        }
        LoudnessReading::new(rms_to_dbfs(rms(samples)) + self.calibration_offset)
    }
}

impl Default for LoudnessMeter {
    fn default() -> Self {
        Self::new(DEFAULT_CALIBRATION_OFFSET_DB)
    }
}
