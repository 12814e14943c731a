//! Custom error types for the application

use std::fmt;

/// Failures of the monitoring core.
///
/// None of these escape a running monitor loop; the driver reports them as
/// status events and keeps going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// Microphone access was not authorized
    PermissionDenied(String),
    /// The capture session could not be opened
    DeviceUnavailable(String),
    /// A single measurement failed
    ReadFailure(String),
    /// Starting or stopping playback failed
    ActuatorFailure(String),
    /// `measure()` was called without an open session
    NotRecording,
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::PermissionDenied(msg) => write!(f, "Microphone permission denied: {}", msg),
            MonitorError::DeviceUnavailable(msg) => write!(f, "Audio device unavailable: {}", msg),
            MonitorError::ReadFailure(msg) => write!(f, "Failed to read audio: {}", msg),
            MonitorError::ActuatorFailure(msg) => write!(f, "Playback error: {}", msg),
            MonitorError::NotRecording => write!(f, "No capture session is open"),
        }
    }
}

impl std::error::Error for MonitorError {}

fn mentions_denial(description: &str) -> bool {
    let lower = description.to_lowercase();
    lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
}

fn from_backend(err: cpal::BackendSpecificError) -> MonitorError {
    if mentions_denial(&err.description) {
        MonitorError::PermissionDenied(err.description)
    } else {
        MonitorError::DeviceUnavailable(err.description)
    }
}

impl From<cpal::DevicesError> for MonitorError {
    fn from(err: cpal::DevicesError) -> Self {
        match err {
            cpal::DevicesError::BackendSpecific { err } => from_backend(err),
        }
    }
}

impl From<cpal::SupportedStreamConfigsError> for MonitorError {
    fn from(err: cpal::SupportedStreamConfigsError) -> Self {
        match err {
            cpal::SupportedStreamConfigsError::BackendSpecific { err } => from_backend(err),
            other => MonitorError::DeviceUnavailable(other.to_string()),
        }
    }
}

impl From<cpal::BuildStreamError> for MonitorError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::BackendSpecific { err } => from_backend(err),
            other => MonitorError::DeviceUnavailable(format!("Failed to build audio stream: {}", other)),
        }
    }
}

impl From<cpal::PlayStreamError> for MonitorError {
    fn from(err: cpal::PlayStreamError) -> Self {
        match err {
            cpal::PlayStreamError::BackendSpecific { err } => from_backend(err),
            other => MonitorError::DeviceUnavailable(format!("Failed to start audio stream: {}", other)),
        }
    }
}

impl From<rodio::StreamError> for MonitorError {
    fn from(err: rodio::StreamError) -> Self {
        MonitorError::ActuatorFailure(format!("Failed to open output device: {}", err))
    }
}

impl From<rodio::PlayError> for MonitorError {
    fn from(err: rodio::PlayError) -> Self {
        MonitorError::ActuatorFailure(format!("Failed to create player: {}", err))
    }
}

impl From<rodio::decoder::DecoderError> for MonitorError {
    fn from(err: rodio::decoder::DecoderError) -> Self {
        MonitorError::ActuatorFailure(format!("Failed to decode clip: {}", err))
    }
}

/// Application-specific error type
#[derive(Debug)]
pub enum AppError {
    /// Invalid command line configuration
    Config(String),
    /// Audio device related errors
    AudioDevice(String),
    /// Errors from the monitoring core
    Monitor(MonitorError),
    /// General I/O errors
    Io(std::io::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::AudioDevice(msg) => write!(f, "Audio device error: {}", msg),
            AppError::Monitor(err) => write!(f, "{}", err),
            AppError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err)
    }
}

impl From<MonitorError> for AppError {
    fn from(err: MonitorError) -> Self {
        AppError::Monitor(err)
    }
}

impl From<cpal::DevicesError> for AppError {
    fn from(err: cpal::DevicesError) -> Self {
        AppError::AudioDevice(format!("Failed to enumerate devices: {}", err))
    }
}

impl From<dialoguer::Error> for AppError {
    fn from(err: dialoguer::Error) -> Self {
        AppError::Io(std::io::Error::other(err))
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
