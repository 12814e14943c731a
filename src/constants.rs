//! Application constants and configuration values

/// Audio capture and loudness constants
pub mod audio {
    /// Capture sample rate in Hz
    pub const SAMPLE_RATE: u32 = 44_100;
    /// Capture channel count (mono)
    pub const CHANNELS: u16 = 1;
    /// Frames per measurement when the backend gives no recommendation
    pub const DEFAULT_MEASURE_FRAMES: usize = 4096;
    /// Capacity of the chunk queue between the audio callback and the sampler
    pub const CHUNK_QUEUE_CAPACITY: usize = 64;
    /// How long a single chunk read may wait before the buffer is cut short
    pub const READ_TIMEOUT_MS: u64 = 2000;
    /// Full-scale amplitude of signed 16-bit PCM
    pub const FULL_SCALE: f64 = 32767.0;
    /// Empirical offset that lifts the negative dBFS value into a 0-120 range.
    /// Not a physical SPL calibration.
    pub const DEFAULT_CALIBRATION_OFFSET_DB: f64 = 90.0;
}

/// Monitoring loop constants
pub mod monitor {
    /// Default loudness at or above which the clip should be playing
    pub const DEFAULT_THRESHOLD_DB: f64 = 50.0;
    /// Default sampling cadence in seconds (15 minutes)
    pub const DEFAULT_INTERVAL_SECS: f64 = 900.0;
    /// File name of the clip looked up in the download directory
    pub const DEFAULT_CLIP_NAME: &str = "early_riser.mp3";
}

/// UI display constants
pub mod ui {
    /// UI update interval in milliseconds
    pub const UPDATE_INTERVAL_MS: u64 = 50;
    /// Bar width calculation accounts for borders
    pub const BAR_BORDER_WIDTH: usize = 2;
    /// Top of the level gauge
    pub const GAUGE_MAX_DB: f64 = 120.0;
    /// Number of log lines kept for display
    pub const LOG_CAPACITY: usize = 500;
}
