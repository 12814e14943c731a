//! Microphone capture and on-demand loudness measurement

use crate::constants::audio::{
    CHANNELS, CHUNK_QUEUE_CAPACITY, DEFAULT_MEASURE_FRAMES, READ_TIMEOUT_MS, SAMPLE_RATE,
};
use crate::error::MonitorError;
use crate::loudness::{LoudnessMeter, LoudnessReading};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use log::{debug, error, info, warn};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc as std_mpsc};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;

/// Something that can be opened and asked for the current loudness
pub trait LoudnessSource: Send + 'static {
    /// Acquire the capture session. No-op when already open.
    fn open(&mut self) -> Result<(), MonitorError>;

    /// Read one buffer and turn it into a reading. Fails with
    /// `NotRecording` when no session is open.
    fn measure(&mut self) -> impl Future<Output = Result<LoudnessReading, MonitorError>> + Send;

    /// Release the session. Safe to call repeatedly.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Audio configuration and device information
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub device_name: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: cpal::SampleFormat,
    /// Samples per measurement
    pub buffer_frames: usize,
}

/// Find an input device by name, or the default one
pub fn find_input_device(device_name: Option<&str>) -> Result<cpal::Device, MonitorError> {
    let host = cpal::default_host();

    if let Some(name) = device_name {
        host.input_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| MonitorError::DeviceUnavailable(format!("Input device '{}' not found", name)))
    } else {
        host.default_input_device()
            .ok_or_else(|| MonitorError::DeviceUnavailable("No default input device available".to_string()))
    }
}

/// Names of all input devices on the default host
pub fn input_device_names() -> Result<Vec<String>, cpal::DevicesError> {
    let host = cpal::default_host();
    Ok(host.input_devices()?.filter_map(|d| d.name().ok()).collect())
}

/// Pick a capture format close to 44.1 kHz mono
pub fn setup_audio_device(device: &cpal::Device) -> Result<AudioConfig, MonitorError> {
    let device_name = device
        .name()
        .unwrap_or_else(|_| "Unknown input device".to_string());

    let mut ranges: Vec<_> = device.supported_input_configs()?.collect();
    if ranges.is_empty() {
        return Err(MonitorError::DeviceUnavailable(
            "No supported input configs found".to_string(),
        ));
    }

    // Prefer ranges that cover 44.1 kHz, then fewer channels, then native i16
    ranges.sort_by_key(|r| {
        let covers_rate =
            r.min_sample_rate().0 <= SAMPLE_RATE && r.max_sample_rate().0 >= SAMPLE_RATE;
        (
            !covers_rate,
            r.channels() != CHANNELS,
            r.sample_format() != cpal::SampleFormat::I16,
        )
    });
    let range = &ranges[0];

    let sample_rate = if range.min_sample_rate().0 <= SAMPLE_RATE
        && range.max_sample_rate().0 >= SAMPLE_RATE
    {
        SAMPLE_RATE
    } else {
        range.min_sample_rate().0
    };

    let buffer_frames = match range.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            DEFAULT_MEASURE_FRAMES.clamp(*min as usize, (*max as usize).max(*min as usize))
        }
        cpal::SupportedBufferSize::Unknown => DEFAULT_MEASURE_FRAMES,
    };

    Ok(AudioConfig {
        device_name,
        sample_rate,
        channels: range.channels(),
        sample_format: range.sample_format(),
        buffer_frames,
    })
}

/// Channel 0 of interleaved frames, converted to i16
fn first_channel<T>(data: &[T], channels: usize) -> Vec<i16>
where
    T: Sample,
    i16: FromSample<T>,
{
    data.chunks(channels.max(1))
        .map(|frame| frame[0].to_sample::<i16>())
        .collect()
}

/// Build an input stream that forwards channel 0 as i16 chunks
fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    chunks: mpsc::Sender<Vec<i16>>,
    failed: Arc<AtomicBool>,
) -> Result<cpal::Stream, MonitorError>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let channels = config.channels as usize;
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let chunk = first_channel(data, channels);
            // Nobody is reading between cycles; dropping is expected
            let _ = chunks.try_send(chunk);
        },
        move |err| {
            error!("Audio stream error: {}", err);
            failed.store(true, Ordering::SeqCst);
        },
        None,
    )?;
    Ok(stream)
}

fn open_stream(
    device: &cpal::Device,
    audio_config: &AudioConfig,
    chunks: mpsc::Sender<Vec<i16>>,
    failed: Arc<AtomicBool>,
) -> Result<cpal::Stream, MonitorError> {
    let config = cpal::StreamConfig {
        channels: audio_config.channels,
        sample_rate: cpal::SampleRate(audio_config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = match audio_config.sample_format {
        cpal::SampleFormat::I16 => build_input_stream::<i16>(device, &config, chunks, failed)?,
        cpal::SampleFormat::U16 => build_input_stream::<u16>(device, &config, chunks, failed)?,
        cpal::SampleFormat::F32 => build_input_stream::<f32>(device, &config, chunks, failed)?,
        cpal::SampleFormat::I32 => build_input_stream::<i32>(device, &config, chunks, failed)?,
        other => {
            return Err(MonitorError::DeviceUnavailable(format!(
                "Unsupported sample format {}",
                other
            )));
        }
    };
    stream.play()?;
    Ok(stream)
}

/// An open capture stream.
///
/// `cpal::Stream` is not `Send`, so it is owned by a dedicated thread that
/// keeps it alive until the session is dropped.
struct CaptureSession {
    chunks: mpsc::Receiver<Vec<i16>>,
    failed: Arc<AtomicBool>,
    buffer_frames: usize,
    shutdown: std_mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureSession {
    fn open(device_name: Option<String>) -> Result<(Self, AudioConfig), MonitorError> {
        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_QUEUE_CAPACITY);
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();
        let failed = Arc::new(AtomicBool::new(false));
        let stream_failed = Arc::clone(&failed);

        let thread = thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let opened = find_input_device(device_name.as_deref()).and_then(|device| {
                    let audio_config = setup_audio_device(&device)?;
                    let stream = open_stream(&device, &audio_config, chunk_tx, stream_failed)?;
                    Ok((stream, audio_config))
                });
                match opened {
                    Ok((stream, audio_config)) => {
                        let _ = ready_tx.send(Ok(audio_config));
                        // Blocks until the session is closed or dropped
                        let _ = shutdown_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| MonitorError::DeviceUnavailable(format!("Failed to spawn capture thread: {}", e)))?;

        let audio_config = match ready_rx.recv() {
            Ok(Ok(config)) => config,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(MonitorError::DeviceUnavailable(
                    "Capture thread exited during setup".to_string(),
                ));
            }
        };

        let session = CaptureSession {
            chunks: chunk_rx,
            failed,
            buffer_frames: audio_config.buffer_frames,
            shutdown: shutdown_tx,
            thread: Some(thread),
        };
        Ok((session, audio_config))
    }

    /// Collect one buffer of fresh samples.
    ///
    /// A stream error fails only the read that observes it.
    async fn read_buffer(&mut self) -> Result<Vec<i16>, MonitorError> {
        // Drop whatever piled up since the last cycle
        while self.chunks.try_recv().is_ok() {}

        let timeout = Duration::from_millis(READ_TIMEOUT_MS);
        let mut samples = Vec::with_capacity(self.buffer_frames);
        while samples.len() < self.buffer_frames {
            if self.failed.swap(false, Ordering::SeqCst) {
                return Err(MonitorError::ReadFailure("capture stream reported an error".to_string()));
            }
            match tokio::time::timeout(timeout, self.chunks.recv()).await {
                Ok(Some(chunk)) => samples.extend_from_slice(&chunk),
                Ok(None) => {
                    return Err(MonitorError::ReadFailure("capture stream ended".to_string()));
                }
                Err(_) => {
                    warn!(
                        "Audio read timed out with {} of {} samples",
                        samples.len(),
                        self.buffer_frames
                    );
                    break;
                }
            }
        }
        samples.truncate(self.buffer_frames);
        Ok(samples)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Loudness sampler backed by a cpal input stream
pub struct MicrophoneSampler {
    device_name: Option<String>,
    meter: LoudnessMeter,
    session: Option<CaptureSession>,
    /// Set after a failed read; the next measurement starts a fresh session
    reopen: bool,
}

impl MicrophoneSampler {
    pub fn new(device_name: Option<String>, meter: LoudnessMeter) -> Self {
        Self {
            device_name,
            meter,
            session: None,
            reopen: false,
        }
    }

    fn open_session(&mut self) -> Result<(), MonitorError> {
        let (session, audio_config) = CaptureSession::open(self.device_name.clone())?;
        info!(
            "Capturing from {} at {} Hz, {} channel(s), {} ({} samples per reading, offset {:+.1} dB)",
            audio_config.device_name,
            audio_config.sample_rate,
            audio_config.channels,
            audio_config.sample_format,
            audio_config.buffer_frames,
            self.meter.calibration_offset()
        );
        self.session = Some(session);
        self.reopen = false;
        Ok(())
    }
}

impl LoudnessSource for MicrophoneSampler {
    fn open(&mut self) -> Result<(), MonitorError> {
        if self.is_open() {
            return Ok(());
        }
        self.open_session()
    }

    async fn measure(&mut self) -> Result<LoudnessReading, MonitorError> {
        if self.reopen {
            info!("Reopening capture session after a stream failure");
            // The old stream has to let go of the device first
            self.session = None;
            self.open_session()?;
        }
        let session = self.session.as_mut().ok_or(MonitorError::NotRecording)?;
        let samples = match session.read_buffer().await {
            Ok(samples) => samples,
            Err(e) => {
                self.reopen = true;
                return Err(e);
            }
        };
        let reading = self.meter.reading(&samples);
        debug!("Measured {} over {} samples", reading, samples.len());
        Ok(reading)
    }

    fn close(&mut self) {
        self.reopen = false;
        if self.session.take().is_some() {
            debug!("Capture session closed");
        }
    }

    fn is_open(&self) -> bool {
        self.session.is_some() || self.reopen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn measure_without_session_is_not_recording() {
        let mut sampler = MicrophoneSampler::new(None, LoudnessMeter::default());
        assert!(!sampler.is_open());
        assert_eq!(sampler.measure().await, Err(MonitorError::NotRecording));
    }

    #[test]
    fn close_is_idempotent() {
        let mut sampler = MicrophoneSampler::new(None, LoudnessMeter::default());
        sampler.close();
        sampler.close();
        assert!(!sampler.is_open());
    }

    /// A session fed by the test instead of a capture thread
    fn fed_session(buffer_frames: usize) -> (CaptureSession, mpsc::Sender<Vec<i16>>) {
        let (chunk_tx, chunk_rx) = mpsc::channel(8);
        let (shutdown, _) = std_mpsc::channel();
        let session = CaptureSession {
            chunks: chunk_rx,
            failed: Arc::new(AtomicBool::new(false)),
            buffer_frames,
            shutdown,
            thread: None,
        };
        (session, chunk_tx)
    }

    fn send_after(chunks: &mpsc::Sender<Vec<i16>>, delay: Duration, chunk: Vec<i16>) {
        let chunks = chunks.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = chunks.send(chunk).await;
        });
    }

    fn sampler_with(session: CaptureSession) -> MicrophoneSampler {
        let mut sampler = MicrophoneSampler::new(None, LoudnessMeter::default());
        sampler.session = Some(session);
        sampler
    }

    #[test]
    fn keeps_channel_zero_of_each_frame() {
        let stereo: [i16; 6] = [100, -1, 200, -2, 300, -3];
        assert_eq!(first_channel(&stereo, 2), vec![100, 200, 300]);
        assert_eq!(first_channel(&stereo, 1), stereo.to_vec());

        let float: [f32; 6] = [0.9, 0.0, 0.0, 0.9, -0.9, 0.0];
        let converted = first_channel(&float, 2);
        assert_eq!(converted.len(), 3);
        assert!(converted[0] > 29_000);
        assert_eq!(converted[1], 0);
        assert!(converted[2] < -29_000);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_chunks_are_dropped_before_reading() {
        let (mut session, chunks) = fed_session(4);
        chunks.send(vec![9000; 4]).await.unwrap();
        send_after(&chunks, Duration::from_millis(10), vec![1, 2, 3, 4]);

        assert_eq!(session.read_buffer().await, Ok(vec![1, 2, 3, 4]));
    }

    #[tokio::test(start_paused = true)]
    async fn buffer_is_cut_to_the_configured_size() {
        let (mut session, chunks) = fed_session(4);
        send_after(&chunks, Duration::from_millis(10), vec![1, 2, 3]);
        send_after(&chunks, Duration::from_millis(20), vec![4, 5, 6]);

        assert_eq!(session.read_buffer().await, Ok(vec![1, 2, 3, 4]));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_keeps_the_samples_that_arrived() {
        let (mut session, chunks) = fed_session(4096);
        send_after(&chunks, Duration::from_millis(10), vec![500, -500, 500]);

        assert_eq!(session.read_buffer().await, Ok(vec![500, -500, 500]));
    }

    #[tokio::test(start_paused = true)]
    async fn partial_buffer_is_measured_over_what_arrived() {
        let (session, chunks) = fed_session(4096);
        send_after(&chunks, Duration::from_millis(10), vec![i16::MAX; 16]);
        let mut sampler = sampler_with(session);

        let reading = sampler.measure().await.unwrap();
        assert!((reading.decibel() - 90.0).abs() < 0.01, "{}", reading);
    }

    #[tokio::test(start_paused = true)]
    async fn no_samples_before_timeout_is_a_zero_reading() {
        let (session, _chunks) = fed_session(4096);
        let mut sampler = sampler_with(session);

        assert_eq!(sampler.measure().await, Ok(LoudnessReading::new(0.0)));
        assert!(sampler.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn ended_stream_is_a_read_failure() {
        let (mut session, chunks) = fed_session(4);
        drop(chunks);

        assert!(matches!(session.read_buffer().await, Err(MonitorError::ReadFailure(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stream_error_fails_only_the_next_read() {
        let (mut session, chunks) = fed_session(4);
        session.failed.store(true, Ordering::SeqCst);

        assert!(matches!(session.read_buffer().await, Err(MonitorError::ReadFailure(_))));

        send_after(&chunks, Duration::from_millis(10), vec![7; 4]);
        assert_eq!(session.read_buffer().await, Ok(vec![7; 4]));
    }

    #[tokio::test(start_paused = true)]
    async fn close_after_a_failed_read_stops_recording() {
        let (session, _chunks) = fed_session(4);
        session.failed.store(true, Ordering::SeqCst);
        let mut sampler = sampler_with(session);

        assert!(matches!(sampler.measure().await, Err(MonitorError::ReadFailure(_))));
        assert!(sampler.is_open());

        sampler.close();
        assert!(!sampler.is_open());
        assert_eq!(sampler.measure().await, Err(MonitorError::NotRecording));
    }
}
