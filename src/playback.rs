//! Looping clip playback

use crate::error::MonitorError;
use log::{debug, info, warn};
use rodio::{Decoder, OutputStream, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

/// Start/stop control over a player. Calls are non-blocking.
pub trait Actuator: Send + 'static {
    fn start(&mut self) -> Result<(), MonitorError>;
    fn stop(&mut self) -> Result<(), MonitorError>;
    fn is_playing(&self) -> bool;
    /// Whether `start()` can make anything audible
    fn has_clip(&self) -> bool;
    /// Stop and free the output device
    fn release(&mut self);
}

/// An output device holding a paused, endlessly repeating clip.
///
/// `OutputStream` is not `Send`; it lives on its own thread until released.
struct OutputSession {
    sink: Sink,
    shutdown: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl OutputSession {
    fn open(clip: PathBuf) -> Result<Self, MonitorError> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name("clip-output".to_string())
            .spawn(move || {
                let opened = (|| -> Result<(OutputStream, Sink), MonitorError> {
                    let (stream, handle) = OutputStream::try_default()?;
                    let sink = Sink::try_new(&handle)?;
                    let file = File::open(&clip).map_err(|e| {
                        MonitorError::ActuatorFailure(format!("Failed to open {}: {}", clip.display(), e))
                    })?;
                    let source = Decoder::new(BufReader::new(file))?;
                    sink.pause();
                    sink.append(source.repeat_infinite());
                    Ok((stream, sink))
                })();
                match opened {
                    Ok((stream, sink)) => {
                        let _ = ready_tx.send(Ok(sink));
                        let _ = shutdown_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| MonitorError::ActuatorFailure(format!("Failed to spawn output thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(sink)) => Ok(OutputSession {
                sink,
                shutdown: shutdown_tx,
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(MonitorError::ActuatorFailure("Output thread exited during setup".to_string()))
            }
        }
    }
}

impl Drop for OutputSession {
    fn drop(&mut self) {
        self.sink.stop();
        let _ = self.shutdown.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Plays an audio file on loop through the default output device.
///
/// Without a usable clip every operation is a no-op.
pub struct ClipPlayer {
    clip: Option<PathBuf>,
    output: Option<OutputSession>,
}

impl ClipPlayer {
    pub fn new(clip: Option<PathBuf>) -> Self {
        let clip = clip.filter(|path| {
            let exists = path.exists();
            if !exists {
                warn!("Clip {} not found, playback disabled", path.display());
            }
            exists
        });
        Self { clip, output: None }
    }

    pub fn clip(&self) -> Option<&Path> {
        self.clip.as_deref()
    }
}

impl Actuator for ClipPlayer {
    fn start(&mut self) -> Result<(), MonitorError> {
        let Some(clip) = &self.clip else {
            debug!("No clip configured, ignoring start");
            return Ok(());
        };
        if self.output.is_none() {
            self.output = Some(OutputSession::open(clip.clone())?);
            info!("Loaded clip {}", clip.display());
        }
        if let Some(output) = &self.output {
            output.sink.play();
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), MonitorError> {
        if let Some(output) = &self.output {
            output.sink.pause();
        }
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.output
            .as_ref()
            .is_some_and(|output| !output.sink.is_paused() && !output.sink.empty())
    }

    fn has_clip(&self) -> bool {
        self.clip.is_some()
    }

    fn release(&mut self) {
        if self.output.take().is_some() {
            debug!("Output device released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_clip_disables_playback() {
        let mut player = ClipPlayer::new(Some(PathBuf::from("/nonexistent/quietwatch/clip.mp3")));
        assert!(player.clip().is_none());
        assert!(!player.has_clip());
        assert!(player.start().is_ok());
        assert!(!player.is_playing());
        assert!(player.stop().is_ok());
        player.release();
    }

    #[test]
    fn no_clip_is_a_silent_noop() {
        let mut player = ClipPlayer::new(None);
        assert!(player.start().is_ok());
        assert!(!player.is_playing());
        player.release();
        player.release();
    }
}
