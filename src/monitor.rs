//! Periodic driver tying the sampler, the threshold controller and the player together

use crate::audio::LoudnessSource;
use crate::controller::{Action, PlaybackState, ThresholdConfig, ThresholdController};
use crate::error::MonitorError;
use crate::events::{EventSink, MonitorEvent};
use crate::playback::Actuator;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Runtime settings of a monitor session
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub threshold: ThresholdConfig,
    /// Time between the starts of consecutive cycles
    pub sampling_interval: Duration,
}

/// Everything a single cycle touches. Only one cycle holds it at a time.
struct Cycle<S, A, E> {
    sampler: S,
    controller: ThresholdController,
    actuator: A,
    sink: E,
    threshold: ThresholdConfig,
}

impl<S: LoudnessSource, A: Actuator, E: EventSink> Cycle<S, A, E> {
    /// Measure, evaluate, act, notify. Failures end the cycle, not the loop.
    async fn run(&mut self) {
        let reading = match self.sampler.measure().await {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Measurement failed: {}", e);
                self.sink.notify(MonitorEvent::status(e.to_string()));
                return;
            }
        };
        self.sink.notify(MonitorEvent::Reading {
            decibel: reading.decibel(),
        });

        match self.controller.evaluate(reading, &self.threshold) {
            Action::StartPlayback => {
                info!("{} is above {:.1} dB, starting playback", reading, self.threshold.decibel_threshold);
                let message = match self.actuator.start() {
                    Ok(()) if !self.actuator.has_clip() => "Loud, but no clip to play".to_string(),
                    Ok(()) => "Playback started".to_string(),
                    Err(e) => {
                        error!("{}", e);
                        e.to_string()
                    }
                };
                self.sink.notify(MonitorEvent::status(message));
            }
            Action::StopPlayback => {
                info!("{} is at or below {:.1} dB, stopping playback", reading, self.threshold.decibel_threshold);
                let message = match self.actuator.stop() {
                    Ok(()) => "Playback stopped".to_string(),
                    Err(e) => {
                        error!("{}", e);
                        e.to_string()
                    }
                };
                self.sink.notify(MonitorEvent::status(message));
            }
            Action::NoOp => {}
        }
    }

    fn teardown(&mut self) {
        if self.sampler.is_open() {
            self.sampler.close();
        }
        if self.actuator.is_playing()
            && let Err(e) = self.actuator.stop()
        {
            warn!("Failed to stop playback during shutdown: {}", e);
        }
        self.actuator.release();
        self.controller.reset();
    }
}

async fn run_loop<S, A, E>(
    cycle: Arc<Mutex<Cycle<S, A, E>>>,
    running: Arc<AtomicBool>,
    period: Duration,
    mut shutdown: oneshot::Receiver<()>,
) where
    S: LoudnessSource,
    A: Actuator,
    E: EventSink,
{
    // Ticks sit on a grid anchored at the first cycle's start
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }
        cycle.lock().await.run().await;
    }
    debug!("Monitor loop exited");
}

/// Fixed-rate monitoring loop with explicit start/stop
pub struct Monitor<S, A, E> {
    config: MonitorConfig,
    cycle: Arc<Mutex<Cycle<S, A, E>>>,
    running: Arc<AtomicBool>,
    task: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
}

impl<S, A, E> Monitor<S, A, E>
where
    S: LoudnessSource,
    A: Actuator,
    E: EventSink,
{
    pub fn new(config: MonitorConfig, sampler: S, actuator: A, sink: E) -> Self {
        let cycle = Cycle {
            sampler,
            controller: ThresholdController::new(),
            actuator,
            sink,
            threshold: config.threshold,
        };
        Self {
            config,
            cycle: Arc::new(Mutex::new(cycle)),
            running: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Playback intent as recorded by the controller
    pub async fn playback_state(&self) -> PlaybackState {
        self.cycle.lock().await.controller.state()
    }

    /// Open the sampler and schedule cycles, the first one immediately.
    /// No-op when already running. Open failures are reported to the sink
    /// and returned; nothing is scheduled in that case.
    pub async fn start(&mut self) -> Result<(), MonitorError> {
        if self.task.is_some() {
            return Ok(());
        }

        {
            let mut cycle = self.cycle.lock().await;
            cycle.controller.reset();
            if let Err(e) = cycle.sampler.open() {
                error!("Monitoring could not start: {}", e);
                cycle.sink.notify(MonitorEvent::status(format!("Monitoring could not start: {}", e)));
                return Err(e);
            }
        }

        let period = self.config.sampling_interval.max(MIN_INTERVAL);
        self.running.store(true, Ordering::SeqCst);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.cycle),
            Arc::clone(&self.running),
            period,
            shutdown_rx,
        ));
        self.task = Some((shutdown_tx, handle));
        info!(
            "Monitoring every {:?} with threshold {:.1} dB",
            period, self.config.threshold.decibel_threshold
        );
        Ok(())
    }

    /// Cancel pending cycles, wait out one in progress, then release the
    /// sampler and the player. Safe without a prior `start()`.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some((shutdown, handle)) = self.task.take() {
            let _ = shutdown.send(());
            if let Err(e) = handle.await {
                error!("Monitor loop ended abnormally: {}", e);
            }
            info!("Monitoring stopped");
        }
        self.cycle.lock().await.teardown();
    }
}

impl<S, A, E> Drop for Monitor<S, A, E> {
    fn drop(&mut self) {
        if let Some((shutdown, handle)) = self.task.take() {
            let _ = shutdown.send(());
            handle.abort();
        }
    }
}
