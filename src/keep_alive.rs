//! Supervisor that restarts monitoring when it is not running

use crate::audio::LoudnessSource;
use crate::events::EventSink;
use crate::monitor::Monitor;
use crate::playback::Actuator;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;

/// Call `start()` on every tick until `shutdown` flips to true.
///
/// `start()` is idempotent, so a running monitor is left alone; one that
/// failed to open its capture session gets another attempt each period.
pub async fn keep_alive<S, A, E>(
    monitor: Arc<Mutex<Monitor<S, A, E>>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    S: LoudnessSource,
    A: Actuator,
    E: EventSink,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The caller already made the first attempt
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        let mut guard = monitor.lock().await;
        if guard.is_running() {
            debug!("Monitor alive");
            continue;
        }
        match guard.start().await {
            Ok(()) => info!("Monitor restarted by keep-alive"),
            Err(e) => warn!("Keep-alive restart failed: {}", e),
        }
    }
    debug!("Keep-alive stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ThresholdConfig;
    use crate::error::MonitorError;
    use crate::loudness::LoudnessReading;
    use crate::monitor::MonitorConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails to open a fixed number of times, then succeeds
    struct FlakySource {
        failures_left: usize,
        opens: Arc<AtomicUsize>,
        open: bool,
    }

    impl LoudnessSource for FlakySource {
        fn open(&mut self) -> Result<(), MonitorError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(MonitorError::DeviceUnavailable("busy".to_string()));
            }
            self.open = true;
            Ok(())
        }

        async fn measure(&mut self) -> Result<LoudnessReading, MonitorError> {
            Ok(LoudnessReading::new(0.0))
        }

        fn close(&mut self) {
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    struct Silent;

    impl Actuator for Silent {
        fn start(&mut self) -> Result<(), MonitorError> {
            Ok(())
        }
        fn stop(&mut self) -> Result<(), MonitorError> {
            Ok(())
        }
        fn is_playing(&self) -> bool {
            false
        }
        fn has_clip(&self) -> bool {
            false
        }
        fn release(&mut self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn restarts_a_monitor_that_failed_to_open() {
        let opens = Arc::new(AtomicUsize::new(0));
        let source = FlakySource {
            failures_left: 2,
            opens: Arc::clone(&opens),
            open: false,
        };
        let config = MonitorConfig {
            threshold: ThresholdConfig::default(),
            sampling_interval: Duration::from_secs(900),
        };
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let monitor = Arc::new(Mutex::new(Monitor::new(config, source, Silent, tx)));

        assert!(monitor.lock().await.start().await.is_err());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor = tokio::spawn(keep_alive(
            Arc::clone(&monitor),
            Duration::from_secs(60),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(!monitor.lock().await.is_running());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(monitor.lock().await.is_running());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(opens.load(Ordering::SeqCst), 3);

        shutdown_tx.send(true).unwrap();
        supervisor.await.unwrap();
        monitor.lock().await.stop().await;
    }
}
