//! Events pushed from the monitor to whoever is watching it

use log::info;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// A loudness measurement
    Reading { decibel: f64 },
    /// A human-readable status change or error
    Status { message: String },
}

impl MonitorEvent {
    pub fn status(message: impl Into<String>) -> Self {
        MonitorEvent::Status {
            message: message.into(),
        }
    }

    /// Log line text for this event
    pub fn describe(&self) -> String {
        match self {
            MonitorEvent::Reading { decibel } => format!("Current level: {:.1} dB", decibel),
            MonitorEvent::Status { message } => message.clone(),
        }
    }
}

/// Fire-and-forget receiver of monitor events, called in emission order
pub trait EventSink: Send + 'static {
    fn notify(&self, event: MonitorEvent);
}

impl EventSink for UnboundedSender<MonitorEvent> {
    fn notify(&self, event: MonitorEvent) {
        // A dropped receiver just means nobody is watching anymore
        let _ = self.send(event);
    }
}

/// Writes events to the log, for headless runs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn notify(&self, event: MonitorEvent) {
        info!("{}", event.describe());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_preserves_order() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.notify(MonitorEvent::Reading { decibel: 61.25 });
        tx.notify(MonitorEvent::status("Playback started"));
        assert_eq!(rx.try_recv().unwrap(), MonitorEvent::Reading { decibel: 61.25 });
        assert_eq!(rx.try_recv().unwrap(), MonitorEvent::status("Playback started"));
    }

    #[test]
    fn notify_after_receiver_dropped_is_harmless() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        tx.notify(MonitorEvent::status("nobody listening"));
    }

    #[test]
    fn describe_formats_readings() {
        assert_eq!(
            MonitorEvent::Reading { decibel: 42.04 }.describe(),
            "Current level: 42.0 dB"
        );
        assert_eq!(MonitorEvent::status("hi").describe(), "hi");
    }
}
