//! The event channel between the fleet driver and whatever displays its
//! progress.
//!
//! Events are a human readable trail; the authoritative per-device facts live
//! in the [`RecordStore`](super::RecordStore). The channel is unbounded and
//! never blocks the producer. A consumer that went away simply makes sends
//! no-ops.

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};

use chrono::{DateTime, Local};
use log::trace;

use super::DeviceStatus;

/// One line of the run's activity trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEvent {
    pub timestamp: DateTime<Local>,
    /// Device the event is about; empty for fleet-wide events.
    pub address: String,
    pub message: String,
    pub status: Option<DeviceStatus>,
    /// Transfer progress rather than a lifecycle step.
    pub progress: bool,
}
impl UpdateEvent {
    pub fn new(address: &str, message: impl Into<String>, status: Option<DeviceStatus>) -> Self {
        UpdateEvent {
            timestamp: Local::now(),
            address: address.to_owned(),
            message: message.into(),
            status,
            progress: false,
        }
    }

    pub fn progress(address: &str, message: impl Into<String>) -> Self {
        UpdateEvent {
            progress: true,
            ..Self::new(address, message, None)
        }
    }

    /// An event about the whole run rather than a single device.
    pub fn fleet(message: impl Into<String>) -> Self {
        Self::new("", message, None)
    }

    pub fn is_fleet_wide(&self) -> bool {
        self.address.is_empty()
    }
}
impl fmt::Display for UpdateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = self.timestamp.format("%H:%M:%S");
        if self.is_fleet_wide() {
            write!(f, "[{}] {}", time, self.message)
        } else {
            write!(f, "[{}] {}: {}", time, self.address, self.message)
        }
    }
}

/// Create a connected sender/receiver pair.
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel();
    (EventSender { tx }, EventReceiver { rx })
}

/// Producer side, cheap to clone.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<UpdateEvent>,
}
impl EventSender {
    pub fn send(&self, event: UpdateEvent) {
        if let Err(mpsc::SendError(event)) = self.tx.send(event) {
            trace!("event dropped, nobody is listening: {}", event);
        }
    }
}

/// Consumer side.
#[derive(Debug)]
pub struct EventReceiver {
    rx: Receiver<UpdateEvent>,
}
impl EventReceiver {
    /// Take every event queued so far, in emission order, without waiting.
    pub fn drain(&self) -> Vec<UpdateEvent> {
        self.rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn drains_in_emission_order_across_threads() {
        let (tx, rx) = channel();
        let producer = thread::spawn(move || {
            for i in 0..100 {
                tx.send(UpdateEvent::new("10.0.0.1", format!("event {}", i), None));
            }
        });
        producer.join().unwrap();

        let messages: Vec<_> = rx.drain().into_iter().map(|e| e.message).collect();
        let expected: Vec<_> = (0..100).map(|i| format!("event {}", i)).collect();
        assert_eq!(messages, expected);
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn sending_without_consumer_is_harmless() {
        let (tx, rx) = channel();
        drop(rx);
        tx.send(UpdateEvent::fleet("All updates completed!"));
    }

    #[test]
    fn display_includes_time_address_and_message() {
        let event = UpdateEvent::new("192.168.1.45", "FW upload timeout", None);
        let line = event.to_string();
        assert!(line.starts_with('['));
        assert!(line.ends_with("] 192.168.1.45: FW upload timeout"));

        let fleet = UpdateEvent::fleet("done");
        assert!(fleet.is_fleet_wide());
        assert!(fleet.to_string().ends_with("] done"));
    }
}
