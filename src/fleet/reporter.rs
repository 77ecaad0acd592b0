//! Publishing what happens to one device: its record, the run counters and
//! the event trail.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::info;

use super::{DeviceStatus, EventSender, FleetState, Progress, UpdateEvent};
use crate::utils::{format_bytes, ProgressFn, UploadTarget};

/// Number of progress events emitted over a whole transfer.
const PROGRESS_STEPS: u64 = 20;

/// Handle given to a device's state machine to publish its lifecycle.
#[derive(Debug, Clone)]
pub struct DeviceReporter {
    address: String,
    state: Arc<FleetState>,
    events: EventSender,
}
impl DeviceReporter {
    pub fn new(address: &str, state: Arc<FleetState>, events: EventSender) -> Self {
        DeviceReporter {
            address: address.to_owned(),
            state,
            events,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn status(&self, status: DeviceStatus) {
        self.state.records.set_status(&self.address, status);
    }

    /// Emit an event, mirror it into the device history and the log.
    pub fn event(&self, message: impl Into<String>, status: Option<DeviceStatus>) {
        let event = UpdateEvent::new(&self.address, message, status);
        info!("{}: {}", self.address, event.message);
        self.state
            .records
            .push_history(&self.address, event.message.clone());
        self.events.send(event);
    }

    pub fn clear_progress(&self) {
        self.state.records.set_progress(&self.address, None);
    }

    pub fn count_stage_success(&self, target: UploadTarget) {
        self.state.count_stage_success(target);
    }

    /// Start tracking a transfer of `total` bytes and return the callback the
    /// transport reports to.
    ///
    /// Every call updates the record; an event is emitted each time the
    /// transfer crosses a 5 % step.
    pub fn track_upload(&self, target: UploadTarget, total: u64) -> ProgressFn {
        self.state
            .records
            .set_progress(&self.address, Some(Progress::new(target, 0, total)));

        let reporter = self.clone();
        let last_step = AtomicU64::new(0);
        Arc::new(move |sent: u64, total: u64| {
            let progress = Progress::new(target, sent, total);
            reporter
                .state
                .records
                .set_progress(&reporter.address, Some(progress));

            let step = if total == 0 {
                PROGRESS_STEPS
            } else {
                sent.min(total) * PROGRESS_STEPS / total
            };
            if step > last_step.fetch_max(step, Ordering::SeqCst) {
                let message = if step == PROGRESS_STEPS {
                    format!("{} upload: 100% - Finalizing...", target.tag())
                } else {
                    format!(
                        "{} upload: {}% - {}/{}",
                        target.tag(),
                        progress.percentage(),
                        format_bytes(sent),
                        format_bytes(total)
                    )
                };
                reporter
                    .events
                    .send(UpdateEvent::progress(&reporter.address, message));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::channel;

    #[test]
    fn progress_is_recorded_and_throttled() {
        let state = Arc::new(FleetState::new(&["10.0.0.1"]));
        let (tx, rx) = channel();
        let reporter = DeviceReporter::new("10.0.0.1", Arc::clone(&state), tx);

        let progress = reporter.track_upload(UploadTarget::Www, 1000);
        for sent in (0..=1000).step_by(10) {
            progress(sent, 1000);
        }

        let record = state.records.get("10.0.0.1").unwrap();
        assert_eq!(record.progress.unwrap().percentage(), 100);

        let events = rx.drain();
        assert_eq!(events.len(), PROGRESS_STEPS as usize);
        assert!(events.iter().all(|e| e.progress));
        assert_eq!(events[0].message, "WWW upload: 5% - 50.0B/1000.0B");
        assert_eq!(events.last().unwrap().message, "WWW upload: 100% - Finalizing...");
    }

    #[test]
    fn events_land_in_history() {
        let state = Arc::new(FleetState::new(&["10.0.0.1"]));
        let (tx, rx) = channel();
        let reporter = DeviceReporter::new("10.0.0.1", Arc::clone(&state), tx);

        reporter.event("Starting device update...", Some(DeviceStatus::Pending));

        let record = state.records.get("10.0.0.1").unwrap();
        assert_eq!(record.history.back().unwrap(), "Starting device update...");
        assert_eq!(rx.drain()[0].status, Some(DeviceStatus::Pending));
    }
}
