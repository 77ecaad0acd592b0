//! Sequential update of a whole fleet.
//!
//! Devices are visited one at a time, in input order, with a configurable
//! pause between two visits. The driver owns nothing the display needs to
//! lock: it publishes through the shared [`FleetState`] and the event channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};

use super::{DeviceReporter, EventSender, FleetState, FleetStatistics, Images, UpdateEvent};
use crate::settings::Settings;
use crate::update_machine::{self, DeviceContext};
use crate::utils::DeviceApi;

/// Granularity of the cancellable waits.
const PAUSE_SLICE: Duration = Duration::from_millis(100);

/// Shared cancellation flags of a run.
///
/// `cancel()` asks the driver to stop before the next stage or device.
/// `interrupt()` does the same and additionally remembers that the run was
/// stopped by a signal, which changes the exit code.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    interrupted: Arc<AtomicBool>,
}
impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        self.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early if the run gets cancelled. Returns
    /// `false` when the wait was cut short.
    pub fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(PAUSE_SLICE));
        }
    }
}

/// Runs the per-device state machine over every address of the fleet.
pub struct FleetDriver {
    settings: Settings,
    api: Arc<dyn DeviceApi>,
    images: Arc<Images>,
    addresses: Vec<String>,
    state: Arc<FleetState>,
    events: EventSender,
    cancel: CancelHandle,
}
impl FleetDriver {
    pub fn new(
        settings: Settings,
        api: Arc<dyn DeviceApi>,
        images: Arc<Images>,
        addresses: Vec<String>,
        events: EventSender,
    ) -> Self {
        let state = Arc::new(FleetState::new(&addresses));
        FleetDriver {
            settings,
            api,
            images,
            addresses,
            state,
            events,
            cancel: CancelHandle::new(),
        }
    }

    /// Share an existing cancellation handle, typically one a signal handler
    /// already holds.
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Shared state to hand to a display before the run starts.
    pub fn state(&self) -> Arc<FleetState> {
        Arc::clone(&self.state)
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Visit every device in order and return the final counters.
    ///
    /// Cancellation is honored between devices, during the inter-device wait
    /// and before each upload stage. Devices never reached stay `PENDING`.
    pub fn run(&self) -> FleetStatistics {
        let total = self.addresses.len();
        self.state.mark_started();
        info!("Updating {} device(s)", total);

        for (index, address) in self.addresses.iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.report_cancelled(index);
                break;
            }

            if index > 0 && !self.settings.device_delay.is_zero() {
                let delay = self.settings.device_delay;
                self.announce(UpdateEvent::new(
                    address,
                    format!(
                        "Waiting {} seconds before next device...",
                        delay.as_secs_f32()
                    ),
                    None,
                ));
                if !self.cancel.pause(delay) {
                    self.report_cancelled(index);
                    break;
                }
            }

            self.state.set_current(index + 1);
            self.announce(UpdateEvent::new(
                address,
                format!("Starting device {}/{}", index + 1, total),
                None,
            ));

            let ctx = DeviceContext {
                settings: self.settings.clone(),
                api: Arc::clone(&self.api),
                images: Arc::clone(&self.images),
                reporter: DeviceReporter::new(address, self.state(), self.events.clone()),
                cancel: self.cancel.clone(),
            };
            let outcome = update_machine::factory(ctx).run();

            self.state.count_outcome(outcome.status);
            if outcome.both_failed() {
                warn!("{}: both uploads failed", outcome.address);
                self.state.record_both_failed(&outcome.address);
            }
        }

        self.state.mark_finished();
        self.announce(UpdateEvent::fleet("All updates completed!"));

        let stats = self.state.statistics();
        info!(
            "Run finished: {} completed, {} up to date, {} update available, {} failed",
            stats.completed, stats.up_to_date, stats.update_available, stats.failed
        );
        stats
    }

    fn announce(&self, event: UpdateEvent) {
        if event.is_fleet_wide() {
            info!("{}", event.message);
        } else {
            info!("{}: {}", event.address, event.message);
        }
        self.events.send(event);
    }

    fn report_cancelled(&self, index: usize) {
        let remaining = self.addresses.len() - index;
        self.announce(UpdateEvent::fleet(format!(
            "Update cancelled by user, {} device(s) skipped",
            remaining
        )));
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::{channel, DeviceStatus, EventReceiver};
    use crate::settings::SettingsBuilder;
    use crate::utils::{ProgressFn, TransportError, UploadTarget};
    use serde_json::{json, Map, Value};
    use std::sync::Mutex;

    /// Answers from a fixed script and records every call.
    #[derive(Default)]
    struct ScriptedApi {
        version: Option<&'static str>,
        www_status: Option<u16>,
        fw_status: Option<u16>,
        calls: Mutex<Vec<String>>,
        cancel_on_first_upload: Option<CancelHandle>,
    }
    impl DeviceApi for ScriptedApi {
        fn system_info(
            &self,
            address: &str,
            _timeout: Duration,
        ) -> Result<Map<String, Value>, TransportError> {
            self.calls.lock().unwrap().push(format!("info {}", address));
            match self.version {
                Some(v) => Ok(json!({ "version": v }).as_object().unwrap().clone()),
                None => Err(TransportError::Timeout),
            }
        }

        fn upload(
            &self,
            address: &str,
            target: UploadTarget,
            image: Arc<[u8]>,
            progress: ProgressFn,
        ) -> Result<u64, TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} {}", target.tag(), address));
            if let Some(cancel) = &self.cancel_on_first_upload {
                cancel.cancel();
            }
            let total = image.len() as u64;
            progress(total, total);
            let status = match target {
                UploadTarget::Www => self.www_status,
                UploadTarget::Firmware => self.fw_status,
            };
            match status {
                None | Some(200) => Ok(total),
                Some(code) => Err(TransportError::Status(code)),
            }
        }
    }

    fn images() -> Arc<Images> {
        Arc::new(Images::from_bytes(
            b"esp-miner v2.9.0".to_vec().into(),
            b"www".to_vec().into(),
        ))
    }

    fn settings() -> Settings {
        SettingsBuilder::new()
            .device_delay(Duration::ZERO)
            .upload_delay(Duration::ZERO)
            .finalize()
    }

    fn driver(api: Arc<ScriptedApi>, addresses: &[&str]) -> (FleetDriver, EventReceiver) {
        let (tx, rx) = channel();
        let addresses = addresses.iter().map(|a| a.to_string()).collect();
        (FleetDriver::new(settings(), api, images(), addresses, tx), rx)
    }

    #[test]
    fn devices_are_visited_in_order() {
        let api = Arc::new(ScriptedApi {
            version: Some("2.8.0"),
            ..Default::default()
        });
        let (driver, _rx) = driver(Arc::clone(&api), &["a", "b"]);

        let stats = driver.run();

        assert_eq!(
            *api.calls.lock().unwrap(),
            vec!["info a", "WWW a", "FW a", "info b", "WWW b", "FW b"]
        );
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.www_success, 2);
        assert_eq!(stats.fw_success, 2);
        assert!(stats.all_succeeded());
        assert!(!driver.state().is_running());
    }

    #[test]
    fn up_to_date_device_is_not_uploaded() {
        let api = Arc::new(ScriptedApi {
            version: Some("v2.9.0"),
            ..Default::default()
        });
        let (driver, rx) = driver(Arc::clone(&api), &["a"]);

        let stats = driver.run();

        assert_eq!(*api.calls.lock().unwrap(), vec!["info a"]);
        assert_eq!(stats.up_to_date, 1);
        assert_eq!(
            driver.state().records.get("a").unwrap().status,
            DeviceStatus::UpToDate
        );
        let last = rx.drain().pop().unwrap();
        assert!(last.is_fleet_wide());
        assert_eq!(last.message, "All updates completed!");
    }

    #[test]
    fn www_failure_still_attempts_firmware() {
        let api = Arc::new(ScriptedApi {
            version: None,
            www_status: Some(500),
            ..Default::default()
        });
        let (driver, _rx) = driver(Arc::clone(&api), &["a"]);

        let stats = driver.run();

        assert_eq!(*api.calls.lock().unwrap(), vec!["info a", "WWW a", "FW a"]);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.www_success, 0);
        assert_eq!(stats.fw_success, 1);
        assert!(stats.both_failed.is_empty());
    }

    #[test]
    fn both_failures_are_listed() {
        let api = Arc::new(ScriptedApi {
            version: Some("1.0.0"),
            www_status: Some(401),
            fw_status: Some(500),
            ..Default::default()
        });
        let (driver, _rx) = driver(api, &["a"]);

        let stats = driver.run();

        assert_eq!(stats.both_failed, vec!["a".to_owned()]);
        assert!(!stats.all_succeeded());
    }

    #[test]
    fn cancellation_stops_before_next_stage_and_device() {
        let cancel = CancelHandle::new();
        let api = Arc::new(ScriptedApi {
            version: Some("1.0.0"),
            cancel_on_first_upload: Some(cancel.clone()),
            ..Default::default()
        });
        let (driver, _rx) = driver(Arc::clone(&api), &["a", "b"]);
        let driver = driver.with_cancel_handle(cancel);

        let stats = driver.run();

        // The upload in flight completes, the firmware stage is skipped.
        assert_eq!(*api.calls.lock().unwrap(), vec!["info a", "WWW a"]);
        assert_eq!(stats.www_success, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(
            driver.state().records.get("b").unwrap().status,
            DeviceStatus::Pending
        );
    }

    #[test]
    fn device_delay_only_separates_devices() {
        let api = Arc::new(ScriptedApi {
            version: Some("v2.9.0"),
            ..Default::default()
        });
        let settings = SettingsBuilder::new()
            .device_delay(Duration::from_millis(60))
            .finalize();
        let (tx, rx) = channel();
        let driver = FleetDriver::new(
            settings,
            api,
            images(),
            vec!["a".to_owned(), "b".to_owned()],
            tx,
        );

        let started = Instant::now();
        driver.run();
        let elapsed = started.elapsed();

        let events = rx.drain();
        let waits: Vec<_> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.message.ends_with(" before next device..."))
            .map(|(i, e)| (i, e.address.as_str()))
            .collect();
        let position = |message: &str| events.iter().position(|e| e.message == message).unwrap();

        assert_eq!(waits.len(), 1);
        let (wait, address) = waits[0];
        assert_eq!(address, "b");
        assert!(position("Starting device 1/2") < wait);
        assert!(wait < position("Starting device 2/2"));
        assert!(elapsed >= Duration::from_millis(60));
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn pause_returns_early_when_cancelled() {
        let cancel = CancelHandle::new();
        cancel.cancel();
        let started = Instant::now();
        assert!(!cancel.pause(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!cancel.is_interrupted());

        let cancel = CancelHandle::new();
        assert!(cancel.pause(Duration::from_millis(10)));
        cancel.interrupt();
        assert!(cancel.is_cancelled() && cancel.is_interrupted());
    }
}
