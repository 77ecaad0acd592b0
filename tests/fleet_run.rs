//! End to end runs of the fleet driver against scripted miners.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::{json, Map, Value};

use updtrr::fleet::{self, DeviceStatus};
use updtrr::{
    DeviceApi, FleetDriver, Images, ProgressFn, SettingsBuilder, TransportError, UploadTarget,
};

/// How one scripted miner behaves.
#[derive(Clone)]
struct Miner {
    version: Option<&'static str>,
    www: Result<(), u16>,
    firmware: Result<(), u16>,
}

#[derive(Default)]
struct Lab {
    miners: HashMap<String, Miner>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}
impl Lab {
    fn with(mut self, address: &str, miner: Miner) -> Self {
        self.miners.insert(address.to_owned(), miner);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn enter(&self, call: String) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(call);
        thread::sleep(Duration::from_millis(2));
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DeviceApi for Lab {
    fn system_info(
        &self,
        address: &str,
        _timeout: Duration,
    ) -> Result<Map<String, Value>, TransportError> {
        self.enter(format!("GET {}", address));
        let result = match self.miners.get(address).and_then(|m| m.version) {
            Some(version) => Ok(json!({
                "version": version,
                "axeOSVersion": version,
                "ASICModel": "BM1366",
            })
            .as_object()
            .unwrap()
            .clone()),
            None => Err(TransportError::Connection("refused".to_owned())),
        };
        self.leave();
        result
    }

    fn upload(
        &self,
        address: &str,
        target: UploadTarget,
        image: Arc<[u8]>,
        progress: ProgressFn,
    ) -> Result<u64, TransportError> {
        self.enter(format!("POST {} {}", target.path(), address));
        let miner = self.miners[address].clone();
        let outcome = match target {
            UploadTarget::Www => miner.www,
            UploadTarget::Firmware => miner.firmware,
        };
        let total = image.len() as u64;
        for sent in [total / 2, total].iter() {
            progress(*sent, total);
        }
        self.leave();
        outcome.map(|_| total).map_err(TransportError::Status)
    }
}

fn images() -> Arc<Images> {
    let mut firmware = vec![0u8; 4096];
    firmware[1000..1017].copy_from_slice(b"esp-miner v2.10.0");
    Arc::new(Images::from_bytes(firmware.into(), vec![7u8; 2048].into()))
}

fn run(lab: Arc<Lab>, addresses: &[&str], force: bool, check_only: bool) -> (FleetDriver, Vec<fleet::UpdateEvent>) {
    let settings = SettingsBuilder::new()
        .device_delay(Duration::from_millis(5))
        .upload_delay(Duration::from_millis(5))
        .force(force)
        .check_only(check_only)
        .finalize();
    let (tx, rx) = fleet::channel();
    let addresses = addresses.iter().map(|a| a.to_string()).collect();
    let driver = FleetDriver::new(settings, lab, images(), addresses, tx);
    driver.run();
    (driver, rx.drain())
}

fn healthy(version: &'static str) -> Miner {
    Miner {
        version: Some(version),
        www: Ok(()),
        firmware: Ok(()),
    }
}

#[test]
fn mixed_fleet() {
    let lab = Arc::new(
        Lab::default()
            .with("10.0.0.1", healthy("v2.10.0"))
            .with("10.0.0.2", healthy("v2.9.0"))
            .with(
                "10.0.0.3",
                Miner {
                    version: None,
                    www: Err(401),
                    firmware: Ok(()),
                },
            )
            .with(
                "10.0.0.4",
                Miner {
                    version: Some("2.4.1"),
                    www: Err(500),
                    firmware: Err(500),
                },
            ),
    );

    let (driver, events) = run(
        Arc::clone(&lab),
        &["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"],
        false,
        false,
    );

    assert_eq!(
        lab.calls(),
        vec![
            "GET 10.0.0.1",
            "GET 10.0.0.2",
            "POST /api/system/OTAWWW 10.0.0.2",
            "POST /api/system/OTA 10.0.0.2",
            "GET 10.0.0.3",
            "POST /api/system/OTAWWW 10.0.0.3",
            "POST /api/system/OTA 10.0.0.3",
            "GET 10.0.0.4",
            "POST /api/system/OTAWWW 10.0.0.4",
            "POST /api/system/OTA 10.0.0.4",
        ]
    );
    assert_eq!(lab.max_in_flight.load(Ordering::SeqCst), 1);

    let stats = driver.state().statistics();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.up_to_date, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.www_success, 1);
    assert_eq!(stats.fw_success, 2);
    assert_eq!(stats.both_failed, vec!["10.0.0.4".to_owned()]);

    let statuses: Vec<_> = driver
        .state()
        .records
        .snapshot()
        .into_iter()
        .map(|r| (r.address, r.status, r.progress))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("10.0.0.1".to_owned(), DeviceStatus::UpToDate, None),
            ("10.0.0.2".to_owned(), DeviceStatus::Completed, None),
            ("10.0.0.3".to_owned(), DeviceStatus::Failed, None),
            ("10.0.0.4".to_owned(), DeviceStatus::Failed, None),
        ]
    );

    let unauthorized = events
        .iter()
        .find(|e| e.address == "10.0.0.3" && e.status == Some(DeviceStatus::WwwFailed))
        .unwrap();
    assert!(unauthorized.message.starts_with("WWW upload failed: "));
    assert!(unauthorized.message.contains("401"));

    let last_of_3 = events.iter().rev().find(|e| e.address == "10.0.0.3").unwrap();
    assert_eq!(last_of_3.message, "Device update failed (WWW: ✗, FW: ✓)");
    assert_eq!(events.last().unwrap().message, "All updates completed!");
}

#[test]
fn device_events_follow_the_stage_order() {
    let lab = Arc::new(Lab::default().with("10.0.0.2", healthy("v2.9.0")));
    let (_, events) = run(lab, &["10.0.0.2"], false, false);

    let lifecycle: Vec<_> = events
        .iter()
        .filter(|e| e.address == "10.0.0.2" && e.status.is_some())
        .map(|e| e.status.unwrap())
        .collect();
    assert_eq!(
        lifecycle,
        vec![
            DeviceStatus::Pending,
            DeviceStatus::CheckingVersion,
            DeviceStatus::WwwUploading,
            DeviceStatus::WwwSuccess,
            DeviceStatus::FwUploading,
            DeviceStatus::FwSuccess,
            DeviceStatus::Completed,
        ]
    );
    assert!(events
        .iter()
        .any(|e| e.progress && e.message == "FW upload: 100% - Finalizing..."));
    assert!(events
        .iter()
        .any(|e| e.message.contains("Device v2.9.0 (AxeOS v2.9.0), image v2.10.0")));
}

#[test]
fn force_skips_the_version_check() {
    let lab = Arc::new(Lab::default().with("10.0.0.1", healthy("v9.9.9")));
    let (driver, _) = run(Arc::clone(&lab), &["10.0.0.1"], true, false);

    assert_eq!(
        lab.calls(),
        vec![
            "POST /api/system/OTAWWW 10.0.0.1",
            "POST /api/system/OTA 10.0.0.1",
        ]
    );
    assert_eq!(driver.state().statistics().completed, 1);
}

#[test]
fn check_only_never_uploads() {
    let lab = Arc::new(
        Lab::default()
            .with("10.0.0.1", healthy("v2.10.0"))
            .with("10.0.0.2", healthy("v2.8.0")),
    );
    let (driver, _) = run(Arc::clone(&lab), &["10.0.0.1", "10.0.0.2"], false, true);

    assert_eq!(lab.calls(), vec!["GET 10.0.0.1", "GET 10.0.0.2"]);
    let stats = driver.state().statistics();
    assert_eq!(stats.up_to_date, 1);
    assert_eq!(stats.update_available, 1);
    assert!(stats.all_succeeded());
}
