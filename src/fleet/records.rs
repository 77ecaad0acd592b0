//! Per-device records and run-wide counters.
//!
//! Only the fleet driver thread writes here; displays read concurrently. Each
//! record sits behind a lock so a reader always observes a whole value, maybe
//! one that is about to change.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::utils::UploadTarget;

/// Number of history lines kept per device.
pub const HISTORY_LEN: usize = 20;

/// Lifecycle of a device during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    Pending,
    CheckingVersion,
    /// Terminal: the device already runs the image version or newer.
    UpToDate,
    /// Terminal, check-only runs: the device would be updated.
    UpdateAvailable,
    WwwUploading,
    WwwSuccess,
    WwwFailed,
    FwUploading,
    FwSuccess,
    FwFailed,
    /// Terminal: both images were accepted.
    Completed,
    /// Terminal: at least one of the images was not accepted.
    Failed,
}
impl DeviceStatus {
    pub fn is_terminal(self) -> bool {
        match self {
            DeviceStatus::UpToDate
            | DeviceStatus::UpdateAvailable
            | DeviceStatus::Completed
            | DeviceStatus::Failed => true,
            DeviceStatus::Pending
            | DeviceStatus::CheckingVersion
            | DeviceStatus::WwwUploading
            | DeviceStatus::WwwSuccess
            | DeviceStatus::WwwFailed
            | DeviceStatus::FwUploading
            | DeviceStatus::FwSuccess
            | DeviceStatus::FwFailed => false,
        }
    }

    /// Terminal statuses that count as a successful visit.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            DeviceStatus::UpToDate | DeviceStatus::UpdateAvailable | DeviceStatus::Completed
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            DeviceStatus::Pending => "PENDING",
            DeviceStatus::CheckingVersion => "CHECKING_VERSION",
            DeviceStatus::UpToDate => "UP_TO_DATE",
            DeviceStatus::UpdateAvailable => "UPDATE_AVAILABLE",
            DeviceStatus::WwwUploading => "WWW_UPLOADING",
            DeviceStatus::WwwSuccess => "WWW_SUCCESS",
            DeviceStatus::WwwFailed => "WWW_FAILED",
            DeviceStatus::FwUploading => "FW_UPLOADING",
            DeviceStatus::FwSuccess => "FW_SUCCESS",
            DeviceStatus::FwFailed => "FW_FAILED",
            DeviceStatus::Completed => "COMPLETED",
            DeviceStatus::Failed => "FAILED",
        }
    }
}
impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Transfer progress of the upload in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub target: UploadTarget,
    pub bytes_sent: u64,
    pub total_bytes: u64,
}
impl Progress {
    pub fn new(target: UploadTarget, bytes_sent: u64, total_bytes: u64) -> Self {
        Progress {
            target,
            bytes_sent,
            total_bytes,
        }
    }

    /// Whole percent transferred, `0` for an empty transfer.
    pub fn percentage(&self) -> u64 {
        if self.total_bytes == 0 {
            0
        } else {
            (self.bytes_sent.min(self.total_bytes) * 100) / self.total_bytes
        }
    }
}

/// Everything known about one device of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub address: String,
    pub status: DeviceStatus,
    pub progress: Option<Progress>,
    /// Most recent event messages, oldest first.
    pub history: VecDeque<String>,
}
impl DeviceRecord {
    fn new(address: &str) -> Self {
        DeviceRecord {
            address: address.to_owned(),
            status: DeviceStatus::Pending,
            progress: None,
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }
}

/// The device records of a run, in input order.
#[derive(Debug)]
pub struct RecordStore {
    records: Vec<RwLock<DeviceRecord>>,
}
impl RecordStore {
    pub fn new<S: AsRef<str>>(addresses: &[S]) -> Self {
        RecordStore {
            records: addresses
                .iter()
                .map(|a| RwLock::new(DeviceRecord::new(a.as_ref())))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Copy of the record for `address`.
    pub fn get(&self, address: &str) -> Option<DeviceRecord> {
        self.find(address)
            .map(|r| r.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    /// Copy of every record, in input order.
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        self.records
            .iter()
            .map(|r| r.read().unwrap_or_else(PoisonError::into_inner).clone())
            .collect()
    }

    pub fn set_status(&self, address: &str, status: DeviceStatus) {
        self.update(address, |r| r.status = status);
    }

    pub fn set_progress(&self, address: &str, progress: Option<Progress>) {
        self.update(address, |r| r.progress = progress);
    }

    pub fn push_history(&self, address: &str, line: String) {
        self.update(address, |r| {
            if r.history.len() == HISTORY_LEN {
                r.history.pop_front();
            }
            r.history.push_back(line);
        });
    }

    fn find(&self, address: &str) -> Option<&RwLock<DeviceRecord>> {
        self.records.iter().find(|r| {
            r.read()
                .unwrap_or_else(PoisonError::into_inner)
                .address
                .as_str()
                == address
        })
    }

    fn update<F: FnOnce(&mut DeviceRecord)>(&self, address: &str, f: F) {
        if let Some(record) = self.find(address) {
            f(&mut record.write().unwrap_or_else(PoisonError::into_inner));
        }
    }
}

/// Run-wide counters as seen at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetStatistics {
    pub total: usize,
    pub www_success: usize,
    pub fw_success: usize,
    pub completed: usize,
    pub failed: usize,
    pub up_to_date: usize,
    pub update_available: usize,
    /// Devices on which neither image was accepted.
    pub both_failed: Vec<String>,
}
impl FleetStatistics {
    /// Every visited device ended in a successful terminal status.
    pub fn all_succeeded(&self) -> bool {
        self.completed + self.up_to_date + self.update_available == self.total
    }
}

/// Shared state of a run: records, counters and run flags.
#[derive(Debug)]
pub struct FleetState {
    pub records: RecordStore,
    total: usize,
    current: AtomicUsize,
    www_success: AtomicUsize,
    fw_success: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    up_to_date: AtomicUsize,
    update_available: AtomicUsize,
    both_failed: Mutex<Vec<String>>,
    running: AtomicBool,
    started: Mutex<Option<Instant>>,
    finished: Mutex<Option<Instant>>,
}
impl FleetState {
    pub fn new<S: AsRef<str>>(addresses: &[S]) -> Self {
        FleetState {
            records: RecordStore::new(addresses),
            total: addresses.len(),
            current: AtomicUsize::new(0),
            www_success: AtomicUsize::new(0),
            fw_success: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            up_to_date: AtomicUsize::new(0),
            update_available: AtomicUsize::new(0),
            both_failed: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            started: Mutex::new(None),
            finished: Mutex::new(None),
        }
    }

    pub fn statistics(&self) -> FleetStatistics {
        FleetStatistics {
            total: self.total,
            www_success: self.www_success.load(Ordering::SeqCst),
            fw_success: self.fw_success.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            up_to_date: self.up_to_date.load(Ordering::SeqCst),
            update_available: self.update_available.load(Ordering::SeqCst),
            both_failed: self
                .both_failed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// One-based position of the device being processed, `0` before the
    /// first one.
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Time since the run started, frozen once it has finished.
    pub fn elapsed(&self) -> Option<Duration> {
        let started = (*self.started.lock().unwrap_or_else(PoisonError::into_inner))?;
        let end = self
            .finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unwrap_or_else(Instant::now);
        Some(end.saturating_duration_since(started))
    }

    // Writer side, fleet driver only --------------------------------------

    pub(crate) fn mark_started(&self) {
        *self.started.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        self.running.store(true, Ordering::SeqCst);
    }

    pub(crate) fn mark_finished(&self) {
        *self.finished.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        self.running.store(false, Ordering::SeqCst);
    }

    pub(crate) fn set_current(&self, position: usize) {
        self.current.store(position, Ordering::SeqCst);
    }

    pub(crate) fn count_stage_success(&self, target: UploadTarget) {
        let counter = match target {
            UploadTarget::Www => &self.www_success,
            UploadTarget::Firmware => &self.fw_success,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn count_outcome(&self, status: DeviceStatus) {
        let counter = match status {
            DeviceStatus::Completed => &self.completed,
            DeviceStatus::Failed => &self.failed,
            DeviceStatus::UpToDate => &self.up_to_date,
            DeviceStatus::UpdateAvailable => &self.update_available,
            DeviceStatus::Pending
            | DeviceStatus::CheckingVersion
            | DeviceStatus::WwwUploading
            | DeviceStatus::WwwSuccess
            | DeviceStatus::WwwFailed
            | DeviceStatus::FwUploading
            | DeviceStatus::FwSuccess
            | DeviceStatus::FwFailed => return,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_both_failed(&self, address: &str) {
        self.both_failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(address.to_owned());
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_handles_empty_and_overshoot() {
        assert_eq!(Progress::new(UploadTarget::Www, 0, 0).percentage(), 0);
        assert_eq!(Progress::new(UploadTarget::Www, 50, 200).percentage(), 25);
        assert_eq!(Progress::new(UploadTarget::Firmware, 300, 200).percentage(), 100);
    }

    #[test]
    fn records_keep_input_order_and_start_pending() {
        let store = RecordStore::new(&["10.0.0.2", "10.0.0.1"]);
        let snapshot = store.snapshot();
        assert_eq!(snapshot[0].address, "10.0.0.2");
        assert_eq!(snapshot[1].address, "10.0.0.1");
        assert!(snapshot.iter().all(|r| r.status == DeviceStatus::Pending));
    }

    #[test]
    fn history_is_bounded() {
        let store = RecordStore::new(&["10.0.0.1"]);
        for i in 0..HISTORY_LEN + 5 {
            store.push_history("10.0.0.1", format!("line {}", i));
        }
        let record = store.get("10.0.0.1").unwrap();
        assert_eq!(record.history.len(), HISTORY_LEN);
        assert_eq!(record.history.front().unwrap(), "line 5");
    }

    #[test]
    fn unknown_address_is_ignored() {
        let store = RecordStore::new(&["10.0.0.1"]);
        store.set_status("10.0.0.9", DeviceStatus::Failed);
        assert_eq!(store.get("10.0.0.9"), None);
        assert_eq!(store.get("10.0.0.1").unwrap().status, DeviceStatus::Pending);
    }

    #[test]
    fn outcome_counters() {
        let state = FleetState::new(&["a", "b", "c"]);
        state.count_outcome(DeviceStatus::Completed);
        state.count_outcome(DeviceStatus::UpToDate);
        state.count_outcome(DeviceStatus::WwwSuccess);
        state.count_stage_success(UploadTarget::Firmware);

        let stats = state.statistics();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.up_to_date, 1);
        assert_eq!(stats.fw_success, 1);
        assert_eq!(stats.www_success, 0);
        assert!(!stats.all_succeeded());

        state.count_outcome(DeviceStatus::UpdateAvailable);
        assert!(state.statistics().all_succeeded());
    }

    #[test]
    fn terminal_statuses() {
        assert!(DeviceStatus::UpToDate.is_terminal());
        assert!(DeviceStatus::Failed.is_terminal());
        assert!(!DeviceStatus::WwwFailed.is_terminal());
        assert!(!DeviceStatus::Failed.is_success());
        assert_eq!(DeviceStatus::FwUploading.to_string(), "FW_UPLOADING");
    }
}
