//! Events for the per-device update state machine.
//!
//! This modules is private and restricted to the
//! [`update_machine`](crate::update_machine) scope. The public interface of the
//! state machine is provided by [`update_machine`](crate::update_machine).
//!
//! ```ignore
//! use super::events::*;
//! ```
//!
//! Refer to the [`state_machine`](super::state_machine) module for an overview
//! of states, events and transitions.

use crate::fleet::DeviceStatus;

use super::state_machine::{DeviceContext, StageOutcome};

// =============================================================================
// Crate-Public Interface
// =============================================================================

// CheckVersionEvent ===========================================================

/// Event fired from the `Init` state to compare the device version with the
/// firmware image before uploading anything. Not fired in force mode.
#[derive(Debug)]
pub(crate) struct CheckVersionEvent {
    pub ctx: DeviceContext,
}

// UploadWwwEvent ==============================================================

/// Event fired to start the web interface upload, either because the version
/// check found the device outdated (or could not tell), or straight from the
/// `Init` state in force mode.
#[derive(Debug)]
pub(crate) struct UploadWwwEvent {
    pub ctx: DeviceContext,
}

// UploadFirmwareEvent =========================================================

/// Event fired once the web interface upload has concluded, successfully or
/// not. The firmware is always attempted; the web interface outcome travels
/// along so the final status can be decided.
#[derive(Debug)]
pub(crate) struct UploadFirmwareEvent {
    pub ctx: DeviceContext,
    pub www: StageOutcome,
}

// DoneEvent ===================================================================

/// Event fired when the device visit is over. It can happen:
///
///  1. after the version check, when the device is up to date or the run only
///     checks versions,
///  2. from the `Init` state in forced check-only runs,
///  3. after the firmware upload concluded.
#[derive(Debug)]
pub(crate) struct DoneEvent {
    pub ctx: DeviceContext,
    /// One of the terminal statuses.
    pub status: DeviceStatus,
    pub www: Option<StageOutcome>,
    pub firmware: Option<StageOutcome>,
}

// ExitEvent ===================================================================

/// The last event of a device visit, fired once the final status has been
/// published. It ends the state machine event loop.
#[derive(Debug)]
pub(crate) struct ExitEvent {
    pub ctx: DeviceContext,
    pub status: DeviceStatus,
    pub www: Option<StageOutcome>,
    pub firmware: Option<StageOutcome>,
}

// Events enum ==================================================================

/// Events that can be triggered within the update state machine.
#[derive(Debug)]
pub(crate) enum Event {
    CheckVersion(CheckVersionEvent),
    UploadWww(UploadWwwEvent),
    UploadFirmware(UploadFirmwareEvent),
    Done(DoneEvent),
    Exit(ExitEvent),
}
