//! States for the per-device update state machine.
//!
//! This modules is private and restricted to the
//! [`update_machine`](crate::update_machine) scope. The public interface of the
//! state machine is provided by [`update_machine`](crate::update_machine).
//!
//! ```ignore
//! use super::states::*;
//! ```
//!
//! Refer to the [`state_machine`](super::state_machine) module for an overview
//! of states, events and transitions.

use std::sync::Arc;

use log::{debug, info};

use super::events::*;
use super::state_machine::{DeviceContext, StageOutcome};
use crate::fleet::DeviceStatus;
use crate::utils::{fetch_device_version, format_bytes, needs_update, UploadTarget};

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Trait adding the ability for a state to be `run` after a transition into it.
pub(crate) trait Runnable {
    /// A state implements this method so it can be `run` after the state
    /// machine transitions into it.
    ///
    /// During this call, the state does its stage of the update and when
    /// finished, requests a transition to a `new state` by returning the
    /// appropriate `event`.
    fn run(&mut self, ctx: &DeviceContext) -> Event;
}

// Init State ==================================================================

/// The initial state, `PENDING` for the device.
///
/// From the `InitState`, the state machine can evolve via the following
/// transitions:
///
///  * **[`CheckVersionEvent`] => [`CheckingVersionState`]** normally,
///  * **[`UploadWwwEvent`] => [`WwwUploadingState`]** in force mode, which
///    skips the version check entirely,
///  * **[`DoneEvent`] => [`DoneState`]** in forced check-only runs, where
///    every device is reported as needing the update without contacting it.
#[derive(Debug)]
pub(crate) struct InitState {}
impl Runnable for InitState {
    fn run(&mut self, ctx: &DeviceContext) -> Event {
        debug!("{} => Init", ctx.address());
        let reporter = &ctx.reporter;
        reporter.status(DeviceStatus::Pending);
        reporter.event("Starting device update...", Some(DeviceStatus::Pending));

        match (ctx.settings.force, ctx.settings.check_only) {
            (false, _) => Event::CheckVersion(CheckVersionEvent { ctx: ctx.clone() }),
            (true, false) => {
                reporter.event("Force mode, skipping version check", None);
                Event::UploadWww(UploadWwwEvent { ctx: ctx.clone() })
            }
            (true, true) => Event::Done(DoneEvent {
                ctx: ctx.clone(),
                status: DeviceStatus::UpdateAvailable,
                www: None,
                firmware: None,
            }),
        }
    }
}

// CheckingVersion State =======================================================

/// Compares the version reported by the device with the version embedded in
/// the firmware image.
///
/// An unreachable device or an image without a recognizable version does not
/// stop the update: unknown means outdated.
///
///  * **[`DoneEvent`] => [`DoneState`]** with `UP_TO_DATE` when the device
///    runs the image version or newer, or with `UPDATE_AVAILABLE` in
///    check-only runs,
///  * **[`UploadWwwEvent`] => [`WwwUploadingState`]** otherwise.
#[derive(Debug)]
pub(crate) struct CheckingVersionState {}
impl Runnable for CheckingVersionState {
    fn run(&mut self, ctx: &DeviceContext) -> Event {
        debug!("{} => CheckingVersion", ctx.address());
        let reporter = &ctx.reporter;
        reporter.status(DeviceStatus::CheckingVersion);
        reporter.event(
            "Checking device version...",
            Some(DeviceStatus::CheckingVersion),
        );

        let device = fetch_device_version(ctx.api.as_ref(), ctx.address(), ctx.settings.timeout);
        let image = ctx.images.firmware_version;
        let update = needs_update(device.as_ref().map(|d| d.firmware), image);

        let device_text = match &device {
            Some(versions) => match &versions.web {
                Some(web) => format!("{} (AxeOS {})", versions.firmware_raw, web),
                None => versions.firmware_raw.clone(),
            },
            None => "unavailable".to_owned(),
        };
        let image_text = image.map_or_else(|| "unknown".to_owned(), |v| format!("v{}", v));
        reporter.event(
            format!(
                "Device {}, image {} -> {}",
                device_text,
                image_text,
                if update { "update needed" } else { "up to date" }
            ),
            None,
        );

        if !update {
            Event::Done(DoneEvent {
                ctx: ctx.clone(),
                status: DeviceStatus::UpToDate,
                www: None,
                firmware: None,
            })
        } else if ctx.settings.check_only {
            Event::Done(DoneEvent {
                ctx: ctx.clone(),
                status: DeviceStatus::UpdateAvailable,
                www: None,
                firmware: None,
            })
        } else {
            Event::UploadWww(UploadWwwEvent { ctx: ctx.clone() })
        }
    }
}

// WwwUploading State ==========================================================

/// Uploads the web interface image. Whatever the outcome, the machine moves
/// on to the firmware upload:
///
///  * **[`UploadFirmwareEvent`] => [`FwUploadingState`]**, after waiting the
///    configured upload delay when the web interface was accepted.
#[derive(Debug)]
pub(crate) struct WwwUploadingState {}
impl Runnable for WwwUploadingState {
    fn run(&mut self, ctx: &DeviceContext) -> Event {
        debug!("{} => WwwUploading", ctx.address());
        let www = upload_stage(ctx, UploadTarget::Www);

        let delay = ctx.settings.upload_delay;
        if www.is_success() && !delay.is_zero() {
            ctx.reporter.event(
                format!(
                    "Waiting {} seconds before firmware upload...",
                    delay.as_secs_f32()
                ),
                None,
            );
            ctx.cancel.pause(delay);
        }

        Event::UploadFirmware(UploadFirmwareEvent {
            ctx: ctx.clone(),
            www,
        })
    }
}

// FwUploading State ===========================================================

/// Uploads the firmware image, then concludes the visit:
///
///  * **[`DoneEvent`] => [`DoneState`]** with `COMPLETED` when both images
///    were accepted, `FAILED` otherwise.
#[derive(Debug)]
pub(crate) struct FwUploadingState {
    /// How the web interface upload concluded.
    pub www: StageOutcome,
}
impl Runnable for FwUploadingState {
    fn run(&mut self, ctx: &DeviceContext) -> Event {
        debug!("{} => FwUploading", ctx.address());
        let firmware = upload_stage(ctx, UploadTarget::Firmware);

        let status = if self.www.is_success() && firmware.is_success() {
            DeviceStatus::Completed
        } else {
            DeviceStatus::Failed
        };
        Event::Done(DoneEvent {
            ctx: ctx.clone(),
            status,
            www: Some(self.www.clone()),
            firmware: Some(firmware),
        })
    }
}

// Done State ==================================================================

/// Publishes the final status of the device and ends the event loop.
#[derive(Debug, Clone)]
pub(crate) struct DoneState {
    pub status: DeviceStatus,
    pub www: Option<StageOutcome>,
    pub firmware: Option<StageOutcome>,
    pub should_exit: bool,
}
impl Runnable for DoneState {
    fn run(&mut self, ctx: &DeviceContext) -> Event {
        debug!("{} => Done ({})", ctx.address(), self.status);
        let reporter = &ctx.reporter;
        reporter.clear_progress();
        reporter.status(self.status);

        let message = match self.status {
            DeviceStatus::Completed => "Device updated successfully!".to_owned(),
            DeviceStatus::UpToDate => "Device is up to date, nothing to do".to_owned(),
            DeviceStatus::UpdateAvailable => "Update available (check only)".to_owned(),
            DeviceStatus::Failed => format!(
                "Device update failed (WWW: {}, FW: {})",
                mark(&self.www),
                mark(&self.firmware)
            ),
            DeviceStatus::Pending
            | DeviceStatus::CheckingVersion
            | DeviceStatus::WwwUploading
            | DeviceStatus::WwwSuccess
            | DeviceStatus::WwwFailed
            | DeviceStatus::FwUploading
            | DeviceStatus::FwSuccess
            | DeviceStatus::FwFailed => {
                unreachable!("{} is not a terminal status", self.status)
            }
        };
        info!("{} => {}", ctx.address(), self.status);
        reporter.event(message, Some(self.status));

        Event::Exit(ExitEvent {
            ctx: ctx.clone(),
            status: self.status,
            www: self.www.clone(),
            firmware: self.firmware.clone(),
        })
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// Run one upload stage: start event, progress events while the image is
/// streamed, and exactly one concluding event.
///
/// The cancellation flag is checked before the stage starts; an upload in
/// flight is never interrupted.
fn upload_stage(ctx: &DeviceContext, target: UploadTarget) -> StageOutcome {
    let (uploading, succeeded, failed) = match target {
        UploadTarget::Www => (
            DeviceStatus::WwwUploading,
            DeviceStatus::WwwSuccess,
            DeviceStatus::WwwFailed,
        ),
        UploadTarget::Firmware => (
            DeviceStatus::FwUploading,
            DeviceStatus::FwSuccess,
            DeviceStatus::FwFailed,
        ),
    };
    let reporter = &ctx.reporter;

    if ctx.cancel.is_cancelled() {
        reporter.status(failed);
        reporter.event(
            format!("{} upload cancelled by user", target.tag()),
            Some(failed),
        );
        return StageOutcome::Cancelled;
    }

    let image = Arc::clone(ctx.images.image(target));
    let total = image.len() as u64;
    reporter.status(uploading);
    reporter.event(
        format!(
            "Starting {} upload ({})...",
            target.description(),
            format_bytes(total)
        ),
        Some(uploading),
    );

    let progress = reporter.track_upload(target, total);
    let result = ctx.api.upload(ctx.address(), target, image, progress);
    reporter.clear_progress();

    match result {
        Ok(sent) => {
            reporter.count_stage_success(target);
            reporter.status(succeeded);
            reporter.event(
                format!(
                    "{} uploaded successfully ({})",
                    target.tag(),
                    format_bytes(sent)
                ),
                Some(succeeded),
            );
            StageOutcome::Succeeded(sent)
        }
        Err(e) => {
            reporter.status(failed);
            reporter.event(
                format!("{} upload failed: {}", target.tag(), e),
                Some(failed),
            );
            StageOutcome::Failed(e)
        }
    }
}

fn mark(stage: &Option<StageOutcome>) -> &'static str {
    match stage {
        Some(StageOutcome::Succeeded(_)) => "✓",
        Some(StageOutcome::Failed(_)) | Some(StageOutcome::Cancelled) => "✗",
        None => "-",
    }
}
