//! Per-device update state machine.
//!
//! One machine runs per device and per run. Stages are strictly sequential and
//! every stage is attempted once; a failed upload is never retried within the
//! same visit.
//!
//! ```text
//!                    START
//!                      |
//!                      v
//!                 .---------.       force
//!                 |  Init   |-----------------------.
//!                 '---------'                       |
//!                      |                            |
//!                      v                            |
//!             .-----------------.  up to date /     |
//!             | CheckingVersion |--check only----.  |
//!             '-----------------'                |  |
//!                      | update needed           |  |
//!                      v                         |  |
//!               .--------------.<----------------+--'
//!               | WwwUploading |                 |
//!               '--------------'                 |
//!                      | success: wait upload    |
//!                      | delay; failure: no wait |
//!                      v                         |
//!               .-------------.                  |
//!               | FwUploading |                  |
//!               '-------------'                  |
//!                      |                         |
//!                      v                         |
//!                  .------.                      |
//!                  | Done |<---------------------'
//!                  '------'
//!                      |
//!                      v
//!                     END
//! ```
//!
//! The `Done` state publishes one of the terminal statuses `UP_TO_DATE`,
//! `UPDATE_AVAILABLE`, `COMPLETED` (both uploads accepted) or `FAILED`.

use std::fmt;
use std::sync::Arc;

use super::events::*;
use super::states::*;
use crate::fleet::{CancelHandle, DeviceReporter, DeviceStatus, Images};
use crate::settings::Settings;
use crate::utils::{DeviceApi, TransportError};

// =============================================================================
// Public Interface
// =============================================================================

/// Everything a device's state machine needs, shared by all of its states.
#[derive(Clone)]
pub struct DeviceContext {
    pub settings: Settings,
    pub api: Arc<dyn DeviceApi>,
    pub images: Arc<Images>,
    pub reporter: DeviceReporter,
    pub cancel: CancelHandle,
}
impl DeviceContext {
    pub fn address(&self) -> &str {
        self.reporter.address()
    }
}
impl fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("address", &self.address())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// How one upload stage concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The device accepted the image; carries the number of bytes sent.
    Succeeded(u64),
    Failed(TransportError),
    /// Not attempted because the run was cancelled.
    Cancelled,
}
impl StageOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Succeeded(_))
    }
}

/// Result of a device visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOutcome {
    pub address: String,
    /// Always a terminal status.
    pub status: DeviceStatus,
    /// `None` when the stage was never reached.
    pub www: Option<StageOutcome>,
    pub firmware: Option<StageOutcome>,
}
impl DeviceOutcome {
    /// Both uploads were attempted and the device rejected both. Stages
    /// skipped by a cancellation do not count.
    pub fn both_failed(&self) -> bool {
        matches!(
            (&self.www, &self.firmware),
            (Some(StageOutcome::Failed(_)), Some(StageOutcome::Failed(_)))
        )
    }
}

/// Represents the update state machine of a single device. Use the
/// `factory()` function to get an instance then run it by calling its `run()`
/// method.
pub struct DeviceUpdate {
    sm: UpdateStates,
}
impl DeviceUpdate {
    /// The event loop runs until the `Done` state is reached and its
    /// `should_exit` flag is set, then hands back the device outcome.
    pub fn run(&mut self) -> DeviceOutcome {
        loop {
            self.sm = self.sm.step();
            if let UpdateStates::Done(sm) = &self.sm {
                if sm.state.should_exit {
                    return DeviceOutcome {
                        address: sm.ctx.address().to_owned(),
                        status: sm.state.status,
                        www: sm.state.www.clone(),
                        firmware: sm.state.firmware.clone(),
                    };
                }
            }
        }
    }
}

/// Factory function for the update state machine of the device described by
/// `ctx`.
pub fn factory(ctx: DeviceContext) -> DeviceUpdate {
    DeviceUpdate {
        // The same machine naturally starts in the `Init` state.
        sm: UpdateStates::Init(UpdateSM::new(ctx)),
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// The raw state machine. The generic state type carries per-state data while
/// `ctx` is shared by all states.
#[derive(Debug)]
struct UpdateSM<S: Runnable> {
    ctx: DeviceContext,
    state: S,
}
impl<S: Runnable> UpdateSM<S> {
    fn run(&mut self) -> Event {
        self.state.run(&self.ctx)
    }
}

/// The state machine starts in the `InitState`.
impl UpdateSM<InitState> {
    fn new(ctx: DeviceContext) -> Self {
        UpdateSM {
            ctx,
            state: InitState {},
        }
    }
}

/// An enum wrapper around the states of the update state machine, used for
/// pattern matching during state transitions.
enum UpdateStates {
    Init(UpdateSM<InitState>),
    CheckingVersion(UpdateSM<CheckingVersionState>),
    WwwUploading(UpdateSM<WwwUploadingState>),
    FwUploading(UpdateSM<FwUploadingState>),
    Done(UpdateSM<DoneState>),
}
impl UpdateStates {
    /// The unit of work in the state machine event loop: run the current state
    /// and turn the event it returns into the next state. Transitions are
    /// `From` implementations, so a state/event mismatch that has no
    /// implementation does not compile.
    fn step(&mut self) -> Self {
        match self {
            UpdateStates::Init(sm) => {
                let event = sm.run();
                match event {
                    Event::CheckVersion(ev) => UpdateStates::CheckingVersion(ev.into()),
                    Event::UploadWww(ev) => UpdateStates::WwwUploading(ev.into()),
                    Event::Done(ev) => UpdateStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            UpdateStates::CheckingVersion(sm) => {
                let event = sm.run();
                match event {
                    Event::UploadWww(ev) => UpdateStates::WwwUploading(ev.into()),
                    Event::Done(ev) => UpdateStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            UpdateStates::WwwUploading(sm) => {
                let event = sm.run();
                match event {
                    Event::UploadFirmware(ev) => UpdateStates::FwUploading(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            UpdateStates::FwUploading(sm) => {
                let event = sm.run();
                match event {
                    Event::Done(ev) => UpdateStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            UpdateStates::Done(sm) => {
                let event = sm.run();
                match event {
                    Event::Exit(ev) => UpdateStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// State from Event transitions
// -----------------------------------------------------------------------------

impl From<CheckVersionEvent> for UpdateSM<CheckingVersionState> {
    fn from(event: CheckVersionEvent) -> UpdateSM<CheckingVersionState> {
        UpdateSM {
            ctx: event.ctx,
            state: CheckingVersionState {},
        }
    }
}

impl From<UploadWwwEvent> for UpdateSM<WwwUploadingState> {
    fn from(event: UploadWwwEvent) -> UpdateSM<WwwUploadingState> {
        UpdateSM {
            ctx: event.ctx,
            state: WwwUploadingState {},
        }
    }
}

impl From<UploadFirmwareEvent> for UpdateSM<FwUploadingState> {
    fn from(event: UploadFirmwareEvent) -> UpdateSM<FwUploadingState> {
        UpdateSM {
            ctx: event.ctx,
            state: FwUploadingState { www: event.www },
        }
    }
}

impl From<DoneEvent> for UpdateSM<DoneState> {
    fn from(event: DoneEvent) -> UpdateSM<DoneState> {
        UpdateSM {
            ctx: event.ctx,
            state: DoneState {
                status: event.status,
                www: event.www,
                firmware: event.firmware,
                should_exit: false,
            },
        }
    }
}
impl From<ExitEvent> for UpdateSM<DoneState> {
    fn from(event: ExitEvent) -> UpdateSM<DoneState> {
        UpdateSM {
            ctx: event.ctx,
            state: DoneState {
                status: event.status,
                www: event.www,
                firmware: event.firmware,
                should_exit: true,
            },
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
