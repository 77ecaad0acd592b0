//! `updtrr` pushes new ESP-Miner firmware and AxeOS web interface images to a
//! fleet of Bitaxe miners over their HTTP API, one device after the other.
//!
//! For each device the version it runs is compared with the version embedded
//! in the firmware image; outdated devices (and devices whose version cannot
//! be told) get the web interface image then the firmware image. Devices can
//! be listed in a file or discovered on the local network.
//!
//! The per-device workflow is implemented as a state machine. State machines
//! are implemented in terms of **states** and **transitions** between them
//! with the following characteristics:
//!
//! * Can only be in one state at any time.
//! * Each state can have its own associated data if needed.
//! * It is possible to have some shared data between **all** states.
//! * Transitions between states are triggered via typed **events** and follow
//!   defined semantics.
//! * Only explicitly defined transitions are permitted and as many errors as
//!   possible are detected at **compile-time**.
//! * Data can be transferred from one state to the next by attaching it to the
//!   transition event.
//!
//! Transitions use the `From` trait to convert `event` types into `state`
//! types. Only transitions for which `From` is implemented are authorized.
//!
//! A run involves two threads: the [`FleetDriver`] visiting devices, and a
//! display ([`display::Tui`] or [`display::PlainConsole`]) that reads the
//! shared [`FleetState`] and drains the event channel.

pub mod discovery;
pub mod display;
pub mod fleet;
mod settings;
pub mod update_machine;
mod utils;

pub use fleet::{CancelHandle, FleetDriver, FleetState, FleetStatistics, Images};
pub use settings::{Settings, SettingsBuilder};
pub use utils::{
    describe_status, extract_binary_version, fetch_device_version, format_bytes, format_elapsed,
    is_update_required, load_addresses, load_image, locate_binary_version, needs_update,
    parse_addresses, parse_version, save_addresses, validate_image, DeviceApi, DeviceVersions,
    HttpDeviceApi, InputError, ProgressFn, SemanticVersion, TransportError, UploadTarget,
    VersionMatch, STATUS_PATH,
};
