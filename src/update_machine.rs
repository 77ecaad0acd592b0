//! Per-device update workflow: version check, web interface upload, firmware
//! upload.
//!
//! **Example** - Executing the state machine event loop for one device:
//! ```ignore
//! let ctx = DeviceContext { settings, api, images, reporter, cancel };
//! let mut update = update_machine::factory(ctx);
//! let outcome = update.run();
//! ```

mod events;
mod state_machine;
mod states;

pub use state_machine::{factory, DeviceContext, DeviceOutcome, DeviceUpdate, StageOutcome};
