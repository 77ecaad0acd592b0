//! Fleet level orchestration: the shared run state, the event trail and the
//! driver visiting devices one after the other.
//!
//! **Example** - Updating a fleet while another thread watches:
//! ```ignore
//! let (tx, rx) = fleet::channel();
//! let driver = FleetDriver::new(settings, api, images, addresses, tx);
//! let state = driver.state();
//! let worker = std::thread::spawn(move || driver.run());
//! // render `state` and `rx.drain()` until `worker` is done
//! ```

mod channel;
mod driver;
mod images;
mod records;
mod reporter;

pub use channel::{channel, EventReceiver, EventSender, UpdateEvent};
pub use driver::{CancelHandle, FleetDriver};
pub use images::Images;
pub use records::{
    DeviceRecord, DeviceStatus, FleetState, FleetStatistics, Progress, RecordStore, HISTORY_LEN,
};
pub use reporter::DeviceReporter;
