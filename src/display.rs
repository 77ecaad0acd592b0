//! Front ends following a run: the full screen interface, the plain line
//! console and the final summary.
//!
//! Both front ends only read the shared [`FleetState`](crate::fleet::FleetState)
//! and drain the event channel; the only thing they may touch is the
//! cancellation handle.

mod canvas;
mod layout;
mod plain;
mod summary;
mod tui;

pub use canvas::{Canvas, Tone};
pub use layout::{draw_frame, progress_bar, status_symbol, status_tone, ActivityLog, View};
pub use plain::{styled_line, PlainConsole};
pub use summary::{exit_code, format_summary, EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_SUCCESS};
pub use tui::{terminal_fits, Tui, MIN_HEIGHT, MIN_WIDTH};
