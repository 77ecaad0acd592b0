//! Full screen terminal interface.

use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::{
    cursor::{Hide, Show},
    execute,
    terminal::{
        self, disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
    Result,
};
use log::{debug, info, warn};

use super::canvas::Canvas;
use super::layout::{draw_frame, ActivityLog, View};
use crate::fleet::{CancelHandle, EventReceiver, FleetState};
use crate::utils::{poll_key, Key};

/// Smallest terminal the layout is drawn in.
pub const MIN_WIDTH: u16 = 80;
pub const MIN_HEIGHT: u16 = 20;

const REFRESH: Duration = Duration::from_millis(100);
/// How long the final screen stays up when no key is pressed.
const FINAL_DISPLAY: Duration = Duration::from_secs(5);

/// Whether the current terminal is large enough for the interface.
pub fn terminal_fits() -> bool {
    match terminal::size() {
        Ok((width, height)) => {
            debug!("terminal is {}x{}", width, height);
            width >= MIN_WIDTH && height >= MIN_HEIGHT
        }
        Err(e) => {
            warn!("could not read the terminal size: {}", e);
            false
        }
    }
}

/// What the interface does after a key press.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Stay,
    /// Clear the whole screen before the next frame.
    Repaint,
    Leave,
}

/// Redraws the run every 100 ms and turns key presses into cancellation
/// requests. It never writes to the fleet state.
pub struct Tui {
    state: Arc<FleetState>,
    events: EventReceiver,
    cancel: CancelHandle,
    log: ActivityLog,
}
impl Tui {
    pub fn new(state: Arc<FleetState>, events: EventReceiver, cancel: CancelHandle) -> Self {
        Tui {
            state,
            events,
            cancel,
            log: ActivityLog::default(),
        }
    }

    /// Take over the terminal until the run is over and the final screen
    /// has been shown. `finished` tells whether the driver has returned.
    ///
    /// The terminal is restored even when drawing fails.
    pub fn run<F: Fn() -> bool>(&mut self, finished: F) -> Result<()> {
        let mut out = io::stdout();
        enable_raw_mode()?;
        if let Err(e) = execute!(out, EnterAlternateScreen, Hide) {
            disable_raw_mode()?;
            return Err(e);
        }

        let result = self.event_loop(&mut out, finished);

        let restored = execute!(out, Show, LeaveAlternateScreen);
        disable_raw_mode()?;
        result.and(restored)
    }

    /// Give the event receiver back, to hand it to another display.
    pub fn into_events(self) -> EventReceiver {
        self.events
    }

    fn event_loop<F: Fn() -> bool>(&mut self, out: &mut Stdout, finished: F) -> Result<()> {
        let mut done_at: Option<Instant> = None;
        loop {
            for event in self.events.drain() {
                self.log.push(&event);
            }
            self.render(out)?;

            if done_at.is_none() && finished() {
                done_at = Some(Instant::now());
            }

            match self.on_key(poll_key(REFRESH)?, done_at) {
                Step::Stay => {}
                Step::Repaint => execute!(out, Clear(ClearType::All))?,
                Step::Leave => break,
            }
        }
        Ok(())
    }

    /// React to a key press, or to its absence after `REFRESH`. `done_at` is
    /// when the driver was first seen finished.
    fn on_key(&self, key: Option<Key>, done_at: Option<Instant>) -> Step {
        match (key, done_at) {
            // Any key leaves the final screen.
            (Some(_), Some(_)) => Step::Leave,
            (Some(Key::Quit), None) => {
                if self.cancel.is_cancelled() {
                    info!("leaving the interface, the run stops after the current stage");
                    return Step::Leave;
                }
                info!("cancellation requested from the keyboard");
                self.cancel.cancel();
                Step::Stay
            }
            (Some(Key::Interrupt), None) => {
                if self.cancel.is_interrupted() {
                    return Step::Leave;
                }
                info!("interrupted from the keyboard");
                self.cancel.interrupt();
                Step::Stay
            }
            (Some(Key::Refresh), None) => Step::Repaint,
            (Some(Key::Other), None) | (None, None) => Step::Stay,
            (None, Some(at)) if at.elapsed() >= FINAL_DISPLAY => Step::Leave,
            (None, Some(_)) => Step::Stay,
        }
    }

    fn render(&self, out: &mut Stdout) -> Result<()> {
        let (width, height) = terminal::size()?;
        let mut canvas = Canvas::new(width, height);
        let view = View::capture(&self.state, self.cancel.is_cancelled());
        draw_frame(&mut canvas, &view, &self.log);
        canvas.present(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::channel;

    fn tui() -> Tui {
        let (_tx, rx) = channel();
        Tui::new(
            Arc::new(FleetState::new(&["10.0.0.1"])),
            rx,
            CancelHandle::new(),
        )
    }

    #[test]
    fn refresh_key_repaints_the_screen() {
        let tui = tui();
        assert_eq!(tui.on_key(Some(Key::Refresh), None), Step::Repaint);
        assert_eq!(tui.on_key(Some(Key::Other), None), Step::Stay);
        assert!(!tui.cancel.is_cancelled());
    }

    #[test]
    fn quit_cancels_then_leaves() {
        let tui = tui();
        assert_eq!(tui.on_key(Some(Key::Quit), None), Step::Stay);
        assert!(tui.cancel.is_cancelled() && !tui.cancel.is_interrupted());
        assert_eq!(tui.on_key(Some(Key::Quit), None), Step::Leave);
    }

    #[test]
    fn final_screen_closes_on_any_key_or_timeout() {
        let tui = tui();
        let now = Instant::now();
        assert_eq!(tui.on_key(Some(Key::Refresh), Some(now)), Step::Leave);
        assert_eq!(tui.on_key(None, Some(now)), Step::Stay);
        let long_ago = now - FINAL_DISPLAY;
        assert_eq!(tui.on_key(None, Some(long_ago)), Step::Leave);
    }
}
