use std::time::Duration;

use crossterm::{
    event::{poll, read, Event, KeyCode, KeyEvent, KeyModifiers},
    Result,
};

/// Keys the terminal interface reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Key {
    /// `q`, `Q` or `Esc`.
    Quit,
    /// `Ctrl+C`, captured as a key while the terminal is in raw mode.
    Interrupt,
    /// `r` or `R`.
    Refresh,
    Other,
}

/// Wait up to `timeout` for a key press. The terminal must already be in raw
/// mode.
pub(crate) fn poll_key(timeout: Duration) -> Result<Option<Key>> {
    if !poll(timeout)? {
        // Timeout expired with no event
        return Ok(None);
    }

    // It's guaranteed that read() wont block if `poll` returns `Ok(true)`
    match read()? {
        Event::Key(event) => Ok(Some(classify(event))),
        _ => Ok(None),
    }
}

fn classify(event: KeyEvent) -> Key {
    match (event.code, event.modifiers) {
        (KeyCode::Char('c'), KeyModifiers::CONTROL) => Key::Interrupt,
        (KeyCode::Esc, _) | (KeyCode::Char('q'), _) | (KeyCode::Char('Q'), _) => Key::Quit,
        (KeyCode::Char('r'), _) | (KeyCode::Char('R'), _) => Key::Refresh,
        _ => Key::Other,
    }
}
