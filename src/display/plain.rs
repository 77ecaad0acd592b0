//! Line oriented output for `--no-tui` runs and small terminals.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use super::canvas::Tone;
use super::layout::status_tone;
use crate::fleet::{EventReceiver, FleetState, UpdateEvent};
use crate::utils::UploadTarget;

const REFRESH: Duration = Duration::from_millis(100);

/// Prints lifecycle events as they arrive and shows the upload in flight as
/// a progress bar.
pub struct PlainConsole {
    state: Arc<FleetState>,
    events: EventReceiver,
    upload: Option<ActiveUpload>,
}

struct ActiveUpload {
    address: String,
    target: UploadTarget,
    bar: ProgressBar,
}

impl PlainConsole {
    pub fn new(state: Arc<FleetState>, events: EventReceiver) -> Self {
        PlainConsole {
            state,
            events,
            upload: None,
        }
    }

    /// Follow the run until `finished` says the driver returned and every
    /// event has been printed.
    pub fn run<F: Fn() -> bool>(&mut self, finished: F) {
        loop {
            let done = finished();
            for event in self.events.drain() {
                if !event.progress {
                    self.print(&event);
                }
            }
            self.track_upload();
            if done {
                break;
            }
            thread::sleep(REFRESH);
        }
        if let Some(upload) = self.upload.take() {
            upload.bar.finish_and_clear();
        }
    }

    fn print(&self, event: &UpdateEvent) {
        let line = styled_line(event);
        match &self.upload {
            Some(upload) => upload.bar.println(line),
            None => println!("{}", line),
        }
    }

    /// Mirror the record carrying progress into the bar, replacing the bar
    /// when another transfer starts.
    fn track_upload(&mut self) {
        let current = self
            .state
            .records
            .snapshot()
            .into_iter()
            .find_map(|record| record.progress.map(|p| (record.address, p)));

        match (current, &self.upload) {
            (Some((address, progress)), Some(upload))
                if upload.address == address && upload.target == progress.target =>
            {
                upload.bar.set_position(progress.bytes_sent);
            }
            (Some((address, progress)), _) => {
                if let Some(previous) = self.upload.take() {
                    previous.bar.finish_and_clear();
                }
                let bar = ProgressBar::new(progress.total_bytes);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("{prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                        .progress_chars("=>-"),
                );
                bar.set_prefix(format!("{} {}", address, progress.target.tag()));
                bar.set_position(progress.bytes_sent);
                self.upload = Some(ActiveUpload {
                    address,
                    target: progress.target,
                    bar,
                });
            }
            (None, Some(_)) => {
                if let Some(previous) = self.upload.take() {
                    previous.bar.finish_and_clear();
                }
            }
            (None, None) => {}
        }
    }
}

/// The event line, coloured after the status it announces.
pub fn styled_line(event: &UpdateEvent) -> String {
    let line = event.to_string();
    match event.status.map(status_tone) {
        Some(Tone::Success) => style(line).green().to_string(),
        Some(Tone::Error) => style(line).red().to_string(),
        Some(Tone::Warning) => style(line).yellow().to_string(),
        Some(Tone::Progress) => style(line).cyan().to_string(),
        Some(Tone::Plain) | Some(Tone::Info) | Some(Tone::Header) | None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::{channel, DeviceStatus, Progress};

    #[test]
    fn follows_the_run_until_finished() {
        let state = Arc::new(FleetState::new(&["10.0.0.1"]));
        let (tx, rx) = channel();
        state.records.set_progress(
            "10.0.0.1",
            Some(Progress::new(UploadTarget::Www, 10, 100)),
        );
        tx.send(UpdateEvent::new("10.0.0.1", "Starting web interface upload (100.0B)...", None));
        tx.send(UpdateEvent::progress("10.0.0.1", "WWW upload: 10% - 10.0B/100.0B"));

        let mut console = PlainConsole::new(Arc::clone(&state), rx);
        console.run(|| true);

        assert!(console.upload.is_none());
        assert!(console.events.drain().is_empty());
    }

    #[test]
    fn lines_are_plain_without_colours() {
        console::set_colors_enabled(false);
        let event = UpdateEvent::new("10.0.0.1", "FW upload failed: timeout", Some(DeviceStatus::FwFailed));
        assert!(styled_line(&event).ends_with("10.0.0.1: FW upload failed: timeout"));
    }
}
