//! What the full screen interface shows, independent of any terminal.

use std::collections::VecDeque;
use std::time::Duration;

use super::canvas::{Canvas, Tone};
use crate::fleet::{DeviceRecord, DeviceStatus, FleetState, FleetStatistics, UpdateEvent};
use crate::utils::{format_bytes, format_elapsed};

const TITLE: &str = "=== Bitaxe Firmware Updater ===";
/// Rows kept free under the device list for the activity log and footer.
const RESERVED_ROWS: u16 = 8;
/// Activity lines kept, and what is left after trimming.
const LOG_LIMIT: usize = 100;
const LOG_KEEP: usize = 50;

/// A consistent copy of everything a frame needs.
#[derive(Debug, Clone)]
pub struct View {
    pub stats: FleetStatistics,
    pub records: Vec<DeviceRecord>,
    /// One-based, `0` before the first device.
    pub current: usize,
    pub running: bool,
    pub elapsed: Option<Duration>,
    pub cancelling: bool,
}
impl View {
    pub fn capture(state: &FleetState, cancelling: bool) -> Self {
        View {
            stats: state.statistics(),
            records: state.records.snapshot(),
            current: state.current(),
            running: state.is_running(),
            elapsed: state.elapsed(),
            cancelling,
        }
    }
}

/// Most recent event lines.
#[derive(Debug, Default)]
pub struct ActivityLog {
    lines: VecDeque<String>,
}
impl ActivityLog {
    pub fn push(&mut self, event: &UpdateEvent) {
        self.lines.push_back(event.to_string());
        if self.lines.len() > LOG_LIMIT {
            let excess = self.lines.len() - LOG_KEEP;
            self.lines.drain(..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The last `count` lines, oldest first.
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &String> {
        self.lines.iter().skip(self.lines.len().saturating_sub(count))
    }
}

/// Three character marker shown in front of each device.
pub fn status_symbol(status: DeviceStatus) -> &'static str {
    match status {
        DeviceStatus::Pending => "...",
        DeviceStatus::CheckingVersion => " ? ",
        DeviceStatus::UpToDate => " = ",
        DeviceStatus::UpdateAvailable => "NEW",
        DeviceStatus::WwwUploading => "WWW",
        DeviceStatus::WwwSuccess => " + ",
        DeviceStatus::WwwFailed => " X ",
        DeviceStatus::FwUploading => " FW",
        DeviceStatus::FwSuccess => " + ",
        DeviceStatus::FwFailed => " X ",
        DeviceStatus::Completed => "OK!",
        DeviceStatus::Failed => "ERR",
    }
}

pub fn status_tone(status: DeviceStatus) -> Tone {
    match status {
        DeviceStatus::Pending | DeviceStatus::UpdateAvailable => Tone::Warning,
        DeviceStatus::CheckingVersion | DeviceStatus::WwwUploading | DeviceStatus::FwUploading => {
            Tone::Progress
        }
        DeviceStatus::UpToDate
        | DeviceStatus::WwwSuccess
        | DeviceStatus::FwSuccess
        | DeviceStatus::Completed => Tone::Success,
        DeviceStatus::WwwFailed | DeviceStatus::FwFailed | DeviceStatus::Failed => Tone::Error,
    }
}

/// `[=====     ]` over `width` columns, brackets included.
pub fn progress_bar(width: usize, percentage: u64) -> String {
    let inner = width.saturating_sub(2);
    let filled = ((percentage.min(100) as usize) * inner / 100).min(inner);
    format!("[{}{}]", "=".repeat(filled), " ".repeat(inner - filled))
}

/// Draw a whole frame: header, statistics, devices, activity, footer.
pub fn draw_frame(canvas: &mut Canvas, view: &View, log: &ActivityLog) {
    draw_header(canvas);
    let y = draw_stats(canvas, view, 3);
    let y = draw_devices(canvas, view, y);
    draw_logs(canvas, log, y);
    draw_footer(canvas, view);
}

fn draw_header(canvas: &mut Canvas) {
    let width = usize::from(canvas.width());
    let x = width.saturating_sub(TITLE.len()) / 2;
    canvas.put(0, x as u16, TITLE, Tone::Header, true);
    canvas.put(1, 0, &"-".repeat(width.saturating_sub(1).min(80)), Tone::Plain, false);
}

fn draw_stats(canvas: &mut Canvas, view: &View, y: u16) -> u16 {
    let stats = &view.stats;
    canvas.put(y, 0, "Statistics:", Tone::Info, true);

    let elapsed = view
        .elapsed
        .map(|e| format!(" | Elapsed: {}", format_elapsed(e)))
        .unwrap_or_default();
    canvas.put(
        y + 1,
        2,
        &format!("Progress: {}/{}{}", view.current, stats.total, elapsed),
        Tone::Plain,
        false,
    );

    let (label, tone) = match (view.running, view.cancelling) {
        (true, true) => ("CANCELLING", Tone::Warning),
        (true, false) => ("RUNNING", Tone::Progress),
        (false, _) if view.elapsed.is_none() => ("STARTING", Tone::Progress),
        (false, _) => ("COMPLETED", Tone::Success),
    };
    canvas.put(y + 2, 2, "Status: ", Tone::Plain, false);
    canvas.put(y + 2, 10, label, tone, true);

    let mut results = format!(
        "Completed: {} | WWW Success: {} | FW Success: {} | Failed: {} | Up to date: {}",
        stats.completed, stats.www_success, stats.fw_success, stats.failed, stats.up_to_date
    );
    if stats.update_available > 0 {
        results.push_str(&format!(" | Update available: {}", stats.update_available));
    }
    canvas.put(y + 3, 2, &results, Tone::Plain, false);

    y + 5
}

fn draw_devices(canvas: &mut Canvas, view: &View, y: u16) -> u16 {
    if view.records.is_empty() {
        return y;
    }
    canvas.put(y, 0, "Device Status:", Tone::Info, true);

    let height = canvas.height();
    let bottom = height.saturating_sub(RESERVED_ROWS);
    let mut row = y + 1;

    // Up to three rows per device; keep the device being processed visible.
    let fits = usize::from(bottom.saturating_sub(row) / 3).max(1);
    let shown = fits.min(view.records.len());
    let start = view
        .current
        .saturating_sub(shown)
        .min(view.records.len() - shown);

    let bar_room = usize::from(canvas.width()).saturating_sub(25);
    for record in view.records.iter().skip(start).take(shown) {
        if row >= bottom {
            break;
        }
        let line = format!(
            "{} {:<15} ",
            status_symbol(record.status),
            record.address
        );
        canvas.put(row, 2, &line, Tone::Plain, false);
        canvas.put(
            row,
            2 + line.chars().count() as u16,
            record.status.label(),
            status_tone(record.status),
            false,
        );
        row += 1;

        let uploading = matches!(
            record.status,
            DeviceStatus::WwwUploading | DeviceStatus::FwUploading
        );
        if let (true, Some(progress)) = (uploading, record.progress) {
            if row < bottom && bar_room > 20 {
                let bar_width = bar_room.min(40);
                let text = format!(
                    "{}: {} {}%",
                    progress.target.tag(),
                    progress_bar(bar_width, progress.percentage()),
                    progress.percentage()
                );
                canvas.put(row, 4, &text, Tone::Progress, false);
                if bar_room > 50 {
                    let bytes = format!(
                        "({}/{})",
                        format_bytes(progress.bytes_sent),
                        format_bytes(progress.total_bytes)
                    );
                    canvas.put(row, (4 + bar_width + 15) as u16, &bytes, Tone::Progress, false);
                }
                row += 1;
            }
        }

        if row < bottom {
            row += 1;
        }
    }
    row + 1
}

fn draw_logs(canvas: &mut Canvas, log: &ActivityLog, y: u16) {
    let height = canvas.height();
    if y + 2 >= height {
        return;
    }
    canvas.put(y, 0, "Recent Activity:", Tone::Info, true);

    let rows = usize::from(height - y - 3);
    let room = usize::from(canvas.width()).saturating_sub(4);
    for (offset, line) in log.recent(rows).enumerate() {
        let text: String = line.chars().take(room).collect();
        canvas.put(y + 1 + offset as u16, 2, &text, Tone::Plain, false);
    }
}

fn draw_footer(canvas: &mut Canvas, view: &View) {
    let row = canvas.height().saturating_sub(1);
    let width = usize::from(canvas.width());
    let text = match (view.running || view.elapsed.is_none(), view.cancelling) {
        (true, true) => "Cancelling after the current stage... | Press 'q' again to leave",
        (true, false) => "Press 'q' to quit | 'r' to refresh | Updates in progress...",
        (false, _) => "Press any key to leave | Updates completed",
    };
    canvas.put(row, 0, &" ".repeat(width), Tone::Header, false);
    let x = width.saturating_sub(text.len()) / 2;
    canvas.put(row, x as u16, text, Tone::Header, false);
}
