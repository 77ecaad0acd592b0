//! End of run report and exit status.

use std::time::Duration;

use console::style;

use crate::fleet::FleetStatistics;
use crate::utils::format_elapsed;

/// Process exit status of an interrupted run.
pub const EXIT_INTERRUPTED: i32 = 130;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_SUCCESS: i32 = 0;

/// `0` when every device ended well, `130` when the operator interrupted the
/// run, `1` otherwise.
pub fn exit_code(stats: &FleetStatistics, interrupted: bool) -> i32 {
    if interrupted {
        EXIT_INTERRUPTED
    } else if stats.all_succeeded() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    }
}

/// The multi-line summary printed once the terminal is given back.
pub fn format_summary(
    stats: &FleetStatistics,
    elapsed: Option<Duration>,
    interrupted: bool,
) -> String {
    let mut lines = vec![String::new(), style("Update summary").bold().to_string()];
    if interrupted {
        lines.push(style("  Update interrupted by user").yellow().to_string());
    }
    if let Some(elapsed) = elapsed {
        lines.push(format!("  Elapsed:          {}", format_elapsed(elapsed)));
    }

    let counter = |label: &str, value: usize| format!("  {:<18}{}", label, value);
    lines.push(counter("Total devices:", stats.total));
    lines.push(style(counter("Completed:", stats.completed)).green().to_string());
    lines.push(counter("WWW success:", stats.www_success));
    lines.push(counter("FW success:", stats.fw_success));
    lines.push(counter("Up to date:", stats.up_to_date));
    if stats.update_available > 0 {
        lines.push(
            style(counter("Update available:", stats.update_available))
                .yellow()
                .to_string(),
        );
    }
    let failed = counter("Failed:", stats.failed);
    lines.push(if stats.failed > 0 {
        style(failed).red().to_string()
    } else {
        failed
    });

    if !stats.both_failed.is_empty() {
        lines.push(String::new());
        lines.push(
            style("Devices where both uploads failed:")
                .red()
                .bold()
                .to_string(),
        );
        for address in stats.both_failed.iter() {
            lines.push(format!("  - {}", address));
        }
    }
    lines.join("\n")
}
