//! updtrr command line interface.

use std::fmt::Display;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Local;
use clap::{
    crate_description, crate_name, crate_version, value_t, App, AppSettings::*, Arg, ArgMatches,
};
use console::{style, Term};
use dialoguer::{theme::ColorfulTheme, Confirm};
use ipnet::Ipv4Net;
use log::{debug, error, info, trace, warn, LevelFilter};
use simplelog::*;

use updtrr::discovery::{Discoverer, TcpProbeScanner};
use updtrr::display::{
    exit_code, format_summary, terminal_fits, PlainConsole, Tui, EXIT_FAILURE, EXIT_INTERRUPTED,
    EXIT_SUCCESS, MIN_HEIGHT, MIN_WIDTH,
};
use updtrr::fleet::{self, CancelHandle, FleetDriver, Images};
use updtrr::{self as up, DeviceApi, HttpDeviceApi, InputError};

const LOG_FILE: &str = "updtrr.log";

fn main() {
    let matches = app().get_matches();

    let log_level = match matches.occurrences_of("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut use_tui = !matches.is_present("NO_TUI") && Term::stdout().is_term();
    let too_small = use_tui && !terminal_fits();
    if too_small {
        use_tui = false;
    }
    init_logging(log_level, use_tui);
    if too_small {
        warn!(
            "terminal smaller than {}x{}, falling back to plain output",
            MIN_WIDTH, MIN_HEIGHT
        );
    }

    trace!("{:#?}", matches);

    println!("{} v{}", style("updtrr").bold(), crate_version!());

    // Arguments ===============================================================

    let files: Vec<PathBuf> = matches
        .values_of("FILES")
        .map(|values| values.map(PathBuf::from).collect())
        .unwrap_or_default();
    let discover = matches.is_present("DISCOVER");
    let (device_list, firmware, www) = match files.as_slice() {
        [list, firmware, www] => (Some(list.clone()), firmware.clone(), www.clone()),
        [firmware, www] if discover => (None, firmware.clone(), www.clone()),
        [_, _] => fail("a device list is required unless --discover is given"),
        _ => unreachable!("clap enforces two or three files"),
    };

    let network = matches.value_of("NETWORK").map(|text| {
        text.parse::<Ipv4Net>().unwrap_or_else(|e| {
            fail(format!(
                "`{}` is not a valid network ({}), expected e.g. 192.168.1.0/24",
                text, e
            ))
        })
    });

    let settings = up::SettingsBuilder::new()
        .timeout(seconds(&matches, "TIMEOUT", "timeout"))
        .device_delay(seconds(&matches, "DEVICE_DELAY", "device-delay"))
        .upload_delay(seconds(&matches, "UPLOAD_DELAY", "upload-delay"))
        .scan_timeout(seconds(&matches, "SCAN_TIMEOUT", "scan-timeout"))
        .force(matches.is_present("FORCE"))
        .check_only(matches.is_present("CHECK_ONLY"))
        .firmware_image(firmware)
        .www_image(www)
        .finalize();
    debug!("{:?}", settings);

    // END - Arguments =========================================================

    let cancel = CancelHandle::new();
    let handler_cancel = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if handler_cancel.is_interrupted() {
            process::exit(EXIT_INTERRUPTED);
        }
        println!(
            "🛑 received Ctrl+C, stopping after the current stage (again to quit now)"
        );
        handler_cancel.interrupt();
    }) {
        warn!("could not install the Ctrl+C handler: {}", e);
    }

    // Images are validated before any device is contacted.
    let images = Images::from_settings(&settings).unwrap_or_else(|e| fail(e));
    match images.firmware_version {
        Some(version) => println!("Firmware image version: {}", style(format!("v{}", version)).cyan()),
        None => println!(
            "{}",
            style("No version found in the firmware image, every device will be updated").yellow()
        ),
    }

    let api: Arc<dyn DeviceApi> =
        Arc::new(HttpDeviceApi::new(settings.timeout).unwrap_or_else(|e| fail(e)));

    let addresses = if discover {
        discover_devices(&matches, &api, network, &settings, device_list.as_deref())
    } else {
        device_list
            .as_deref()
            .map(load_device_list)
            .unwrap_or_else(|| fail(InputError::NoDevices))
    };
    if cancel.is_interrupted() {
        println!("Update interrupted by user");
        process::exit(EXIT_INTERRUPTED);
    }
    info!("{} device(s) to process", addresses.len());

    // Run the fleet driver ====================================================

    let (tx, rx) = fleet::channel();
    let driver = FleetDriver::new(settings, api, Arc::new(images), addresses, tx)
        .with_cancel_handle(cancel.clone());
    let state = driver.state();
    let worker = thread::Builder::new()
        .name("fleet-driver".into())
        .spawn(move || driver.run())
        .unwrap_or_else(|e| fail(format!("could not start the update thread: {}", e)));

    let rx = if use_tui {
        let mut tui = Tui::new(Arc::clone(&state), rx, cancel.clone());
        match tui.run(|| worker.is_finished()) {
            Ok(()) => None,
            Err(e) => {
                error!("terminal interface failed: {}", e);
                println!("{}: {}, continuing in plain mode", style("error").red(), e);
                Some(tui.into_events())
            }
        }
    } else {
        Some(rx)
    };
    if let Some(rx) = rx {
        PlainConsole::new(Arc::clone(&state), rx).run(|| worker.is_finished());
    }

    let stats = worker
        .join()
        .unwrap_or_else(|_| fail("the update thread panicked, see updtrr.log"));

    let interrupted = cancel.is_interrupted();
    println!("{}", format_summary(&stats, state.elapsed(), interrupted));
    let code = exit_code(&stats, interrupted);
    debug!("exit code: {}", code);
    process::exit(code);
}

/// The command line accepted by `updtrr`.
fn app<'a, 'b>() -> App<'a, 'b> {
    App::new(crate_name!())
        .version(concat!("v", env!("CARGO_PKG_VERSION")))
        .about(crate_description!())
        .long_about(
            "\n\
            Updates the ESP-Miner firmware and the AxeOS web interface of a \
            fleet of Bitaxe miners, one device after the other.\n\
            \n\
            For every device: \n\
               \t* the firmware version it runs is compared with the version \
                   found in the firmware image (skipped with --force) \n\
               \t* the web interface image is posted to /api/system/OTAWWW \n\
               \t* the firmware image is posted to /api/system/OTA \n\
            \n\
            Devices already running the image version or newer are left \
            alone. Devices are read from a list file (one address per line or \
            the first column of a CSV file) or discovered on the local \
            network with --discover.\n\
            \n\
            Positional arguments are [DEVICE_LIST] FIRMWARE WWW; the device \
            list can be omitted when --discover is given, in which case it is \
            used as a fallback when nothing is discovered.\
        ",
        )
        .max_term_width(80)
        .setting(ColoredHelp)
        .setting(NextLineHelp)
        .arg(
            Arg::with_name("FILES")
                .help("[DEVICE_LIST] FIRMWARE_IMAGE WWW_IMAGE")
                .long_help(
                    "the device list file (optional with --discover), the \
                     ESP-Miner firmware image (esp-miner.bin) and the web \
                     interface image (www.bin), in that order",
                )
                .required(true)
                .multiple(true)
                .min_values(2)
                .max_values(3)
                .index(1),
        )
        .arg(
            Arg::with_name("TIMEOUT")
                .help("HTTP timeout in seconds")
                .long("timeout")
                .takes_value(true)
                .default_value("60"),
        )
        .arg(
            Arg::with_name("DEVICE_DELAY")
                .help("seconds to wait between two devices")
                .long("device-delay")
                .takes_value(true)
                .default_value("10"),
        )
        .arg(
            Arg::with_name("UPLOAD_DELAY")
                .help("seconds to wait between the web interface and firmware uploads")
                .long("upload-delay")
                .takes_value(true)
                .default_value("5"),
        )
        .arg(
            Arg::with_name("FORCE")
                .help("update every device without checking its version")
                .long("force"),
        )
        .arg(
            Arg::with_name("CHECK_ONLY")
                .help("only report which devices need the update, upload nothing")
                .long("check-only"),
        )
        .arg(
            Arg::with_name("DISCOVER")
                .help("discover the miners on the local network")
                .long("discover"),
        )
        .arg(
            Arg::with_name("NETWORK")
                .help("network to scan, e.g. 192.168.1.0/24")
                .long_help(
                    "network to scan, e.g. 192.168.1.0/24; when not set, the \
                     /24 network of the default gateway is scanned.",
                )
                .long("network")
                .takes_value(true)
                .requires("DISCOVER"),
        )
        .arg(
            Arg::with_name("SCAN_TIMEOUT")
                .help("seconds to wait for each host during discovery")
                .long("scan-timeout")
                .takes_value(true)
                .default_value("2"),
        )
        .arg(
            Arg::with_name("SAVE_DISCOVERED")
                .help("write the discovered addresses to this file")
                .long("save-discovered")
                .takes_value(true)
                .requires("DISCOVER"),
        )
        .arg(
            Arg::with_name("YES")
                .help("do not ask for confirmation of the discovered devices")
                .short("y")
                .long("yes"),
        )
        .arg(
            Arg::with_name("NO_TUI")
                .help("print events line by line instead of the full screen interface")
                .long("no-tui"),
        )
        .arg(Arg::with_name("v").short("v").multiple(true).help(
            "Sets the logging level of verbosity, repeat several times for \
                higher verbosity",
        ))
}

/// Terminal logging in plain mode, and a log file in any case; the full
/// screen interface owns the terminal.
fn init_logging(level: LevelFilter, use_tui: bool) {
    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    if !use_tui {
        loggers.push(TermLogger::new(
            level,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ));
    }
    let file = OpenOptions::new().create(true).append(true).open(LOG_FILE);
    let file_error = match file {
        Ok(file) => {
            loggers.push(WriteLogger::new(
                level.max(LevelFilter::Info),
                Config::default(),
                file,
            ));
            None
        }
        Err(e) => Some(e),
    };

    if let Err(e) = CombinedLogger::init(loggers) {
        println!("{}: could not set up logging: {}", style("warning").yellow(), e);
    }
    if let Some(e) = file_error {
        warn!("could not open {}: {}", LOG_FILE, e);
    }
}

/// Parse a duration option given in (possibly fractional) seconds.
fn seconds(matches: &ArgMatches, name: &str, flag: &str) -> Duration {
    match value_t!(matches, name, f64) {
        Ok(value) if value.is_finite() && value >= 0.0 => Duration::from_secs_f64(value),
        _ => {
            println!(
                "{}: `{}` needs to be a positive number of seconds",
                style("error").red(),
                style(flag).cyan()
            );
            println!(
                "   {} `{}` is not a valid value",
                style("-->").cyan(),
                style(matches.value_of(name).unwrap_or_default()).on_red()
            );
            process::exit(EXIT_FAILURE);
        }
    }
}

fn load_device_list(path: &Path) -> Vec<String> {
    let addresses = up::load_addresses(path).unwrap_or_else(|e| fail(e));
    println!(
        "Loaded {} device(s) from {}",
        style(addresses.len()).cyan(),
        path.display()
    );
    addresses
}

/// Discover the miners, fall back to the device list when nothing answers,
/// and have the operator confirm the list unless told not to.
fn discover_devices(
    matches: &ArgMatches,
    api: &Arc<dyn DeviceApi>,
    network: Option<Ipv4Net>,
    settings: &up::Settings,
    fallback: Option<&Path>,
) -> Vec<String> {
    println!("🔍 Discovering miners, this may take a while...");
    let discoverer = Discoverer::new(
        Arc::clone(api),
        Box::new(TcpProbeScanner::default()),
        settings.scan_timeout,
    );
    let found = discoverer.discover(network);

    if found.is_empty() {
        println!("{}", style("No miners discovered").yellow());
        return match fallback {
            Some(path) => load_device_list(path),
            None => fail(InputError::NoDevices),
        };
    }

    println!("Discovered {} miner(s):", style(found.len()).cyan());
    for address in found.iter() {
        println!("  - {}", address);
    }

    if let Some(path) = matches.value_of("SAVE_DISCOVERED") {
        match up::save_addresses(Path::new(path), &found, Local::now()) {
            Ok(()) => println!("Saved the discovered devices to {}", style(path).cyan()),
            Err(e) => println!("{}: {}", style("warning").yellow(), e),
        }
    }

    if matches.is_present("YES") || settings.check_only {
        return found;
    }
    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Update these {} device(s)?", found.len()))
        .default(true)
        .interact_on(&Term::stdout());
    match confirmed {
        Ok(true) => found,
        Ok(false) => {
            println!("Nothing updated");
            process::exit(EXIT_SUCCESS);
        }
        Err(e) => fail(format!("could not read the confirmation: {}", e)),
    }
}

/// Report a fatal error before the run started and exit.
fn fail(message: impl Display) -> ! {
    error!("{}", message);
    println!("{}: {}", style("error").red().bold(), message);
    process::exit(EXIT_FAILURE);
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ArgMatches<'static>, clap::Error> {
        app().get_matches_from_safe(std::iter::once("updtrr").chain(args.iter().copied()))
    }

    #[test]
    fn device_list_run_needs_no_discovery() {
        let matches = parse(&["devices.csv", "esp-miner.bin", "www.bin"]).unwrap();

        assert!(!matches.is_present("DISCOVER"));
        assert_eq!(
            matches.values_of("FILES").unwrap().collect::<Vec<_>>(),
            vec!["devices.csv", "esp-miner.bin", "www.bin"]
        );
        assert_eq!(
            seconds(&matches, "SCAN_TIMEOUT", "scan-timeout"),
            Duration::from_secs(2)
        );
        assert_eq!(
            seconds(&matches, "DEVICE_DELAY", "device-delay"),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn discovery_options() {
        let matches = parse(&[
            "--discover",
            "--network",
            "192.168.1.0/24",
            "--scan-timeout",
            "0.5",
            "esp-miner.bin",
            "www.bin",
        ])
        .unwrap();
        assert_eq!(
            seconds(&matches, "SCAN_TIMEOUT", "scan-timeout"),
            Duration::from_millis(500)
        );

        assert!(parse(&["--network", "192.168.1.0/24", "a.csv", "fw.bin", "www.bin"]).is_err());
        assert!(parse(&["fw.bin"]).is_err());
    }
}
