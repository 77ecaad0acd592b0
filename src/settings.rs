//! Settings shared by every stage of a fleet update run.
//!
//! Use the [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
//! pattern to set the configurable values.

use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// Public Interface
// =============================================================================

/// Groups all settings of an `updtrr` run and acts as a
/// [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
/// for them.
///
/// The same `Settings` value is handed to the fleet driver and from there to
/// every per-device state machine, so each stage reads its delays and mode
/// flags from here rather than from global state.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Settings {
    /// Timeout applied to every single HTTP call (status query or upload).
    pub timeout: Duration,
    /// Pause observed before every device except the first one.
    pub device_delay: Duration,
    /// Pause between a successful web interface upload and the firmware upload.
    pub upload_delay: Duration,
    /// Skip the version check and always upload.
    pub force: bool,
    /// Only check versions, never upload anything.
    pub check_only: bool,
    /// Timeout of the status query used to verify discovered hosts.
    pub scan_timeout: Duration,

    /// Path to the ESP-Miner firmware image.
    pub firmware_image: Option<PathBuf>,
    /// Path to the web interface (`www.bin`) image.
    pub www_image: Option<PathBuf>,

    /// Restrict creation of `Settings` instances unless through the
    /// `SettingsBuilder`.
    #[doc(hidden)]
    _private_use_builder: (),
}

/// The builder for the `Settings` values.
///
/// All values are optional and have default values that will be used if not
/// explicitly set.
///
/// **Example**
///
/// ```
/// use std::time::Duration;
/// use updtrr::SettingsBuilder;
///
/// let settings = SettingsBuilder::new()
///     .timeout(Duration::from_secs(120))
///     .force(true)
///     .finalize();
/// assert!(settings.force);
/// ```
pub struct SettingsBuilder {
    settings: Settings,
}
impl SettingsBuilder {
    /// Start building the settings using default values and no image paths.
    pub fn new() -> Self {
        SettingsBuilder {
            settings: Settings {
                timeout: Duration::from_secs(60),
                device_delay: Duration::from_secs(10),
                upload_delay: Duration::from_secs(5),
                force: false,
                check_only: false,
                scan_timeout: Duration::from_secs(2),
                firmware_image: None,
                www_image: None,
                _private_use_builder: (),
            },
        }
    }

    /// Set the per-call HTTP timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = timeout;
        self
    }

    /// Set the pause between two devices
    pub fn device_delay(mut self, delay: Duration) -> Self {
        self.settings.device_delay = delay;
        self
    }

    /// Set the pause between the web interface and the firmware uploads
    pub fn upload_delay(mut self, delay: Duration) -> Self {
        self.settings.upload_delay = delay;
        self
    }

    /// Always upload, whatever the device reports as its version
    pub fn force(mut self, force: bool) -> Self {
        self.settings.force = force;
        self
    }

    /// Stop after the version check
    pub fn check_only(mut self, check_only: bool) -> Self {
        self.settings.check_only = check_only;
        self
    }

    /// Set the status query timeout used while verifying discovered hosts
    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.settings.scan_timeout = timeout;
        self
    }

    /// Set the path to the firmware image
    pub fn firmware_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.firmware_image = Some(path.into());
        self
    }

    /// Set the path to the web interface image
    pub fn www_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.www_image = Some(path.into());
        self
    }

    pub fn finalize(self) -> Settings {
        self.settings
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn all_default() {
    let settings = SettingsBuilder::new().finalize();
    assert_eq!(
        settings,
        Settings {
            timeout: Duration::from_secs(60),
            device_delay: Duration::from_secs(10),
            upload_delay: Duration::from_secs(5),
            force: false,
            check_only: false,
            scan_timeout: Duration::from_secs(2),
            firmware_image: None,
            www_image: None,
            _private_use_builder: (),
        }
    )
}

#[test]
fn timeout() {
    let settings = SettingsBuilder::new()
        .timeout(Duration::from_secs(120))
        .finalize();
    assert_eq!(settings.timeout, Duration::from_secs(120));
}

#[test]
fn delays() {
    let settings = SettingsBuilder::new()
        .device_delay(Duration::from_secs(15))
        .upload_delay(Duration::ZERO)
        .finalize();
    assert_eq!(settings.device_delay, Duration::from_secs(15));
    assert_eq!(settings.upload_delay, Duration::ZERO);
}

#[test]
fn modes() {
    let settings = SettingsBuilder::new().force(true).check_only(true).finalize();
    assert!(settings.force);
    assert!(settings.check_only);
}

#[test]
fn images() {
    let settings = SettingsBuilder::new()
        .firmware_image("esp-miner.bin")
        .www_image("www.bin")
        .finalize();
    assert_eq!(settings.firmware_image.unwrap(), PathBuf::from("esp-miner.bin"));
    assert_eq!(settings.www_image.unwrap(), PathBuf::from("www.bin"));
}
