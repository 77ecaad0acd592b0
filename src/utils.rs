//! Helper functions: device HTTP access, input files, versions and
//! formatting.

mod device_api;
mod format;
mod inputs;
mod keyboard;
mod version;

pub use device_api::{
    describe_status, DeviceApi, HttpDeviceApi, ProgressFn, TransportError, UploadTarget,
    STATUS_PATH,
};
pub use format::{format_bytes, format_elapsed};
pub use inputs::{
    load_addresses, load_image, parse_addresses, save_addresses, validate_image, InputError,
};
pub(crate) use keyboard::{poll_key, Key};
pub use version::{
    extract_binary_version, fetch_device_version, is_update_required, locate_binary_version,
    needs_update, parse_version, DeviceVersions, SemanticVersion, VersionMatch,
};
