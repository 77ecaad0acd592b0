//! The two images pushed to every device, loaded once per run.

use std::path::Path;
use std::sync::Arc;

use hexplay::HexViewBuilder;
use log::{debug, info, log_enabled, warn, Level::Debug};

use crate::settings::Settings;
use crate::utils::{format_bytes, load_image, locate_binary_version, InputError};
use crate::utils::{validate_image, SemanticVersion, UploadTarget};

/// Bytes shown around an extracted version at debug level.
const HEX_CONTEXT: usize = 32;

/// Firmware and web interface images, with the version the firmware carries.
#[derive(Debug, Clone)]
pub struct Images {
    pub firmware: Arc<[u8]>,
    pub www: Arc<[u8]>,
    /// `None` when no version could be found in the firmware image, in which
    /// case every device is considered outdated.
    pub firmware_version: Option<SemanticVersion>,
}
impl Images {
    /// Validate both images before reading either of them.
    pub fn load(firmware: &Path, www: &Path) -> Result<Self, InputError> {
        validate_image(firmware)?;
        validate_image(www)?;

        let images = Images::from_bytes(load_image(firmware)?, load_image(www)?);
        info!(
            "Firmware file: {} ({})",
            firmware.display(),
            format_bytes(images.firmware.len() as u64)
        );
        info!(
            "Web interface file: {} ({})",
            www.display(),
            format_bytes(images.www.len() as u64)
        );
        Ok(images)
    }

    /// Load the images the settings point at.
    pub fn from_settings(settings: &Settings) -> Result<Self, InputError> {
        let firmware = settings
            .firmware_image
            .as_deref()
            .ok_or(InputError::ImageMissing("firmware"))?;
        let www = settings
            .www_image
            .as_deref()
            .ok_or(InputError::ImageMissing("web interface"))?;
        Images::load(firmware, www)
    }

    pub fn from_bytes(firmware: Arc<[u8]>, www: Arc<[u8]>) -> Self {
        let firmware_version = match locate_binary_version(&firmware) {
            Some(found) => {
                info!("Firmware image version: v{}", found.version);
                if log_enabled!(Debug) {
                    let start = found.offset.saturating_sub(HEX_CONTEXT);
                    let end = (found.offset + found.len + HEX_CONTEXT).min(firmware.len());
                    let view = HexViewBuilder::new(&firmware[start..end])
                        .address_offset(start)
                        .row_width(16)
                        .finish();
                    debug!("version found at {:#x}:\n{}", found.offset, view);
                }
                Some(found.version)
            }
            None => {
                warn!("No version found in the firmware image, every device will be updated");
                None
            }
        };

        Images {
            firmware,
            www,
            firmware_version,
        }
    }

    pub fn image(&self, target: UploadTarget) -> &Arc<[u8]> {
        match target {
            UploadTarget::Www => &self.www,
            UploadTarget::Firmware => &self.firmware,
        }
    }
}
