//! Input files: the device list and the two images.
//!
//! Everything here runs before the first device is contacted, so every error
//! is fatal for the run.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use thiserror::Error;

/// Problems with the inputs of a run.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("device list not found: {}", .0.display())]
    DeviceListNotFound(PathBuf),
    #[error("error reading device list {}: {}", .path.display(), .source)]
    DeviceListUnreadable { path: PathBuf, source: io::Error },
    #[error("no IP addresses found in {}", .0.display())]
    NoAddresses(PathBuf),
    #[error("no {0} image given")]
    ImageMissing(&'static str),
    #[error("binary file not found: {}", .0.display())]
    ImageNotFound(PathBuf),
    #[error("binary file is empty: {}", .0.display())]
    ImageEmpty(PathBuf),
    #[error("cannot read binary file {}: {}", .path.display(), .source)]
    ImageUnreadable { path: PathBuf, source: io::Error },
    #[error("cannot save discovered devices to {}: {}", .path.display(), .source)]
    SaveFailed { path: PathBuf, source: io::Error },
    #[error("no devices to update")]
    NoDevices,
}

/// Load the device addresses from `path`.
///
/// The file is either one address per line, or comma separated values of
/// which only the first column is used. The format is picked by looking for a
/// comma anywhere in the file. In both formats blank lines and lines starting
/// with `#` are ignored.
pub fn load_addresses(path: &Path) -> Result<Vec<String>, InputError> {
    if !path.exists() {
        return Err(InputError::DeviceListNotFound(path.to_owned()));
    }
    let content = fs::read_to_string(path).map_err(|source| InputError::DeviceListUnreadable {
        path: path.to_owned(),
        source,
    })?;

    let addresses = parse_addresses(&content);
    if addresses.is_empty() {
        return Err(InputError::NoAddresses(path.to_owned()));
    }
    info!("Loaded {} IP addresses from {}", addresses.len(), path.display());
    Ok(addresses)
}

/// Extract the addresses from the content of a device list.
///
/// An address listed more than once is kept at its first position only.
pub fn parse_addresses(content: &str) -> Vec<String> {
    let entries = if content.trim().contains(',') {
        first_column(content)
    } else {
        content.lines().map(|line| line.trim().to_owned()).collect()
    };

    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| !entry.is_empty() && !entry.starts_with('#'))
        .filter(|entry| {
            let first = seen.insert(entry.clone());
            if !first {
                warn!("{} is listed more than once, it is updated once", entry);
            }
            first
        })
        .collect()
}

/// Check that an image exists, is not empty and can actually be read.
/// Returns the size of the image.
pub fn validate_image(path: &Path) -> Result<u64, InputError> {
    if !path.exists() {
        return Err(InputError::ImageNotFound(path.to_owned()));
    }
    let unreadable = |source: io::Error| InputError::ImageUnreadable {
        path: path.to_owned(),
        source,
    };

    let size = fs::metadata(path).map_err(unreadable)?.len();
    if size == 0 {
        return Err(InputError::ImageEmpty(path.to_owned()));
    }

    let mut byte = [0u8; 1];
    File::open(path)
        .and_then(|mut file| file.read_exact(&mut byte))
        .map_err(unreadable)?;
    debug!("{} is a valid image of {} bytes", path.display(), size);
    Ok(size)
}

/// Validate an image and read it into memory.
pub fn load_image(path: &Path) -> Result<Arc<[u8]>, InputError> {
    validate_image(path)?;
    let content = fs::read(path).map_err(|source| InputError::ImageUnreadable {
        path: path.to_owned(),
        source,
    })?;
    Ok(content.into())
}

/// Write discovered addresses as a device list that [`load_addresses`] reads
/// back.
pub fn save_addresses(
    path: &Path,
    addresses: &[String],
    when: DateTime<Local>,
) -> Result<(), InputError> {
    let write_list = || -> io::Result<()> {
        let mut file = File::create(path)?;
        writeln!(file, "# Bitaxe devices discovered by updtrr")?;
        writeln!(file, "# Generated: {}", when.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(file, "# Total devices: {}", addresses.len())?;
        writeln!(file)?;
        for address in addresses {
            writeln!(file, "{}", address)?;
        }
        Ok(())
    };
    write_list().map_err(|source| InputError::SaveFailed {
        path: path.to_owned(),
        source,
    })?;
    info!("Saved {} discovered devices to {}", addresses.len(), path.display());
    Ok(())
}

/// First cell of every record, quoted cells included.
fn first_column(content: &str) -> Vec<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    reader
        .records()
        .filter_map(|record| match record {
            Ok(record) => record.get(0).map(str::to_owned),
            Err(e) => {
                debug!("skipping malformed device list line: {}", e);
                None
            }
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn plain_list_skips_comments_and_blanks() {
        let content = "# miners\n192.168.1.10\n\n  192.168.1.11  \n#192.168.1.12\n";
        assert_eq!(
            parse_addresses(content),
            vec!["192.168.1.10", "192.168.1.11"]
        );
    }

    #[test]
    fn csv_uses_first_column() {
        let content = "# ip,name\n192.168.1.10,garage\n\"192.168.1.11\", office\n,orphan\n";
        assert_eq!(
            parse_addresses(content),
            vec!["192.168.1.10", "192.168.1.11"]
        );
    }

    #[test]
    fn quoted_csv_cells_keep_their_commas() {
        let content = "\"bitaxe-1.local,lab\",rack 1\n\"10.0.0.2\",\"rack, 2\"\n";
        assert_eq!(
            parse_addresses(content),
            vec!["bitaxe-1.local,lab", "10.0.0.2"]
        );
    }

    #[test]
    fn duplicates_keep_their_first_position() {
        assert_eq!(
            parse_addresses("10.0.0.1\n10.0.0.2\n10.0.0.1\n 10.0.0.2 \n10.0.0.3\n"),
            vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]
        );
        assert_eq!(
            parse_addresses("10.0.0.1,a\n10.0.0.2,b\n10.0.0.1,c\n"),
            vec!["10.0.0.1", "10.0.0.2"]
        );
    }

    #[test]
    fn missing_and_empty_device_lists() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.csv");
        assert!(matches!(
            load_addresses(&missing),
            Err(InputError::DeviceListNotFound(_))
        ));

        let empty = dir.path().join("empty.csv");
        fs::write(&empty, "# nothing here\n\n").unwrap();
        assert!(matches!(
            load_addresses(&empty),
            Err(InputError::NoAddresses(_))
        ));
    }

    #[test]
    fn image_validation() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            validate_image(&dir.path().join("nonexistent.bin")),
            Err(InputError::ImageNotFound(_))
        ));

        let empty = NamedTempFile::new().unwrap();
        assert!(matches!(
            validate_image(empty.path()),
            Err(InputError::ImageEmpty(_))
        ));

        let mut image = NamedTempFile::new().unwrap();
        image.write_all(b"esp-miner v2.9.0").unwrap();
        assert_eq!(validate_image(image.path()).unwrap(), 16);
        assert_eq!(&*load_image(image.path()).unwrap(), b"esp-miner v2.9.0");
    }

    #[test]
    fn saved_discovery_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("discovered.txt");
        let addresses = vec!["192.168.1.45".to_string(), "192.168.1.46".to_string()];

        save_addresses(&path, &addresses, Local::now()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Bitaxe devices discovered by updtrr"));
        assert!(content.contains("# Total devices: 2"));
        assert_eq!(load_addresses(&path).unwrap(), addresses);
    }
}
