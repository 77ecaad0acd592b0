//! Semantic versions: parsing device strings, locating the version embedded
//! in an image and deciding whether a device needs the update.
//!
//! Whenever one side of the comparison is unknown, the device is updated.

use std::fmt;
use std::time::Duration;

use log::{debug, warn};
use serde_json::{Map, Value};

use super::device_api::DeviceApi;

// =============================================================================
// Public Interface
// =============================================================================

/// A `major.minor.patch` triple, totally ordered component by component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}
impl SemanticVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        SemanticVersion {
            major,
            minor,
            patch,
        }
    }
}
impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Parse a loosely formatted version string such as `v2.9.0`, `2.9.0-dirty`
/// or `V2.10`.
///
/// One leading non-digit prefix character is dropped, then the first three
/// runs of digits become the components. Missing components are `0`, so
/// anything without digits parses as `0.0.0`. Never fails.
pub fn parse_version(text: &str) -> SemanticVersion {
    let text = text.trim();
    let rest = match text.chars().next() {
        Some(c) if !c.is_ascii_digit() => &text[c.len_utf8()..],
        _ => text,
    };

    let mut runs = digit_runs(rest.as_bytes()).into_iter();
    SemanticVersion {
        major: runs.next().unwrap_or(0),
        minor: runs.next().unwrap_or(0),
        patch: runs.next().unwrap_or(0),
    }
}

/// Where a version was found inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionMatch {
    pub version: SemanticVersion,
    /// Offset of the first byte of the matched text.
    pub offset: usize,
    /// Length of the matched text, marker included.
    pub len: usize,
}

/// Locate the version string embedded in an image.
///
/// Patterns are tried in a fixed priority order and the first pattern with a
/// match anywhere in the content wins, even if a lower priority pattern would
/// match earlier in the bytes. Matching is ASCII case-insensitive.
pub fn locate_binary_version(content: &[u8]) -> Option<VersionMatch> {
    PATTERNS.iter().find_map(|pattern| {
        let found = (0..content.len()).find_map(|offset| pattern.match_at(content, offset));
        if let Some(m) = &found {
            debug!(
                "`{}` pattern matched version {} at offset {:#x}",
                pattern.name, m.version, m.offset
            );
        }
        found
    })
}

/// The version embedded in an image, if any.
pub fn extract_binary_version(content: &[u8]) -> Option<SemanticVersion> {
    locate_binary_version(content).map(|m| m.version)
}

/// `true` iff the image is strictly newer than what runs on the device.
pub fn is_update_required(device: SemanticVersion, binary: SemanticVersion) -> bool {
    binary > device
}

/// Update decision with unknown inputs: a device whose version could not be
/// fetched, or an image whose version could not be extracted, is updated.
pub fn needs_update(device: Option<SemanticVersion>, binary: Option<SemanticVersion>) -> bool {
    match (device, binary) {
        (Some(device), Some(binary)) => is_update_required(device, binary),
        _ => true,
    }
}

/// Versions reported by a device's status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceVersions {
    /// Firmware version, `0.0.0` when the field is missing.
    pub firmware: SemanticVersion,
    /// Raw firmware version string, `"unknown"` when missing.
    pub firmware_raw: String,
    /// Web interface (AxeOS) version string, when reported.
    pub web: Option<String>,
}
impl DeviceVersions {
    pub fn from_status(status: &Map<String, Value>) -> Self {
        let firmware_raw = status
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_owned();
        let web = status
            .get("axeOSVersion")
            .and_then(Value::as_str)
            .map(str::to_owned);
        DeviceVersions {
            firmware: parse_version(&firmware_raw),
            firmware_raw,
            web,
        }
    }
}

/// Query a device for the versions it runs.
///
/// Any transport failure or non-2xx answer yields `None`, which the update
/// decision treats as "update".
pub fn fetch_device_version(
    api: &dyn DeviceApi,
    address: &str,
    timeout: Duration,
) -> Option<DeviceVersions> {
    match api.system_info(address, timeout) {
        Ok(status) => Some(DeviceVersions::from_status(&status)),
        Err(e) => {
            warn!("could not get the version of {}: {}", address, e);
            None
        }
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// What may sit between a pattern's marker and the digits.
#[derive(Debug, Clone, Copy)]
enum Gap {
    /// The digits follow the marker immediately.
    None,
    /// Any amount of ASCII whitespace.
    Whitespace,
    /// Any amount of whitespace, `-` or `_`, then an optional `v`.
    Separator,
}

struct VersionPattern {
    name: &'static str,
    marker: &'static [u8],
    gap: Gap,
}
impl VersionPattern {
    fn match_at(&self, content: &[u8], offset: usize) -> Option<VersionMatch> {
        let marker_end = offset + self.marker.len();
        let marker = content.get(offset..marker_end)?;
        if !marker.eq_ignore_ascii_case(self.marker) {
            return None;
        }

        let mut pos = marker_end;
        match self.gap {
            Gap::None => {}
            Gap::Whitespace => {
                while content.get(pos).map_or(false, u8::is_ascii_whitespace) {
                    pos += 1;
                }
            }
            Gap::Separator => {
                while content
                    .get(pos)
                    .map_or(false, |b| b.is_ascii_whitespace() || *b == b'-' || *b == b'_')
                {
                    pos += 1;
                }
                if matches!(content.get(pos), Some(b'v') | Some(b'V')) {
                    pos += 1;
                }
            }
        }

        let (version, end) = match_triple(content, pos)?;
        Some(VersionMatch {
            version,
            offset,
            len: end - offset,
        })
    }
}

/// Version patterns in priority order.
const PATTERNS: &[VersionPattern] = &[
    VersionPattern {
        name: "v-prefixed",
        marker: b"v",
        gap: Gap::None,
    },
    VersionPattern {
        name: "version label",
        marker: b"version:",
        gap: Gap::Whitespace,
    },
    VersionPattern {
        name: "product name",
        marker: b"esp-miner",
        gap: Gap::Separator,
    },
    VersionPattern {
        name: "FW label",
        marker: b"fw",
        gap: Gap::Separator,
    },
    VersionPattern {
        name: "bare",
        marker: b"",
        gap: Gap::None,
    },
];

/// Match `<digits>.<digits>.<digits>` at `pos`, returning the version and the
/// offset right after the last digit.
fn match_triple(content: &[u8], pos: usize) -> Option<(SemanticVersion, usize)> {
    let (major, pos) = match_number(content, pos)?;
    let pos = match_dot(content, pos)?;
    let (minor, pos) = match_number(content, pos)?;
    let pos = match_dot(content, pos)?;
    let (patch, pos) = match_number(content, pos)?;
    Some((SemanticVersion::new(major, minor, patch), pos))
}

fn match_dot(content: &[u8], pos: usize) -> Option<usize> {
    (content.get(pos) == Some(&b'.')).then(|| pos + 1)
}

fn match_number(content: &[u8], pos: usize) -> Option<(u64, usize)> {
    let len = content
        .get(pos..)?
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if len == 0 {
        return None;
    }
    Some((to_number(&content[pos..pos + len]), pos + len))
}

fn digit_runs(text: &[u8]) -> Vec<u64> {
    text.split(|b| !b.is_ascii_digit())
        .filter(|run| !run.is_empty())
        .map(to_number)
        .collect()
}

/// Digits to number, saturating on overflow.
fn to_number(digits: &[u8]) -> u64 {
    digits.iter().fold(0u64, |acc, d| {
        acc.saturating_mul(10).saturating_add(u64::from(d - b'0'))
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
