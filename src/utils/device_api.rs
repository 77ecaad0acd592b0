//! HTTP access to the miners: status query and the two OTA upload endpoints.
//!
//! The rest of the crate only sees the [`DeviceApi`] trait so that the update
//! workflow can be driven against scripted devices in tests.

use std::io::{self, Cursor, Read};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use reqwest::blocking::{Body, Client};
use reqwest::header::CONTENT_TYPE;
use serde_json::{Map, Value};
use thiserror::Error;

/// Path of the status endpoint.
pub const STATUS_PATH: &str = "/api/system/info";

/// Callback receiving `(bytes_sent, total_bytes)` while an image is streamed.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// The two images a device accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadTarget {
    /// The web interface image, `www.bin`.
    Www,
    /// The ESP-Miner firmware image.
    Firmware,
}
impl UploadTarget {
    pub fn path(self) -> &'static str {
        match self {
            UploadTarget::Www => "/api/system/OTAWWW",
            UploadTarget::Firmware => "/api/system/OTA",
        }
    }

    /// Short tag used in events and on screen.
    pub fn tag(self) -> &'static str {
        match self {
            UploadTarget::Www => "WWW",
            UploadTarget::Firmware => "FW",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            UploadTarget::Www => "web interface",
            UploadTarget::Firmware => "firmware",
        }
    }
}

/// Why a single HTTP exchange with a device failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("timeout")]
    Timeout,
    #[error("connection error: {0}")]
    Connection(String),
    #[error("{}", describe_status(*.0))]
    Status(u16),
    #[error("error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connection(e.to_string())
        } else if let Some(status) = e.status() {
            TransportError::Status(status.as_u16())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// The device endpoints used by `updtrr`.
pub trait DeviceApi: Send + Sync {
    /// `GET` the status object of the device. Non-2xx answers are errors.
    fn system_info(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<Map<String, Value>, TransportError>;

    /// `POST` an image to the device. Only HTTP 200 is a success, in which case
    /// the number of bytes sent is returned.
    fn upload(
        &self,
        address: &str,
        target: UploadTarget,
        image: Arc<[u8]>,
        progress: ProgressFn,
    ) -> Result<u64, TransportError>;
}

/// [`DeviceApi`] over plain HTTP with a blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpDeviceApi {
    client: Client,
}
impl HttpDeviceApi {
    /// Build the client; `timeout` applies to every upload.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpDeviceApi { client })
    }
}

impl DeviceApi for HttpDeviceApi {
    fn system_info(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<Map<String, Value>, TransportError> {
        let url = format!("http://{}{}", address, STATUS_PATH);
        trace!("GET {}", url);
        let response = self.client.get(&url).timeout(timeout).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        match response.json::<Value>()? {
            Value::Object(map) => Ok(map),
            other => Err(TransportError::Other(format!(
                "expected a JSON object from {}, got `{}`",
                url, other
            ))),
        }
    }

    fn upload(
        &self,
        address: &str,
        target: UploadTarget,
        image: Arc<[u8]>,
        progress: ProgressFn,
    ) -> Result<u64, TransportError> {
        let url = format!("http://{}{}", address, target.path());
        let total = image.len() as u64;
        debug!("POST {} ({} bytes)", url, total);

        let reader = ProgressReader {
            inner: Cursor::new(image),
            sent: 0,
            total,
            progress,
        };
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(Body::sized(reader, total))
            .send()?;

        match response.status().as_u16() {
            200 => Ok(total),
            code => Err(TransportError::Status(code)),
        }
    }
}

/// Human readable HTTP status, with the authorization case called out.
pub fn describe_status(code: u16) -> String {
    match code {
        401 => "unauthorized (HTTP 401), check network permissions".into(),
        code => format!("HTTP {}", code),
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// Reads the image for the request body and reports how much was consumed.
struct ProgressReader {
    inner: Cursor<Arc<[u8]>>,
    sent: u64,
    total: u64,
    progress: ProgressFn,
}
impl Read for ProgressReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.sent += n as u64;
            (self.progress)(self.sent, self.total);
        }
        Ok(n)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
