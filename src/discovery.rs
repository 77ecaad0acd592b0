//! Finding miners on the local network.
//!
//! Discovery never fails a run by itself: every problem is logged and turns
//! into fewer (or zero) discovered devices.
//!
//! **Example** - Discovering the miners around the default gateway:
//! ```ignore
//! let discoverer = Discoverer::new(api, Box::new(TcpProbeScanner::default()), timeout);
//! let addresses = discoverer.discover(None);
//! ```

mod network;
mod scanner;
mod verifier;

use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use ipnet::Ipv4Net;
use log::{info, warn};
use thiserror::Error;

use crate::utils::DeviceApi;

pub use network::{
    detect_local_network, network_for_gateway, parse_gateway, parse_ip_route, parse_proc_route,
    parse_route_get,
};
pub use scanner::{HostScanner, TcpProbeScanner, MAX_CONCURRENT};
pub use verifier::{classify, verify, INDICATOR_FIELDS, KNOWN_MODELS, MODEL_FIELD};

/// Port the miners serve their API on.
pub const HTTP_PORT: u16 = 80;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no default route found")]
    NoDefaultRoute,
    #[error("gateway `{0}` is not a dotted IPv4 address")]
    BadGateway(String),
    #[error("network scan failed: {0}")]
    Scan(#[source] io::Error),
}

/// Scans a network and keeps the hosts that look like miners.
pub struct Discoverer {
    api: Arc<dyn DeviceApi>,
    scanner: Box<dyn HostScanner>,
    timeout: Duration,
}
impl Discoverer {
    /// `timeout` bounds each probe and each verification query.
    pub fn new(api: Arc<dyn DeviceApi>, scanner: Box<dyn HostScanner>, timeout: Duration) -> Self {
        Discoverer {
            api,
            scanner,
            timeout,
        }
    }

    /// Hosts of `network` with `port` open, empty when the scan fails.
    pub fn scan(&self, network: &Ipv4Net, port: u16) -> Vec<Ipv4Addr> {
        self.scanner
            .scan(network, port, self.timeout)
            .unwrap_or_else(|e| {
                warn!("{}", e);
                Vec::new()
            })
    }

    /// Verified miners of `network`, or of the detected local network when
    /// `None`, in scan order.
    pub fn discover(&self, network: Option<Ipv4Net>) -> Vec<String> {
        let network = match network.or_else(detect_local_network) {
            Some(network) => network,
            None => {
                warn!("no network to scan");
                return Vec::new();
            }
        };
        info!("Discovering miners on {}", network);

        let devices: Vec<String> = self
            .scan(&network, HTTP_PORT)
            .into_iter()
            .map(|host| host.to_string())
            .filter(|address| verify(self.api.as_ref(), address, self.timeout))
            .collect();
        info!("Discovered {} miner(s) on {}", devices.len(), network);
        devices
    }
}
