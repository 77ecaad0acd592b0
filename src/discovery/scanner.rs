//! Finding hosts with an open port on a network.

use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use ipnet::Ipv4Net;
use log::{debug, info};

use super::DiscoveryError;

/// Max concurrent TCP probes to avoid overwhelming the local network.
pub const MAX_CONCURRENT: usize = 64;

/// Something able to list the hosts of a network that accept connections on
/// a port.
pub trait HostScanner {
    /// Hosts that are up with `port` open, in ascending address order.
    fn scan(
        &self,
        network: &Ipv4Net,
        port: u16,
        timeout: Duration,
    ) -> Result<Vec<Ipv4Addr>, DiscoveryError>;
}

/// [`HostScanner`] doing plain TCP connects, a bounded number at a time. A
/// host counts as up when the connection succeeds within the timeout.
#[derive(Debug, Clone)]
pub struct TcpProbeScanner {
    workers: usize,
}
impl TcpProbeScanner {
    pub fn new(workers: usize) -> Self {
        TcpProbeScanner {
            workers: workers.max(1),
        }
    }
}
impl Default for TcpProbeScanner {
    fn default() -> Self {
        Self::new(MAX_CONCURRENT)
    }
}

impl HostScanner for TcpProbeScanner {
    fn scan(
        &self,
        network: &Ipv4Net,
        port: u16,
        timeout: Duration,
    ) -> Result<Vec<Ipv4Addr>, DiscoveryError> {
        let hosts: Vec<Ipv4Addr> = network.hosts().collect();
        info!("Scanning {} hosts in {} on port {}", hosts.len(), network, port);

        let next = AtomicUsize::new(0);
        let open = Mutex::new(Vec::new());
        thread::scope(|scope| -> Result<(), DiscoveryError> {
            for worker in 0..self.workers.min(hosts.len()) {
                thread::Builder::new()
                    .name(format!("probe-{}", worker))
                    .spawn_scoped(scope, || loop {
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        let host = match hosts.get(index) {
                            Some(host) => *host,
                            None => break,
                        };
                        let addr = SocketAddr::from((host, port));
                        if TcpStream::connect_timeout(&addr, timeout).is_ok() {
                            debug!("{} has port {} open", host, port);
                            open.lock().unwrap_or_else(PoisonError::into_inner).push(host);
                        }
                    })
                    .map_err(DiscoveryError::Scan)?;
            }
            Ok(())
        })?;

        let mut open = open.into_inner().unwrap_or_else(PoisonError::into_inner);
        open.sort_unstable();
        info!("Scan complete: {} host(s) answering", open.len());
        Ok(open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn finds_listening_host() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let network: Ipv4Net = "127.0.0.0/30".parse().unwrap();

        let found = TcpProbeScanner::new(2)
            .scan(&network, port, Duration::from_millis(500))
            .unwrap();

        assert!(found.contains(&Ipv4Addr::new(127, 0, 0, 1)));
        assert!(found.windows(2).all(|w| w[0] < w[1]));
    }
}
