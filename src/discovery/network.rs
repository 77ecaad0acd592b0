//! Local network detection from the host routing table.

use std::fs;
use std::net::Ipv4Addr;
use std::process::Command;

use ipnet::Ipv4Net;
use log::{debug, warn};

use super::DiscoveryError;

const PROC_ROUTE: &str = "/proc/net/route";

/// The /24 network around the default gateway, `None` when no usable default
/// route exists.
pub fn detect_local_network() -> Option<Ipv4Net> {
    match default_gateway() {
        Ok(gateway) => {
            let network = network_for_gateway(gateway)?;
            debug!("default gateway {} => {}", gateway, network);
            Some(network)
        }
        Err(e) => {
            warn!("could not detect the local network: {}", e);
            None
        }
    }
}

/// Zero the last octet of the gateway and use a /24 prefix.
pub fn network_for_gateway(gateway: Ipv4Addr) -> Option<Ipv4Net> {
    let [a, b, c, _] = gateway.octets();
    Ipv4Net::new(Ipv4Addr::new(a, b, c, 0), 24).ok()
}

/// Ask the kernel first, then the usual route tools.
fn default_gateway() -> Result<Ipv4Addr, DiscoveryError> {
    if let Ok(table) = fs::read_to_string(PROC_ROUTE) {
        if let Some(gateway) = parse_proc_route(&table) {
            return Ok(gateway);
        }
    }

    let candidates: [(&str, &[&str], fn(&str) -> Option<String>); 2] = [
        ("ip", &["route", "show", "default"], parse_ip_route),
        ("route", &["-n", "get", "default"], parse_route_get),
    ];
    for (program, args, parse) in candidates.iter() {
        let output = match Command::new(program).args(*args).output() {
            Ok(output) => output,
            Err(source) => {
                debug!("{} unavailable: {}", program, source);
                continue;
            }
        };
        let text = String::from_utf8_lossy(&output.stdout);
        if let Some(gateway) = parse(&text) {
            return parse_gateway(&gateway).ok_or(DiscoveryError::BadGateway(gateway));
        }
    }
    Err(DiscoveryError::NoDefaultRoute)
}

/// Default route of a `/proc/net/route` table. Gateways are little-endian
/// hex words.
pub fn parse_proc_route(table: &str) -> Option<Ipv4Addr> {
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [_iface, "00000000", gateway, ..] => {
                let word = u32::from_str_radix(gateway, 16).ok()?;
                (word != 0).then(|| Ipv4Addr::from(word.to_le_bytes()))
            }
            _ => None,
        }
    })
}

/// Gateway of `ip route show default`: `default via 192.168.1.1 dev eth0 ...`
pub fn parse_ip_route(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut words = line.split_whitespace();
        if words.next()? != "default" {
            return None;
        }
        words
            .skip_while(|word| *word != "via")
            .nth(1)
            .map(str::to_owned)
    })
}

/// Gateway of `route -n get default`: a `gateway: 192.168.1.1` line.
pub fn parse_route_get(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        line.trim()
            .strip_prefix("gateway:")
            .map(|gateway| gateway.trim().to_owned())
    })
}

/// Exactly four dotted octets.
pub fn parse_gateway(text: &str) -> Option<Ipv4Addr> {
    let octets: Vec<u8> = text
        .split('.')
        .map(|part| part.parse().ok())
        .collect::<Option<_>>()?;
    match octets.as_slice() {
        [a, b, c, d] => Some(Ipv4Addr::new(*a, *b, *c, *d)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTE_TABLE: &str = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
eth0\t0001A8C0\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0
eth0\t00000000\t0101A8C0\t0003\t0\t0\t100\t00000000\t0\t0\t0
";

    #[test]
    fn proc_route_default_gateway() {
        assert_eq!(
            parse_proc_route(ROUTE_TABLE),
            Some(Ipv4Addr::new(192, 168, 1, 1))
        );
        assert_eq!(parse_proc_route("Iface\tDestination\tGateway\n"), None);
    }

    #[test]
    fn ip_route_output() {
        let output = "default via 10.0.3.254 dev wlan0 proto dhcp metric 600\n";
        assert_eq!(parse_ip_route(output).as_deref(), Some("10.0.3.254"));
        assert_eq!(parse_ip_route("10.0.3.0/24 dev wlan0\n"), None);
    }

    #[test]
    fn route_get_output() {
        let output = "   route to: default\ndestination: default\n    gateway: 172.16.0.1\n";
        assert_eq!(parse_route_get(output).as_deref(), Some("172.16.0.1"));
    }

    #[test]
    fn gateway_needs_four_octets() {
        assert_eq!(parse_gateway("192.168.1.1"), Some(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(parse_gateway("192.168.1"), None);
        assert_eq!(parse_gateway("fe80::1"), None);
        assert_eq!(parse_gateway("192.168.1.300"), None);
    }

    #[test]
    fn network_is_a_slash_24() {
        let network = network_for_gateway(Ipv4Addr::new(192, 168, 7, 254)).unwrap();
        assert_eq!(network.to_string(), "192.168.7.0/24");
    }
}
