//! NFS host sets
//!
//! Export host lists mix hostnames, netgroups, plain addresses and subnets.
//! The array rewrites addresses into its own notation (`ip/255.255.255.255`,
//! `ip/128`, `ip/dotted-mask`), so sets are compared by meaning rather than
//! by spelling.

use crate::error::{Error, Result};
use ipnetwork::{IpNetwork, Ipv4Network};
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};

const IPV4_HOST_MASK: &str = "/255.255.255.255";
const IPV6_HOST_PREFIX: &str = "/128";

/// Normalized form of a host set
///
/// Subnets covered by a larger subnet are dropped, as are addresses inside
/// a kept subnet. Names and netgroups are kept verbatim.
pub fn normalize(hosts: &[String]) -> Result<BTreeSet<String>> {
    let mut names = Vec::new();
    let mut networks: Vec<IpNetwork> = Vec::new();
    let mut addresses: Vec<IpAddr> = Vec::new();
    let mut errors = Vec::new();

    for host in hosts {
        if let Some(ip) = host.strip_suffix(IPV6_HOST_PREFIX) {
            match ip.parse::<IpAddr>() {
                Ok(ip) => addresses.push(ip),
                Err(_) => errors.push(format!("invalid IPv6 address entry {}", host)),
            }
        } else if let Some(ip) = host.strip_suffix(IPV4_HOST_MASK) {
            match ip.parse::<Ipv4Addr>() {
                Ok(ip) => addresses.push(IpAddr::V4(ip)),
                Err(_) => errors.push(format!("invalid IPv4 address entry {}", host)),
            }
        } else if host.contains('/') {
            match parse_network(host) {
                // `/32` and `/128` name a single address
                Ok(net) if is_host_length(&net) => addresses.push(net.ip()),
                Ok(net) => networks.push(net),
                Err(e) => errors.push(e),
            }
        } else if let Ok(ip) = host.parse::<IpAddr>() {
            addresses.push(ip);
        } else {
            names.push(host.clone());
        }
    }

    if !errors.is_empty() {
        return Err(Error::validation("Error parsing host values", errors.join("\n")));
    }

    let kept: Vec<IpNetwork> = networks
        .iter()
        .enumerate()
        .filter(|(i, candidate)| {
            !networks.iter().enumerate().any(|(j, other)| {
                *i != j
                    && other.contains(candidate.network())
                    && (other.prefix() < candidate.prefix()
                        || (other.prefix() == candidate.prefix() && j < *i))
            })
        })
        .map(|(_, net)| *net)
        .collect();

    let mut normalized: BTreeSet<String> = names.into_iter().collect();
    for net in &kept {
        normalized.insert(format!("{}/{}", net.network(), net.prefix()));
    }
    for ip in addresses {
        if !kept.iter().any(|net| net.contains(ip)) {
            normalized.insert(ip.to_string());
        }
    }
    Ok(normalized)
}

fn is_host_length(net: &IpNetwork) -> bool {
    match net {
        IpNetwork::V4(_) => net.prefix() == 32,
        IpNetwork::V6(_) => net.prefix() == 128,
    }
}

/// Parse `ip/prefix` or `ipv4/dotted-mask`
fn parse_network(host: &str) -> std::result::Result<IpNetwork, String> {
    let (ip, mask) = host.split_once('/').unwrap_or((host, ""));
    let prefix = match (ip.parse::<Ipv4Addr>(), mask.parse::<Ipv4Addr>()) {
        (Ok(_), Ok(mask)) => ipnetwork::ipv4_mask_to_prefix(mask)
            .map_err(|_| format!("invalid IPv4 mask {} in CIDR entry {}", mask, host))?,
        _ => mask
            .parse::<u8>()
            .map_err(|_| format!("unable to parse CIDR: invalid CIDR address: {}", host))?,
    };
    let ip: IpAddr = ip
        .parse()
        .map_err(|_| format!("unable to parse CIDR: invalid CIDR address: {}", host))?;
    let net = IpNetwork::new(ip, prefix)
        .map_err(|_| format!("unable to parse CIDR: invalid CIDR address: {}", host))?;
    IpNetwork::new(net.network(), prefix).map_err(|e| format!("unable to parse CIDR: {}", e))
}

/// Whether two host sets mean the same thing
pub fn semantically_equal(left: &[String], right: &[String]) -> bool {
    match (normalize(left), normalize(right)) {
        (Ok(l), Ok(r)) => l == r,
        _ => false,
    }
}

/// Rewrite hosts into the array's notation before sending
pub fn to_wire(hosts: &[String]) -> Vec<String> {
    hosts.iter().map(|host| wire_host(host)).collect()
}

fn wire_host(host: &str) -> String {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return match ip {
            IpAddr::V4(v4) => format!("{}{}", v4, IPV4_HOST_MASK),
            IpAddr::V6(v6) => format!("{}{}", v6, IPV6_HOST_PREFIX),
        };
    }
    if let Some((ip, prefix)) = host.split_once('/') {
        if let (Ok(ip), Ok(prefix)) = (ip.parse::<IpAddr>(), prefix.parse::<u8>()) {
            match ip {
                IpAddr::V4(v4) => {
                    if let Ok(net) = Ipv4Network::new(v4, prefix) {
                        return format!("{}/{}", net.network(), net.mask());
                    }
                }
                IpAddr::V6(_) => {
                    if let Ok(net) = IpNetwork::new(ip, prefix) {
                        return format!("{}/{}", net.network(), prefix);
                    }
                }
            }
        }
    }
    host.to_string()
}

/// Keep the planned spelling when the array's answer means the same thing
pub fn reconcile(planned: Option<&Vec<String>>, returned: Vec<String>) -> Vec<String> {
    match planned {
        Some(planned) if semantically_equal(planned, &returned) => planned.clone(),
        _ => returned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_wire_notation() {
        assert_eq!(
            to_wire(&hosts(&["10.0.0.1", "fd00::1", "10.1.1.7/24", "fd00::/64", "host-a", "@ng"])),
            hosts(&[
                "10.0.0.1/255.255.255.255",
                "fd00::1/128",
                "10.1.1.0/255.255.255.0",
                "fd00::/64",
                "host-a",
                "@ng"
            ])
        );
    }

    #[test]
    fn test_semantic_equality_with_array_spelling() {
        let planned = hosts(&["10.0.0.1", "192.168.0.0/16", "host-a"]);
        let returned = hosts(&["10.0.0.1/255.255.255.255", "192.168.0.0/255.255.0.0", "host-a"]);
        assert!(semantically_equal(&planned, &returned));
        assert_eq!(reconcile(Some(&planned), returned), planned);
    }

    #[test]
    fn test_host_length_cidrs_match_array_spelling() {
        let planned = hosts(&["10.0.0.1/32", "fd00::1/128", "10.0.0.2/255.255.255.255"]);
        let returned = to_wire(&planned);
        assert_eq!(
            returned,
            hosts(&["10.0.0.1/255.255.255.255", "fd00::1/128", "10.0.0.2/255.255.255.255"])
        );
        assert!(semantically_equal(&planned, &returned));
        assert!(semantically_equal(&hosts(&["10.0.0.1/32"]), &hosts(&["10.0.0.1"])));
        assert_eq!(reconcile(Some(&planned), returned), planned);
    }

    #[test]
    fn test_covered_entries_are_dropped() {
        let normalized = normalize(&hosts(&[
            "10.0.0.0/8",
            "10.1.0.0/16",
            "10.2.3.4",
            "172.16.0.5",
        ]))
        .unwrap();
        let expected: BTreeSet<String> = ["10.0.0.0/8", "172.16.0.5"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(normalized, expected);
    }

    #[test]
    fn test_different_sets_keep_array_answer() {
        let planned = hosts(&["10.0.0.1"]);
        let returned = hosts(&["10.0.0.2/255.255.255.255"]);
        assert!(!semantically_equal(&planned, &returned));
        assert_eq!(reconcile(Some(&planned), returned.clone()), returned);
        assert_eq!(reconcile(None, returned.clone()), returned);
    }

    #[test]
    fn test_invalid_entries() {
        assert!(normalize(&hosts(&["10.0.0.1/255.0.255.0"])).is_err());
        assert!(normalize(&hosts(&["nothost/255.255.255.255"])).is_err());
        assert!(normalize(&hosts(&["10.0.0.0/99"])).is_err());
    }
}
