//! Address enumeration: expand a subnet into its scannable host
//! addresses.
//!
//! Enumeration is lazy end to end. A /8 target never materializes its
//! sixteen million addresses; the coordinator pulls from the iterator
//! only as fast as the probe pool drains it.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use netvista_core::types::Subnet;

use crate::error::{DiscoverError, Result};

/// Parse a CIDR expression, mapping any failure to `InvalidCidr`.
pub fn parse_cidr(cidr: &str) -> Result<Ipv4Net> {
    cidr.parse::<Ipv4Net>()
        .map_err(|_| DiscoverError::InvalidCidr {
            cidr: cidr.to_string(),
        })
}

/// Whether enumeration of `net` yields `addr`.
///
/// Network and broadcast addresses are excluded for prefixes up to /30;
/// /31 has no such reserved pair and /32 is the single address itself.
fn is_usable(net: Ipv4Net, addr: Ipv4Addr) -> bool {
    if !net.contains(&addr) {
        return false;
    }
    if net.prefix_len() >= 31 {
        return true;
    }
    addr != net.network() && addr != net.broadcast()
}

/// Ordered, lazy sequence of scannable addresses for a subnet:
/// usable hosts minus the configured gateway.
pub fn scannable_hosts(
    net: Ipv4Net,
    gateway: Option<Ipv4Addr>,
) -> impl Iterator<Item = Ipv4Addr> {
    net.hosts().filter(move |a| Some(*a) != gateway)
}

/// Closed-form count of what `scannable_hosts` yields, so jobs can
/// report totals without walking large prefixes.
pub fn scannable_count(net: Ipv4Net, gateway: Option<Ipv4Addr>) -> u64 {
    let prefix = net.prefix_len();
    let usable: u64 = match prefix {
        32 => 1,
        31 => 2,
        p => (1u64 << (32 - p)) - 2,
    };
    match gateway {
        Some(gw) if is_usable(net, gw) => usable - 1,
        _ => usable,
    }
}

/// Enumerate a configured subnet.
pub fn enumerate_subnet(subnet: &Subnet) -> (u64, impl Iterator<Item = Ipv4Addr>) {
    (
        scannable_count(subnet.cidr, subnet.gateway),
        scannable_hosts(subnet.cidr, subnet.gateway),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    #[test]
    fn test_slash_24_yields_254_hosts() {
        let hosts: Vec<Ipv4Addr> = scannable_hosts(net("192.168.1.0/24"), None).collect();
        assert_eq!(hosts.len(), 254);
        assert_eq!(hosts[0], "192.168.1.1".parse::<Ipv4Addr>().unwrap());
        assert_eq!(*hosts.last().unwrap(), "192.168.1.254".parse::<Ipv4Addr>().unwrap());
        assert!(!hosts.contains(&"192.168.1.0".parse().unwrap()));
        assert!(!hosts.contains(&"192.168.1.255".parse().unwrap()));
    }

    #[test]
    fn test_counts_match_formula_for_wide_prefixes() {
        for (cidr, expected) in [
            ("10.0.0.0/30", 2),
            ("10.0.0.0/29", 6),
            ("10.0.0.0/28", 14),
            ("10.0.0.0/24", 254),
            ("10.0.0.0/16", 65_534),
        ] {
            assert_eq!(scannable_count(net(cidr), None), expected, "{cidr}");
        }
        // Counts stay closed-form where iteration would be unreasonable.
        assert_eq!(scannable_count(net("10.0.0.0/8"), None), 16_777_214);
    }

    #[test]
    fn test_count_agrees_with_iterator() {
        for cidr in ["10.1.2.0/26", "10.1.2.0/31", "10.1.2.3/32"] {
            let n = net(cidr);
            assert_eq!(
                scannable_count(n, None),
                scannable_hosts(n, None).count() as u64,
                "{cidr}"
            );
        }
    }

    #[test]
    fn test_slash_31_yields_both_addresses() {
        let hosts: Vec<Ipv4Addr> = scannable_hosts(net("10.0.0.0/31"), None).collect();
        assert_eq!(hosts.len(), 2);
        assert!(hosts.contains(&"10.0.0.0".parse().unwrap()));
        assert!(hosts.contains(&"10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_slash_32_yields_single_address() {
        let hosts: Vec<Ipv4Addr> = scannable_hosts(net("10.0.0.7/32"), None).collect();
        assert_eq!(hosts, vec!["10.0.0.7".parse::<Ipv4Addr>().unwrap()]);
    }

    #[test]
    fn test_gateway_is_excluded() {
        let gw: Ipv4Addr = "192.168.1.1".parse().unwrap();
        let hosts: Vec<Ipv4Addr> = scannable_hosts(net("192.168.1.0/24"), Some(gw)).collect();
        assert_eq!(hosts.len(), 253);
        assert!(!hosts.contains(&gw));
        assert_eq!(scannable_count(net("192.168.1.0/24"), Some(gw)), 253);
    }

    #[test]
    fn test_gateway_outside_subnet_changes_nothing() {
        let gw: Ipv4Addr = "10.9.9.1".parse().unwrap();
        assert_eq!(scannable_count(net("192.168.1.0/24"), Some(gw)), 254);
    }

    #[test]
    fn test_invalid_cidr_is_rejected() {
        assert!(matches!(
            parse_cidr("not-a-network"),
            Err(DiscoverError::InvalidCidr { .. })
        ));
        assert!(matches!(
            parse_cidr("10.0.0.0/33"),
            Err(DiscoverError::InvalidCidr { .. })
        ));
        assert!(parse_cidr("10.0.0.0/0").is_ok());
    }
}
