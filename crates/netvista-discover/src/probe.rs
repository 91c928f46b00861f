//! Host probing: liveness, reverse DNS, port sweep, link-layer lookup.
//!
//! One [`NetProber`] is shared by the whole worker pool. Every probe is
//! capped by a single wall-clock budget; inside it, liveness runs first
//! (a dead host short-circuits everything else) and the identity steps
//! run concurrently, each with its own short timeout. A step that fails
//! or times out leaves its field absent, never an error.

use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use netvista_core::types::ProbeResult;

use crate::config::DiscoverConfig;
use crate::oui;

/// Ports attempted per host concurrently during the port sweep.
const PORT_SWEEP_WIDTH: usize = 16;

/// Ports tried when ICMP is unavailable and we fall back to TCP for
/// liveness.
const TCP_FALLBACK_PORTS: &[u16] = &[80, 443, 22];

/// The probing seam. The coordinator only sees this trait, which keeps
/// it testable without touching the network.
#[async_trait]
pub trait HostProber: Send + Sync {
    async fn probe(&self, address: Ipv4Addr) -> ProbeResult;
}

/// Real network prober.
pub struct NetProber {
    budget: Duration,
    step_timeout: Duration,
    port_timeout: Duration,
    ports: Vec<u16>,
}

impl NetProber {
    pub fn new(config: &DiscoverConfig) -> Self {
        let budget = Duration::from_millis(config.probe_timeout_ms);
        Self {
            budget,
            // Liveness and DNS each get a quarter of the budget, so a
            // stalled step can never exhaust it alone.
            step_timeout: budget / 4,
            port_timeout: Duration::from_millis(config.port_timeout_ms),
            ports: config.probe_ports.clone(),
        }
    }

    /// ICMP echo, falling back to TCP connect when ICMP is denied or
    /// unanswered. Returns the round-trip time for a live host. The
    /// whole sequence stays inside the probe budget, however generous
    /// the per-port timeout is.
    async fn check_liveness(&self, address: Ipv4Addr) -> Option<Duration> {
        let started = Instant::now();
        let payload = [0u8; 56];
        if let Ok(Ok((_packet, rtt))) =
            timeout(self.step_timeout, surge_ping::ping(IpAddr::V4(address), &payload)).await
        {
            return Some(rtt);
        }

        let remaining = self.budget.saturating_sub(started.elapsed());
        self.tcp_liveness(address, TCP_FALLBACK_PORTS, remaining).await
    }

    /// Unprivileged or ICMP-filtered: a completed TCP handshake is
    /// just as much proof of life. Each connect is capped by both the
    /// per-port timeout and whatever is left of `budget`.
    async fn tcp_liveness(
        &self,
        address: Ipv4Addr,
        ports: &[u16],
        budget: Duration,
    ) -> Option<Duration> {
        let started = Instant::now();
        for &port in ports {
            let remaining = budget.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return None;
            }
            let attempt = Instant::now();
            if let Ok(Ok(_stream)) = timeout(
                self.port_timeout.min(remaining),
                TcpStream::connect((address, port)),
            )
            .await
            {
                return Some(attempt.elapsed());
            }
        }
        None
    }

    async fn reverse_dns(&self, address: Ipv4Addr) -> Option<String> {
        let ip = IpAddr::V4(address);
        let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip).ok());
        match timeout(self.step_timeout, lookup).await {
            Ok(Ok(name)) => name.filter(|n| !n.is_empty() && n != &ip.to_string()),
            _ => None,
        }
    }

    /// Probe the configured port set concurrently; one short timeout
    /// per port.
    async fn sweep_ports(&self, address: Ipv4Addr) -> Vec<u16> {
        let port_timeout = self.port_timeout;
        let mut open: Vec<u16> = stream::iter(self.ports.clone())
            .map(|port| async move {
                match timeout(port_timeout, TcpStream::connect((address, port))).await {
                    Ok(Ok(_stream)) => Some(port),
                    _ => None,
                }
            })
            .buffer_unordered(PORT_SWEEP_WIDTH)
            .filter_map(|p| async move { p })
            .collect()
            .await;
        open.sort_unstable();
        open
    }

    /// Link-layer lookup from the kernel neighbor table, with vendor
    /// resolution. Best-effort; needs no privileges.
    async fn link_layer(&self, address: Ipv4Addr) -> (Option<String>, Option<String>) {
        let table = match tokio::fs::read_to_string("/proc/net/arp").await {
            Ok(t) => t,
            Err(_) => return (None, None),
        };
        match find_arp_entry(&table, address) {
            Some(mac) => {
                let vendor = oui::lookup_vendor(&mac);
                (Some(mac), vendor)
            }
            None => (None, None),
        }
    }
}

#[async_trait]
impl HostProber for NetProber {
    async fn probe(&self, address: Ipv4Addr) -> ProbeResult {
        let started = Instant::now();

        let Some(rtt) = self.check_liveness(address).await else {
            return ProbeResult::dead(address);
        };

        let mut result = ProbeResult {
            address,
            alive: true,
            rtt: Some(rtt),
            hostname: None,
            mac: None,
            vendor: None,
            open_ports: Vec::new(),
        };

        // Identity steps share whatever budget liveness left over.
        let remaining = self.budget.saturating_sub(started.elapsed());
        let identity = async {
            tokio::join!(
                self.reverse_dns(address),
                self.sweep_ports(address),
                self.link_layer(address),
            )
        };
        if let Ok((hostname, open_ports, (mac, vendor))) = timeout(remaining, identity).await {
            result.hostname = hostname;
            result.open_ports = open_ports;
            result.mac = mac;
            result.vendor = vendor;
        } else {
            tracing::debug!(address = %address, "Identity probe budget exhausted");
        }

        result
    }
}

/// Find the MAC for `address` in `/proc/net/arp` content.
///
/// Format: `IP address  HW type  Flags  HW address  Mask  Device`,
/// one header line. Incomplete entries carry an all-zero MAC.
fn find_arp_entry(table: &str, address: Ipv4Addr) -> Option<String> {
    let needle = address.to_string();
    for line in table.lines().skip(1) {
        let mut fields = line.split_whitespace();
        let (Some(ip), Some(_hw), Some(_flags), Some(mac)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        if ip != needle {
            continue;
        }
        if mac == "00:00:00:00:00:00" {
            return None;
        }
        return oui::normalize_mac(mac);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn prober_with_ports(ports: Vec<u16>) -> NetProber {
        let config = DiscoverConfig {
            probe_ports: ports,
            probe_timeout_ms: 2_000,
            port_timeout_ms: 250,
            ..Default::default()
        };
        NetProber::new(&config)
    }

    #[test]
    fn test_find_arp_entry_parses_table() {
        let table = "IP address       HW type     Flags       HW address            Mask     Device\n\
                     192.168.1.50     0x1         0x2         b8:27:eb:01:02:03     *        eth0\n\
                     192.168.1.60     0x1         0x0         00:00:00:00:00:00     *        eth0\n";
        assert_eq!(
            find_arp_entry(table, "192.168.1.50".parse().unwrap()).as_deref(),
            Some("B8:27:EB:01:02:03")
        );
        // Incomplete entry: MAC unknown.
        assert!(find_arp_entry(table, "192.168.1.60".parse().unwrap()).is_none());
        assert!(find_arp_entry(table, "192.168.1.70".parse().unwrap()).is_none());
    }

    #[tokio::test]
    async fn test_sweep_ports_finds_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let prober = prober_with_ports(vec![port]);
        let open = prober.sweep_ports("127.0.0.1".parse().unwrap()).await;
        assert_eq!(open, vec![port]);
    }

    #[tokio::test]
    async fn test_tcp_fallback_liveness_via_loopback() {
        // Port 80 fallback is unlikely locally, but a listener plus the
        // configured sweep proves the connect path; liveness itself is
        // exercised against loopback only when ICMP is permitted, so we
        // assert the fallback machinery instead of the privileged path.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let prober = prober_with_ports(vec![port]);

        let result = prober.probe("127.0.0.1".parse().unwrap()).await;
        // Loopback answers ICMP where permitted, TCP fallback otherwise;
        // either way the sweep must report our listener if alive.
        if result.alive {
            assert_eq!(result.open_ports, vec![port]);
            assert!(result.rtt.is_some());
        }
    }

    #[tokio::test]
    async fn test_tcp_fallback_finds_live_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let prober = prober_with_ports(vec![]);
        let rtt = prober
            .tcp_liveness("127.0.0.1".parse().unwrap(), &[port], Duration::from_secs(2))
            .await;
        assert!(rtt.is_some());
    }

    #[tokio::test]
    async fn test_tcp_fallback_rejects_closed_port() {
        // Bind then drop, leaving a loopback port that refuses.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let prober = prober_with_ports(vec![]);
        let rtt = prober
            .tcp_liveness("127.0.0.1".parse().unwrap(), &[port], Duration::from_secs(2))
            .await;
        assert!(rtt.is_none());
    }

    #[tokio::test]
    async fn test_tcp_fallback_respects_exhausted_budget() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // No budget left: even a live listener must not be attempted.
        let prober = prober_with_ports(vec![]);
        let rtt = prober
            .tcp_liveness("127.0.0.1".parse().unwrap(), &[port], Duration::ZERO)
            .await;
        assert!(rtt.is_none());
    }

    #[tokio::test]
    async fn test_probe_wall_clock_is_capped_by_budget() {
        // A generous per-port timeout must not let a silent host
        // overrun the whole-probe budget through the liveness fallback.
        let config = DiscoverConfig {
            probe_timeout_ms: 500,
            port_timeout_ms: 10_000,
            probe_ports: vec![],
            ..Default::default()
        };
        let prober = NetProber::new(&config);

        let started = Instant::now();
        // RFC 5737 TEST-NET-1; answered or blackholed, the cap holds.
        let _result = prober.probe("192.0.2.1".parse().unwrap()).await;
        assert!(
            started.elapsed() < Duration::from_millis(1_500),
            "probe took {:?} against a 500ms budget",
            started.elapsed()
        );
    }
}
