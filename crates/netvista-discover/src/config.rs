//! Configuration for the netvista-discover engine.

use std::net::Ipv4Addr;

use serde::Deserialize;

use netvista_core::types::AssignmentType;

use crate::error::{DiscoverError, Result};

/// Top-level discover configuration.
///
/// Loaded from the `netvista.toml` `[discover]` section or
/// `NETVISTA_DISCOVER__` environment variables. The scheduler reloads
/// it on every tick, so interval/timeout changes take effect without a
/// restart.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Minutes between periodic full-fleet scans.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_minutes: u64,

    /// Wall-clock budget for one host probe, all steps included.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Per-port TCP connect timeout.
    #[serde(default = "default_port_timeout")]
    pub port_timeout_ms: u64,

    /// TCP ports probed on every live host.
    #[serde(default = "default_probe_ports")]
    pub probe_ports: Vec<u16>,

    /// Maximum concurrent host probes per job.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_probes: usize,

    /// How long a cancelled job waits for in-flight probes before
    /// abandoning them.
    #[serde(default = "default_cancel_grace")]
    pub cancel_grace_ms: u64,

    /// When true, a start request for a busy subnet set waits for the
    /// claims instead of being rejected. Scheduler ticks always reject.
    #[serde(default)]
    pub queue_overlapping: bool,

    /// Alert when the share of online addresses in a subnet exceeds
    /// this fraction.
    #[serde(default = "default_saturation")]
    pub saturation_threshold: f64,

    /// Subnet definitions for the standalone daemon. The management
    /// application seeds subnets through the inventory instead.
    #[serde(default)]
    pub subnets: Vec<SubnetSeed>,
}

/// A subnet declared in the daemon's config file.
#[derive(Debug, Clone, Deserialize)]
pub struct SubnetSeed {
    /// CIDR target (e.g., "10.0.1.0/24").
    pub cidr: String,

    /// Human-readable name for this subnet.
    pub name: Option<String>,

    /// Gateway address, excluded from probing.
    pub gateway: Option<Ipv4Addr>,

    /// 802.1Q VLAN tag.
    pub vlan: Option<u16>,

    #[serde(default)]
    pub assignment: AssignmentType,

    /// Whether this subnet is part of the periodic fleet scan.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl DiscoverConfig {
    /// Load from `<prefix>.toml` and `NETVISTA_DISCOVER__*` env vars.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("NETVISTA_DISCOVER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| DiscoverError::Config(e.to_string()))?;

        match cfg.get::<DiscoverConfig>("discover") {
            Ok(c) => Ok(c),
            Err(_) => Ok(DiscoverConfig::default()),
        }
    }
}

fn default_scan_interval() -> u64 {
    15
}

fn default_probe_timeout() -> u64 {
    4_000
}

fn default_port_timeout() -> u64 {
    500
}

// 22/80/443 for management planes, 554 RTSP and 1935 RTMP for camera and
// encoder gear, 5060 SIP for intercoms, 8000/8080 for embedded web UIs.
fn default_probe_ports() -> Vec<u16> {
    vec![22, 23, 80, 443, 554, 1935, 5060, 8000, 8080]
}

fn default_max_concurrent() -> usize {
    64
}

fn default_cancel_grace() -> u64 {
    2_000
}

fn default_saturation() -> f64 {
    0.9
}

fn default_true() -> bool {
    true
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            scan_interval_minutes: default_scan_interval(),
            probe_timeout_ms: default_probe_timeout(),
            port_timeout_ms: default_port_timeout(),
            probe_ports: default_probe_ports(),
            max_concurrent_probes: default_max_concurrent(),
            cancel_grace_ms: default_cancel_grace(),
            queue_overlapping: false,
            saturation_threshold: default_saturation(),
            subnets: Vec::new(),
        }
    }
}
