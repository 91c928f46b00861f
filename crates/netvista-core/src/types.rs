//! Core domain types for the netvista inventory and scan engine.
//!
//! These types are shared between the discovery engine, the inventory
//! store, and the (external) management UI.

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Identifiers ───────────────────────────────────────────────────

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(
    /// Unique identifier for a configured subnet.
    SubnetId
);
id_type!(
    /// Unique identifier for a device row in the inventory.
    DeviceId
);
id_type!(
    /// Unique identifier for a scan job.
    JobId
);
id_type!(
    /// Unique identifier for an activity log entry.
    ActivityId
);

// ── Subnets ───────────────────────────────────────────────────────

/// How addresses are handed out on a subnet.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentType {
    #[default]
    Static,
    Dhcp,
}

/// A managed subnet. The CIDR defines a contiguous address range used
/// both for enumeration and for longest-prefix device assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subnet {
    pub id: SubnetId,
    pub name: String,
    pub cidr: Ipv4Net,
    /// Gateway address, excluded from enumeration when inside the CIDR.
    pub gateway: Option<Ipv4Addr>,
    /// 802.1Q VLAN tag, if the subnet maps to a VLAN.
    pub vlan: Option<u16>,
    pub assignment: AssignmentType,
}

impl Subnet {
    pub fn new(name: &str, cidr: Ipv4Net) -> Self {
        Self {
            id: SubnetId::new(),
            name: name.to_string(),
            cidr,
            gateway: None,
            vlan: None,
            assignment: AssignmentType::default(),
        }
    }
}

// ── Devices ───────────────────────────────────────────────────────

/// Observed liveness state of a device.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    #[default]
    Unknown,
}

/// A device row in the inventory.
///
/// Created by the reconciler on first sighting; `status` and `last_seen`
/// are engine-owned, the metadata fields (`device_type`, `location`,
/// `purpose`) are operator-owned and never touched by scans. Rows are
/// never deleted by the engine: a vanished host drifts to `Offline`, and
/// a removed subnet nulls `subnet_id` instead of cascading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub address: Ipv4Addr,
    pub subnet_id: Option<SubnetId>,
    pub hostname: Option<String>,
    pub mac: Option<String>,
    pub vendor: Option<String>,
    pub device_type: Option<String>,
    pub location: Option<String>,
    pub purpose: Option<String>,
    pub status: DeviceStatus,
    pub open_ports: Vec<u16>,
    pub assignment: AssignmentType,
    pub first_seen: DateTime<Utc>,
    /// Last time the host answered a liveness probe. Not advanced by
    /// probes that find the host down.
    pub last_seen: Option<DateTime<Utc>>,
}

// ── Scan jobs ─────────────────────────────────────────────────────

/// Lifecycle status of a scan job.
///
/// `Pending → Running → {Completed | Failed | Cancelled}`; the three
/// terminal states are final.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Progress counters for one target subnet within a job.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetProgress {
    /// Addresses to probe in this subnet.
    pub total: u64,
    /// Addresses probed so far (alive or not).
    pub completed: u64,
    /// Addresses found alive.
    pub found: u64,
}

/// A scan job over one or more subnets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: JobId,
    pub subnet_ids: Vec<SubnetId>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub progress: HashMap<SubnetId, TargetProgress>,
    /// Per-subnet failure notes (e.g. a CIDR that failed enumeration).
    pub error: Option<String>,
}

impl ScanJob {
    pub fn new(subnet_ids: Vec<SubnetId>) -> Self {
        Self {
            id: JobId::new(),
            subnet_ids,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            progress: HashMap::new(),
            error: None,
        }
    }

    pub fn total(&self) -> u64 {
        self.progress.values().map(|p| p.total).sum()
    }

    pub fn completed(&self) -> u64 {
        self.progress.values().map(|p| p.completed).sum()
    }

    pub fn found(&self) -> u64 {
        self.progress.values().map(|p| p.found).sum()
    }
}

// ── Probe results ─────────────────────────────────────────────────

/// The outcome of probing a single address.
///
/// Ephemeral: produced by a probe worker, consumed exactly once by the
/// reconciler. Absent fields mean the corresponding probe step failed
/// or timed out, which is not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub address: Ipv4Addr,
    pub alive: bool,
    pub rtt: Option<Duration>,
    pub hostname: Option<String>,
    pub mac: Option<String>,
    pub vendor: Option<String>,
    pub open_ports: Vec<u16>,
}

impl ProbeResult {
    /// A result for a host that never answered.
    pub fn dead(address: Ipv4Addr) -> Self {
        Self {
            address,
            alive: false,
            rtt: None,
            hostname: None,
            mac: None,
            vendor: None,
            open_ports: Vec::new(),
        }
    }
}

// ── Activity log ──────────────────────────────────────────────────

/// What an activity entry records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    ScanStarted,
    ScanCompleted,
    ScanFailed,
    ScanCancelled,
    DeviceDiscovered,
    DeviceOnline,
    DeviceOffline,
    AddressConflict,
}

/// Immutable, append-only audit record consumed by the activity views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: ActivityId,
    pub timestamp: DateTime<Utc>,
    pub kind: ActivityKind,
    /// What the entry is about: a job id, a device address, a subnet name.
    pub subject: String,
    pub detail: String,
}

impl ActivityLogEntry {
    pub fn new(kind: ActivityKind, subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            id: ActivityId::new(),
            timestamp: Utc::now(),
            kind,
            subject: subject.into(),
            detail: detail.into(),
        }
    }
}
