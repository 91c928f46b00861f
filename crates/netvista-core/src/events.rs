//! Event types published by the scan engine.
//!
//! Progress events flow over the in-process broadcast channel to UI
//! observers (WebSocket fan-out lives in the web tier); alert events go
//! to the notification collaborator.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{JobId, JobStatus, ScanJob};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// Which stage of a scan an incremental event refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Enumerating,
    Probing,
    Reconciling,
}

/// Aggregate counts reported when a job reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    pub job_id: JobId,
    pub status: JobStatus,
    pub online_devices: u64,
    pub subnets_scanned: u64,
    pub vendor_breakdown: HashMap<String, u64>,
    pub device_type_breakdown: HashMap<String, u64>,
    pub timestamp: DateTime<Utc>,
}

/// An event on the progress channel, tagged by type.
///
/// Delivery is at-least-once per subscriber; observers must tolerate
/// duplicate progress ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum ProgressEvent {
    /// A job transitioned Pending → Running.
    JobStarted { job: ScanJob },
    /// One address finished probing.
    HostProbed {
        job_id: JobId,
        phase: ScanPhase,
        current: u64,
        total: u64,
        current_address: Ipv4Addr,
        found: bool,
    },
    /// A probe found an address with no existing inventory row.
    DeviceDiscovered {
        job_id: JobId,
        address: Ipv4Addr,
        hostname: Option<String>,
    },
    /// Replay of the current job state, sent to late subscribers.
    Snapshot { job: ScanJob },
    /// Terminal event; fires exactly once per job, on every exit path.
    JobFinished { summary: ScanSummary },
    /// Sent to subscribers when no scan is active.
    Idle,
}

/// Event shape consumed by the notification/alerting collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub event_type: AlertKind,
    /// Device address or subnet id the alert concerns.
    pub subject_id: String,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    DeviceOffline,
    SubnetSaturation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_event_tagging() {
        let event = ProgressEvent::HostProbed {
            job_id: JobId::new(),
            phase: ScanPhase::Probing,
            current: 5,
            total: 254,
            current_address: "10.0.0.5".parse().unwrap(),
            found: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "HostProbed");
        assert_eq!(json["phase"], "probing");
        assert_eq!(json["current_address"], "10.0.0.5");
    }

    #[test]
    fn test_idle_round_trips() {
        let json = serde_json::to_string(&ProgressEvent::Idle).unwrap();
        let back: ProgressEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, ProgressEvent::Idle));
    }
}
