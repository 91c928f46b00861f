//! Result reconciliation: merge probe results into the device inventory.
//!
//! Reconciliation is idempotent: replaying a probe result leaves the
//! inventory unchanged and never double-counts a status transition.
//! A keyed per-address lock serializes concurrent updates to the same
//! device row; different addresses proceed independently, so two jobs
//! that somehow touch overlapping devices still cannot interleave one
//! row's read-modify-write.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use netvista_core::events::{AlertEvent, AlertKind};
use netvista_core::types::{
    ActivityKind, ActivityLogEntry, Device, DeviceId, DeviceStatus, ProbeResult, Subnet, SubnetId,
};
use netvista_inventory::store::Result as StoreResult;
use netvista_inventory::{AlertSink, InventoryStore};

/// What one reconciliation did, for the coordinator's counters and
/// progress events.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub device: Option<Device>,
    pub newly_discovered: bool,
    pub went_online: bool,
    pub went_offline: bool,
}

pub struct ResultReconciler {
    store: Arc<dyn InventoryStore>,
    alerts: Arc<dyn AlertSink>,
    locks: Mutex<HashMap<Ipv4Addr, Arc<Mutex<()>>>>,
}

impl ResultReconciler {
    pub fn new(store: Arc<dyn InventoryStore>, alerts: Arc<dyn AlertSink>) -> Self {
        Self {
            store,
            alerts,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn address_lock(&self, address: Ipv4Addr) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(address).or_default().clone()
    }

    async fn prune_lock(&self, address: Ipv4Addr) {
        let mut locks = self.locks.lock().await;
        if let Some(lock) = locks.get(&address) {
            // Only the map's own reference left: nobody holds the lock
            // or waits on it. Any surviving clone means a concurrent
            // reconcile for this address must keep seeing this mutex.
            if Arc::strong_count(lock) == 1 {
                locks.remove(&address);
            }
        }
    }

    /// Merge one probe result into the inventory.
    pub async fn reconcile(&self, result: &ProbeResult) -> StoreResult<ReconcileOutcome> {
        let lock = self.address_lock(result.address).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.reconcile_locked(result).await
        };
        drop(lock);
        self.prune_lock(result.address).await;
        outcome
    }

    async fn reconcile_locked(&self, result: &ProbeResult) -> StoreResult<ReconcileOutcome> {
        let subnets = self.store.list_subnets().await?;
        let subnet_id = longest_prefix_match(&subnets, result.address);
        if subnet_id.is_none() {
            tracing::debug!(address = %result.address, "No configured subnet contains address, recording unassigned");
        }

        let existing = self.store.get_device(result.address).await?;
        match existing {
            None if !result.alive => {
                // Never-seen address with nothing listening: no row.
                Ok(ReconcileOutcome {
                    device: None,
                    newly_discovered: false,
                    went_online: false,
                    went_offline: false,
                })
            }
            None => self.create_device(result, subnet_id).await,
            Some(current) => self.update_device(current, result, subnet_id).await,
        }
    }

    async fn create_device(
        &self,
        result: &ProbeResult,
        subnet_id: Option<SubnetId>,
    ) -> StoreResult<ReconcileOutcome> {
        let now = Utc::now();
        let assignment = match subnet_id {
            Some(id) => self
                .store
                .get_subnet(id)
                .await?
                .map(|s| s.assignment)
                .unwrap_or_default(),
            None => Default::default(),
        };

        let device = Device {
            id: DeviceId::new(),
            address: result.address,
            subnet_id,
            hostname: result.hostname.clone(),
            mac: result.mac.clone(),
            vendor: result.vendor.clone(),
            device_type: None,
            location: None,
            purpose: None,
            status: DeviceStatus::Online,
            open_ports: result.open_ports.clone(),
            assignment,
            first_seen: now,
            last_seen: Some(now),
        };

        self.detect_conflicts(result).await?;
        self.store.upsert_device(device.clone()).await?;
        self.store
            .append_activity(ActivityLogEntry::new(
                ActivityKind::DeviceDiscovered,
                result.address.to_string(),
                format!(
                    "New device{}",
                    result
                        .hostname
                        .as_deref()
                        .map(|h| format!(" ({h})"))
                        .unwrap_or_default()
                ),
            ))
            .await?;

        tracing::info!(address = %result.address, hostname = ?result.hostname, "Device discovered");

        Ok(ReconcileOutcome {
            device: Some(device),
            newly_discovered: true,
            went_online: true,
            went_offline: false,
        })
    }

    async fn update_device(
        &self,
        mut device: Device,
        result: &ProbeResult,
        subnet_id: Option<SubnetId>,
    ) -> StoreResult<ReconcileOutcome> {
        let previous = device.status;
        let new_status = if result.alive {
            DeviceStatus::Online
        } else {
            DeviceStatus::Offline
        };

        let went_online = new_status == DeviceStatus::Online && previous != DeviceStatus::Online;
        let went_offline = new_status == DeviceStatus::Offline && previous == DeviceStatus::Online;

        device.status = new_status;
        device.subnet_id = subnet_id;
        if result.alive {
            device.last_seen = Some(Utc::now());
            device.open_ports = result.open_ports.clone();
            // A failed identity step must not erase what we know.
            if result.hostname.is_some() {
                device.hostname = result.hostname.clone();
            }
            if result.mac.is_some() {
                device.mac = result.mac.clone();
            }
            if result.vendor.is_some() {
                device.vendor = result.vendor.clone();
            }
        }

        if result.alive {
            self.detect_conflicts(result).await?;
        }
        self.store.upsert_device(device.clone()).await?;

        if went_offline {
            self.store
                .append_activity(ActivityLogEntry::new(
                    ActivityKind::DeviceOffline,
                    device.address.to_string(),
                    "Device stopped responding".to_string(),
                ))
                .await?;
            self.alerts
                .notify(AlertEvent {
                    event_type: AlertKind::DeviceOffline,
                    subject_id: device.address.to_string(),
                    detail: format!(
                        "{} went offline",
                        device.hostname.as_deref().unwrap_or("device")
                    ),
                })
                .await;
            tracing::info!(address = %device.address, "Device went offline");
        } else if went_online {
            self.store
                .append_activity(ActivityLogEntry::new(
                    ActivityKind::DeviceOnline,
                    device.address.to_string(),
                    "Device came online".to_string(),
                ))
                .await?;
            tracing::info!(address = %device.address, "Device came online");
        }

        Ok(ReconcileOutcome {
            device: Some(device),
            newly_discovered: false,
            went_online,
            went_offline,
        })
    }

    /// Informational conflict detection; never blocks reconciliation.
    /// Replaying the same sighting does not append duplicate entries.
    async fn detect_conflicts(&self, result: &ProbeResult) -> StoreResult<()> {
        if let Some(mac) = &result.mac {
            for other in self.store.find_devices_by_mac(mac).await? {
                if other.address != result.address {
                    let appended = self
                        .log_conflict(
                            result.address,
                            format!("MAC {mac} previously seen at {}", other.address),
                        )
                        .await?;
                    if appended {
                        tracing::warn!(
                            address = %result.address,
                            mac = %mac,
                            previous = %other.address,
                            "MAC address moved"
                        );
                    }
                }
            }
        }

        if let Some(hostname) = &result.hostname {
            for other in self.store.find_devices_by_hostname(hostname).await? {
                let different_owner = match (&other.mac, &result.mac) {
                    (Some(a), Some(b)) => !a.eq_ignore_ascii_case(b),
                    _ => false,
                };
                if other.address != result.address && different_owner {
                    let appended = self
                        .log_conflict(
                            result.address,
                            format!(
                                "Hostname {hostname} already owned by {} ({})",
                                other.address,
                                other.mac.as_deref().unwrap_or("unknown mac")
                            ),
                        )
                        .await?;
                    if appended {
                        tracing::warn!(
                            address = %result.address,
                            hostname = %hostname,
                            owner = %other.address,
                            "Hostname conflict"
                        );
                    }
                }
            }
        }

        Ok(())
    }

    /// Append an `address_conflict` entry unless an identical one is
    /// already on the log, so replayed results stay idempotent. Returns
    /// whether a new entry was written.
    async fn log_conflict(&self, address: Ipv4Addr, detail: String) -> StoreResult<bool> {
        let subject = address.to_string();
        let duplicate = self.store.list_activity().await?.iter().any(|e| {
            e.kind == ActivityKind::AddressConflict && e.subject == subject && e.detail == detail
        });
        if duplicate {
            return Ok(false);
        }
        self.store
            .append_activity(ActivityLogEntry::new(
                ActivityKind::AddressConflict,
                subject,
                detail,
            ))
            .await?;
        Ok(true)
    }
}

/// Most-specific configured subnet containing `address`; ties on prefix
/// length break on subnet id for determinism.
pub fn longest_prefix_match(subnets: &[Subnet], address: Ipv4Addr) -> Option<SubnetId> {
    subnets
        .iter()
        .filter(|s| s.cidr.contains(&address))
        .max_by_key(|s| (s.cidr.prefix_len(), s.id))
        .map(|s| s.id)
}
