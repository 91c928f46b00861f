//! In-memory `InventoryStore` used by the standalone daemon and tests.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use tokio::sync::RwLock;

use netvista_core::types::{ActivityLogEntry, Device, Subnet, SubnetId};

use crate::store::{InventoryError, InventoryStore, Result};

/// RwLock-guarded maps. Devices are keyed by address, which is what
/// makes `upsert_device` atomic per address.
#[derive(Default)]
pub struct MemoryInventory {
    subnets: RwLock<HashMap<SubnetId, Subnet>>,
    devices: RwLock<HashMap<Ipv4Addr, Device>>,
    activity: RwLock<Vec<ActivityLogEntry>>,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subnet. Intended for daemon startup and tests; the
    /// management application owns subnet CRUD in production.
    pub async fn add_subnet(&self, subnet: Subnet) -> SubnetId {
        let id = subnet.id;
        self.subnets.write().await.insert(id, subnet);
        id
    }

    /// Remove a subnet definition. Devices that referenced it keep their
    /// rows with `subnet_id` nulled.
    pub async fn remove_subnet(&self, id: SubnetId) -> Result<()> {
        let removed = self.subnets.write().await.remove(&id);
        if removed.is_none() {
            return Err(InventoryError::SubnetNotFound(id));
        }
        let mut devices = self.devices.write().await;
        for device in devices.values_mut() {
            if device.subnet_id == Some(id) {
                device.subnet_id = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for MemoryInventory {
    async fn list_subnets(&self) -> Result<Vec<Subnet>> {
        Ok(self.subnets.read().await.values().cloned().collect())
    }

    async fn get_subnet(&self, id: SubnetId) -> Result<Option<Subnet>> {
        Ok(self.subnets.read().await.get(&id).cloned())
    }

    async fn get_device(&self, address: Ipv4Addr) -> Result<Option<Device>> {
        Ok(self.devices.read().await.get(&address).cloned())
    }

    async fn find_devices_by_mac(&self, mac: &str) -> Result<Vec<Device>> {
        let needle = mac.to_ascii_uppercase();
        Ok(self
            .devices
            .read()
            .await
            .values()
            .filter(|d| d.mac.as_deref().map(str::to_ascii_uppercase) == Some(needle.clone()))
            .cloned()
            .collect())
    }

    async fn find_devices_by_hostname(&self, hostname: &str) -> Result<Vec<Device>> {
        Ok(self
            .devices
            .read()
            .await
            .values()
            .filter(|d| {
                d.hostname
                    .as_deref()
                    .is_some_and(|h| h.eq_ignore_ascii_case(hostname))
            })
            .cloned()
            .collect())
    }

    async fn list_devices(&self) -> Result<Vec<Device>> {
        Ok(self.devices.read().await.values().cloned().collect())
    }

    async fn upsert_device(&self, device: Device) -> Result<Option<Device>> {
        Ok(self.devices.write().await.insert(device.address, device))
    }

    async fn append_activity(&self, entry: ActivityLogEntry) -> Result<()> {
        self.activity.write().await.push(entry);
        Ok(())
    }

    async fn list_activity(&self) -> Result<Vec<ActivityLogEntry>> {
        Ok(self.activity.read().await.clone())
    }
}
