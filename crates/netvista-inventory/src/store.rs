//! The `InventoryStore` trait: what the engine needs from persistence.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use thiserror::Error;

use netvista_core::types::{ActivityLogEntry, Device, Subnet, SubnetId};

#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Subnet not found: {0}")]
    SubnetNotFound(SubnetId),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, InventoryError>;

/// Persistence operations the scan engine depends on.
///
/// `upsert_device` must be atomic per address: the store keys devices by
/// IPv4 address (at most one row per address) and returns the row it
/// replaced, if any. The engine additionally serializes reconciliation
/// per address on its side, so implementations do not need row locking
/// beyond that atomicity.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn list_subnets(&self) -> Result<Vec<Subnet>>;

    async fn get_subnet(&self, id: SubnetId) -> Result<Option<Subnet>>;

    async fn get_device(&self, address: Ipv4Addr) -> Result<Option<Device>>;

    /// Devices whose normalized MAC equals `mac`.
    async fn find_devices_by_mac(&self, mac: &str) -> Result<Vec<Device>>;

    /// Devices whose hostname equals `hostname` (case-insensitive).
    async fn find_devices_by_hostname(&self, hostname: &str) -> Result<Vec<Device>>;

    async fn list_devices(&self) -> Result<Vec<Device>>;

    /// Insert or replace the row for `device.address`, returning the
    /// previous row if one existed.
    async fn upsert_device(&self, device: Device) -> Result<Option<Device>>;

    /// Append to the immutable activity log.
    async fn append_activity(&self, entry: ActivityLogEntry) -> Result<()>;

    async fn list_activity(&self) -> Result<Vec<ActivityLogEntry>>;
}
