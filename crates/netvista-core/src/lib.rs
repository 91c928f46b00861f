//! netvista-core: Shared types, events, and error handling for the netvista platform.
//!
//! This crate provides the foundational types used across netvista components:
//! - Inventory types (Subnet, Device, ActivityLogEntry)
//! - Scan types (ScanJob, ProbeResult)
//! - Progress and alert event types for observers and the notifier
//! - Common error types

pub mod error;
pub mod events;
pub mod types;

pub use error::NetvistaError;
