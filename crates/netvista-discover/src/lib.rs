//! netvista-discover: Network discovery and scan orchestration engine.
//!
//! Sweeps configured subnets for live hosts, probes each address for
//! identity (reverse DNS, open ports, MAC/vendor), streams progress to
//! subscribers, and reconciles results into the device inventory.

pub mod config;
pub mod coordinator;
pub mod enumerate;
pub mod error;
pub mod oui;
pub mod probe;
pub mod progress;
pub mod reconcile;
pub mod registry;
pub mod scheduler;
