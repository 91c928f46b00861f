//! netvista-inventory: the persistence seam between the scan engine and
//! whatever stores the device inventory.
//!
//! The engine only ever talks to [`InventoryStore`]; the management
//! application supplies its database-backed implementation, while the
//! standalone daemon and the test suite use [`MemoryInventory`].

pub mod alert;
pub mod memory;
pub mod store;

pub use alert::{AlertSink, LogAlerts};
pub use memory::MemoryInventory;
pub use store::{InventoryError, InventoryStore};
