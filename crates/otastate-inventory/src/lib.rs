//! otastate-inventory: device inventory cache and publishing
//!
//! Keeps the latest set of inventory attributes in a lock-protected cache and
//! periodically hands a snapshot of it to the networking layer.

pub mod cache;
pub mod config;
pub mod error;
pub mod inventory;
pub mod publisher;
pub mod types;

pub use cache::InventoryCache;
pub use config::{DEFAULT_LOCK_TIMEOUT, DEFAULT_POLL_INTERVAL, InventoryConfig, MAX_POLL_INTERVAL};
pub use error::{InventoryError, InventoryResult};
pub use inventory::Inventory;
pub use publisher::{InventoryPublisher, PeriodicPublisher, PublisherStatus};
pub use types::{InventoryEntry, InventoryList};
