//! otastate-storage: durable device state
//!
//! Persists the device authentication key pair and the in-flight OTA deployment
//! record on a byte-oriented key-value medium, so an interrupted update can be
//! resumed or validated after a reboot.

pub mod error;
pub mod file;
pub mod keys;
pub mod memory;
pub mod storage;
pub mod traits;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use file::FileMedium;
pub use keys::MediumKeys;
pub use memory::MemoryMedium;
pub use storage::Storage;
pub use traits::DurableMedium;
pub use types::{AuthKeyPair, DeploymentRecord};
