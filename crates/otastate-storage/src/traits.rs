//! Durable medium trait

use crate::StorageResult;

/// Byte-oriented key-value persistence service backing [`crate::Storage`]
///
/// Implementations must make every `write` a single atomic transaction for the
/// key it touches: after a power loss the key holds either the previous bytes
/// or the new bytes in full.
pub trait DurableMedium: Send + Sync {
    /// Verify the medium is usable
    fn check(&self) -> StorageResult<()>;

    /// Read the bytes stored under `key`, `None` if absent
    fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Atomically replace the bytes stored under `key`
    fn write(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Remove `key`; erasing an absent key succeeds
    fn erase(&self, key: &str) -> StorageResult<()>;

    /// Check if a key exists
    fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.read(key)?.is_some())
    }

    /// Short medium name for logs
    fn medium_type(&self) -> &'static str;
}
