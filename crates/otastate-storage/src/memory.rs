//! In-memory durable medium
//!
//! Clones share the same backing store, so a clone handed to a fresh
//! [`crate::Storage`] behaves like the same flash partition seen after a
//! reboot. Capacity limits and injected failures make write-failure paths
//! testable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::keys::is_valid_key;
use crate::traits::DurableMedium;
use crate::{StorageError, StorageResult};

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, Vec<u8>>,
    capacity: Option<usize>,
    fail_writes: bool,
    unavailable: bool,
}

impl MemoryState {
    fn used_bytes(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

/// Shared in-memory key-value medium
#[derive(Debug, Clone, Default)]
pub struct MemoryMedium {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryMedium {
    /// Create an empty, unbounded medium
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty medium holding at most `bytes` of values
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        let medium = Self::new();
        if let Ok(mut state) = medium.state.lock() {
            state.capacity = Some(bytes);
        }
        medium
    }

    /// Make every subsequent write fail with an I/O error
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_writes = fail;
        }
    }

    /// Make `check` report the medium as unavailable
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.unavailable = unavailable;
        }
    }

    /// Total bytes currently stored
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.state.lock().map(|s| s.used_bytes()).unwrap_or(0)
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StorageError::LockFailure("memory medium lock poisoned".to_string()))
    }
}

impl DurableMedium for MemoryMedium {
    fn check(&self) -> StorageResult<()> {
        if self.lock()?.unavailable {
            return Err(StorageError::MediumUnavailable(
                "memory medium marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        if !is_valid_key(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.lock()?.entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        if !is_valid_key(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        let mut state = self.lock()?;
        if state.fail_writes {
            return Err(StorageError::Io {
                key: key.to_string(),
                reason: "injected write failure".to_string(),
            });
        }

        if let Some(capacity) = state.capacity {
            let current = state.entries.get(key).map_or(0, Vec::len);
            let needed = state.used_bytes() - current + value.len();
            if needed > capacity {
                return Err(StorageError::MediumFull {
                    key: key.to_string(),
                });
            }
        }

        let mut owned = Vec::new();
        owned.try_reserve_exact(value.len()).map_err(|e| {
            StorageError::AllocationFailure(format!("copying {} bytes for {key}: {e}", value.len()))
        })?;
        owned.extend_from_slice(value);

        state.entries.insert(key.to_string(), owned);
        debug!(key, len = value.len(), "memory medium write");
        Ok(())
    }

    fn erase(&self, key: &str) -> StorageResult<()> {
        if !is_valid_key(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        self.lock()?.entries.remove(key);
        Ok(())
    }

    fn medium_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let medium = MemoryMedium::new();
        let other = medium.clone();

        medium.write("auth_keys", b"abc").unwrap();
        assert_eq!(other.read("auth_keys").unwrap(), Some(b"abc".to_vec()));
    }

    #[test]
    fn test_capacity_rejects_without_mutating() {
        let medium = MemoryMedium::with_capacity(8);

        medium.write("auth_keys", b"12345").unwrap();
        let err = medium.write("ota_deployment", b"123456").unwrap_err();

        assert!(matches!(err, StorageError::MediumFull { .. }));
        assert_eq!(medium.read("ota_deployment").unwrap(), None);
        assert_eq!(medium.used_bytes(), 5);
    }

    #[test]
    fn test_capacity_counts_replaced_value_once() {
        let medium = MemoryMedium::with_capacity(8);

        medium.write("auth_keys", b"12345678").unwrap();
        medium.write("auth_keys", b"87654321").unwrap();

        assert_eq!(medium.read("auth_keys").unwrap(), Some(b"87654321".to_vec()));
    }

    #[test]
    fn test_injected_failure_keeps_old_value() {
        let medium = MemoryMedium::new();
        medium.write("auth_keys", b"old").unwrap();

        medium.set_fail_writes(true);
        assert!(medium.write("auth_keys", b"new").is_err());

        assert_eq!(medium.read("auth_keys").unwrap(), Some(b"old".to_vec()));
    }
}
