//! Storage: key pair and deployment persistence
//!
//! `Storage` owns the medium handle behind an internal mutex. Every operation
//! takes that lock, so concurrent tasks may share one instance (for example
//! through an `Arc`) without external coordination, and an operation racing
//! with [`Storage::exit`] either completes or reports `MediumUnavailable`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, instrument, warn};

use crate::file::FileMedium;
use crate::keys::MediumKeys;
use crate::traits::DurableMedium;
use crate::types::{AuthKeyPair, DeploymentRecord};
use crate::{StorageError, StorageResult};

/// Durable store for authentication keys and the OTA deployment record
pub struct Storage {
    medium: Mutex<Option<Box<dyn DurableMedium>>>,
}

impl Storage {
    /// Prepare a medium for use
    ///
    /// # Errors
    /// Returns `MediumUnavailable` if the medium fails its availability check.
    #[instrument(skip(medium), fields(medium = medium.medium_type()))]
    pub fn init(medium: impl DurableMedium + 'static) -> StorageResult<Self> {
        medium.check()?;
        info!("storage initialized");

        Ok(Self {
            medium: Mutex::new(Some(Box::new(medium))),
        })
    }

    /// Open a directory-backed store
    ///
    /// # Errors
    /// Returns `MediumUnavailable` if the directory cannot be created or used.
    pub fn open_dir(root: impl AsRef<Path>) -> StorageResult<Self> {
        Self::init(FileMedium::open(root)?)
    }

    /// Whether the medium handle is still held
    #[must_use]
    pub fn is_open(&self) -> bool {
        match self.medium.lock() {
            Ok(guard) => guard.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Option<Box<dyn DurableMedium>>>> {
        self.medium
            .lock()
            .map_err(|_| StorageError::LockFailure("storage lock poisoned".to_string()))
    }

    fn with_medium<T>(
        &self,
        op: impl FnOnce(&dyn DurableMedium) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let guard = self.lock()?;
        let medium = guard
            .as_deref()
            .ok_or_else(|| StorageError::MediumUnavailable("storage has been released".to_string()))?;
        op(medium)
    }

    // ========================================================================
    // Authentication keys
    // ========================================================================

    /// Read the stored key pair, `None` if never set or erased
    ///
    /// # Errors
    /// Returns an error if the medium cannot be read or the record is corrupted.
    #[instrument(skip(self))]
    pub fn get_auth_keys(&self) -> StorageResult<Option<AuthKeyPair>> {
        let key = MediumKeys::AUTH_KEYS;
        let pair = self.with_medium(|medium| {
            medium
                .read(key)?
                .map(|bytes| AuthKeyPair::decode(key, &bytes))
                .transpose()
        })?;

        match &pair {
            Some(p) => debug!(
                private_key_len = p.private_key().len(),
                public_key_len = p.public_key().len(),
                "authentication keys found"
            ),
            None => debug!("authentication keys not found"),
        }
        Ok(pair)
    }

    /// Persist the key pair, replacing any previous one
    ///
    /// Both halves are written as one record, so a failed or interrupted write
    /// leaves the previous pair intact.
    ///
    /// # Errors
    /// Returns `InvalidRecord` for a pair with a missing half, or the medium's
    /// write error.
    #[instrument(skip(self, pair))]
    pub fn set_auth_keys(&self, pair: &AuthKeyPair) -> StorageResult<()> {
        pair.validate()?;
        let bytes = pair.encode()?;

        self.with_medium(|medium| medium.write(MediumKeys::AUTH_KEYS, &bytes))?;
        info!(
            private_key_len = pair.private_key().len(),
            public_key_len = pair.public_key().len(),
            "authentication keys stored"
        );
        Ok(())
    }

    /// Remove the key pair
    ///
    /// # Errors
    /// Returns the medium's erase error.
    #[instrument(skip(self))]
    pub fn erase_auth_keys(&self) -> StorageResult<()> {
        self.with_medium(|medium| medium.erase(MediumKeys::AUTH_KEYS))?;
        info!("authentication keys erased");
        Ok(())
    }

    // ========================================================================
    // OTA deployment
    // ========================================================================

    /// Read the in-flight deployment, `None` if no update is in progress
    ///
    /// # Errors
    /// Returns an error if the medium cannot be read or the record is corrupted.
    #[instrument(skip(self))]
    pub fn get_ota_deployment(&self) -> StorageResult<Option<DeploymentRecord>> {
        let key = MediumKeys::OTA_DEPLOYMENT;
        self.with_medium(|medium| {
            medium
                .read(key)?
                .map(|bytes| DeploymentRecord::decode(key, &bytes))
                .transpose()
        })
    }

    /// Record the deployment being installed, replacing any previous one
    ///
    /// # Errors
    /// Returns `InvalidRecord` for an incomplete record, or the medium's write
    /// error.
    #[instrument(skip(self, record), fields(id = %record.id, artifact = %record.artifact_name))]
    pub fn set_ota_deployment(&self, record: &DeploymentRecord) -> StorageResult<()> {
        record.validate()?;
        let bytes = record.encode()?;

        self.with_medium(|medium| medium.write(MediumKeys::OTA_DEPLOYMENT, &bytes))?;
        info!("deployment recorded");
        Ok(())
    }

    /// Remove the deployment record
    ///
    /// # Errors
    /// Returns the medium's erase error.
    #[instrument(skip(self))]
    pub fn clear_ota_deployment(&self) -> StorageResult<()> {
        self.with_medium(|medium| medium.erase(MediumKeys::OTA_DEPLOYMENT))?;
        info!("deployment cleared");
        Ok(())
    }

    /// Erase every record owned by the storage layer
    ///
    /// All keys are attempted even if one fails; the first error is returned.
    ///
    /// # Errors
    /// Returns the first erase error encountered.
    #[instrument(skip(self))]
    pub fn factory_reset(&self) -> StorageResult<()> {
        self.with_medium(|medium| {
            let mut first_error = None;
            for key in MediumKeys::ALL {
                if let Err(e) = medium.erase(key) {
                    warn!(key, error = %e, "failed to erase record");
                    first_error.get_or_insert(e);
                }
            }
            first_error.map_or(Ok(()), Err)
        })?;
        info!("storage factory reset");
        Ok(())
    }

    /// Release the medium handle
    ///
    /// Safe to call more than once. A poisoned lock does not prevent release.
    #[instrument(skip(self))]
    pub fn exit(&self) {
        let mut guard = match self.medium.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("storage lock poisoned, releasing anyway");
                poisoned.into_inner()
            }
        };

        match guard.take() {
            Some(medium) => {
                info!(medium = medium.medium_type(), "storage released");
            }
            None => debug!("storage already released"),
        }
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryMedium;

    fn storage() -> (Storage, MemoryMedium) {
        let medium = MemoryMedium::new();
        (Storage::init(medium.clone()).unwrap(), medium)
    }

    #[test]
    fn test_init_unavailable_medium() {
        let medium = MemoryMedium::new();
        medium.set_unavailable(true);

        let err = Storage::init(medium).unwrap_err();
        assert!(matches!(err, StorageError::MediumUnavailable(_)));
    }

    #[test]
    fn test_auth_keys_roundtrip_and_erase() {
        let (storage, _) = storage();
        assert_eq!(storage.get_auth_keys().unwrap(), None);

        let pair = AuthKeyPair::new(vec![1, 2, 3], vec![4, 5]);
        storage.set_auth_keys(&pair).unwrap();
        assert_eq!(storage.get_auth_keys().unwrap(), Some(pair));

        storage.erase_auth_keys().unwrap();
        assert_eq!(storage.get_auth_keys().unwrap(), None);
    }

    #[test]
    fn test_set_auth_keys_replaces_previous() {
        let (storage, _) = storage();

        storage
            .set_auth_keys(&AuthKeyPair::new(vec![1], vec![2]))
            .unwrap();
        let newer = AuthKeyPair::new(vec![9; 64], vec![8; 32]);
        storage.set_auth_keys(&newer).unwrap();

        assert_eq!(storage.get_auth_keys().unwrap(), Some(newer));
    }

    #[test]
    fn test_rejects_half_pair_without_writing() {
        let (storage, medium) = storage();

        let err = storage
            .set_auth_keys(&AuthKeyPair::new(vec![1, 2], Vec::new()))
            .unwrap_err();

        assert!(matches!(err, StorageError::InvalidRecord(_)));
        assert_eq!(medium.used_bytes(), 0);
    }

    #[test]
    fn test_deployment_roundtrip_and_clear() {
        let (storage, _) = storage();
        assert_eq!(storage.get_ota_deployment().unwrap(), None);

        let record = DeploymentRecord::new("7f1c-22", "firmware-v2.1");
        storage.set_ota_deployment(&record).unwrap();
        assert_eq!(storage.get_ota_deployment().unwrap(), Some(record));

        storage.clear_ota_deployment().unwrap();
        assert_eq!(storage.get_ota_deployment().unwrap(), None);
    }

    #[test]
    fn test_clear_absent_deployment_is_ok() {
        let (storage, _) = storage();
        storage.clear_ota_deployment().unwrap();
        storage.erase_auth_keys().unwrap();
    }

    #[test]
    fn test_write_failure_is_reported_and_keeps_old_pair() {
        let (storage, medium) = storage();
        let old = AuthKeyPair::new(vec![1; 16], vec![2; 16]);
        storage.set_auth_keys(&old).unwrap();

        medium.set_fail_writes(true);
        let err = storage
            .set_auth_keys(&AuthKeyPair::new(vec![3; 16], vec![4; 16]))
            .unwrap_err();

        assert!(matches!(err, StorageError::Io { .. }));
        assert_eq!(storage.get_auth_keys().unwrap(), Some(old));
    }

    #[test]
    fn test_medium_full_is_reported() {
        let medium = MemoryMedium::with_capacity(32);
        let storage = Storage::init(medium).unwrap();

        let err = storage
            .set_auth_keys(&AuthKeyPair::new(vec![0; 121], vec![0; 91]))
            .unwrap_err();

        assert!(matches!(err, StorageError::MediumFull { .. }));
        assert_eq!(storage.get_auth_keys().unwrap(), None);
    }

    #[test]
    fn test_corrupted_record_is_an_error() {
        let (storage, medium) = storage();
        medium.write(MediumKeys::OTA_DEPLOYMENT, b"{broken").unwrap();

        let err = storage.get_ota_deployment().unwrap_err();
        assert!(matches!(err, StorageError::Corrupted { .. }));
    }

    #[test]
    fn test_factory_reset_erases_everything() {
        let (storage, medium) = storage();
        storage
            .set_auth_keys(&AuthKeyPair::new(vec![1], vec![2]))
            .unwrap();
        storage
            .set_ota_deployment(&DeploymentRecord::new("1", "a"))
            .unwrap();

        storage.factory_reset().unwrap();

        assert_eq!(storage.get_auth_keys().unwrap(), None);
        assert_eq!(storage.get_ota_deployment().unwrap(), None);
        assert_eq!(medium.used_bytes(), 0);
    }

    #[test]
    fn test_exit_is_idempotent() {
        let (storage, _) = storage();
        assert!(storage.is_open());

        storage.exit();
        storage.exit();

        assert!(!storage.is_open());
        let err = storage.get_auth_keys().unwrap_err();
        assert!(matches!(err, StorageError::MediumUnavailable(_)));
    }
}
