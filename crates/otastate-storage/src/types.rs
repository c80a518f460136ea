//! Persisted record types

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::{StorageError, StorageResult};

// ============================================================================
// Authentication keys
// ============================================================================

/// Device authentication key pair
///
/// Both halves are always present together. `Debug` only prints lengths so key
/// material never reaches the logs.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthKeyPair {
    private_key: Vec<u8>,
    public_key: Vec<u8>,
}

impl AuthKeyPair {
    /// Create a key pair from its two halves
    #[must_use]
    pub fn new(private_key: Vec<u8>, public_key: Vec<u8>) -> Self {
        Self {
            private_key,
            public_key,
        }
    }

    /// Private key bytes
    #[must_use]
    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }

    /// Public key bytes
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Split into `(private_key, public_key)`
    #[must_use]
    pub fn into_parts(self) -> (Vec<u8>, Vec<u8>) {
        (self.private_key, self.public_key)
    }

    /// Reject pairs with a missing half
    ///
    /// # Errors
    /// Returns `InvalidRecord` if either key is empty.
    pub fn validate(&self) -> StorageResult<()> {
        if self.private_key.is_empty() || self.public_key.is_empty() {
            return Err(StorageError::InvalidRecord(
                "authentication keys must have both a private and a public key".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn encode(&self) -> StorageResult<Vec<u8>> {
        let stored = StoredAuthKeys {
            private_key: BASE64.encode(&self.private_key),
            public_key: BASE64.encode(&self.public_key),
        };
        serde_json::to_vec(&stored).map_err(|e| StorageError::InvalidRecord(e.to_string()))
    }

    pub(crate) fn decode(key: &str, bytes: &[u8]) -> StorageResult<Self> {
        let corrupted = |reason: String| StorageError::Corrupted {
            key: key.to_string(),
            reason,
        };

        let stored: StoredAuthKeys =
            serde_json::from_slice(bytes).map_err(|e| corrupted(e.to_string()))?;
        let pair = Self {
            private_key: BASE64
                .decode(stored.private_key)
                .map_err(|e| corrupted(format!("private key: {e}")))?,
            public_key: BASE64
                .decode(stored.public_key)
                .map_err(|e| corrupted(format!("public key: {e}")))?,
        };
        pair.validate()
            .map_err(|_| corrupted("stored key pair is missing a half".to_string()))?;

        Ok(pair)
    }
}

impl fmt::Debug for AuthKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthKeyPair")
            .field("private_key_len", &self.private_key.len())
            .field("public_key_len", &self.public_key.len())
            .finish()
    }
}

/// On-medium layout of the key pair
#[derive(Serialize, Deserialize)]
struct StoredAuthKeys {
    private_key: String,
    public_key: String,
}

// ============================================================================
// OTA deployment
// ============================================================================

/// Marker for an update in progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Deployment ID assigned by the management server
    pub id: String,
    /// Name of the artifact being installed
    pub artifact_name: String,
}

impl DeploymentRecord {
    /// Create a new deployment record
    pub fn new(id: impl Into<String>, artifact_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            artifact_name: artifact_name.into(),
        }
    }

    /// Reject records with a missing field
    ///
    /// # Errors
    /// Returns `InvalidRecord` if the ID or artifact name is empty.
    pub fn validate(&self) -> StorageResult<()> {
        if self.id.is_empty() {
            return Err(StorageError::InvalidRecord(
                "deployment ID is empty".to_string(),
            ));
        }
        if self.artifact_name.is_empty() {
            return Err(StorageError::InvalidRecord(
                "deployment artifact name is empty".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn encode(&self) -> StorageResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StorageError::InvalidRecord(e.to_string()))
    }

    pub(crate) fn decode(key: &str, bytes: &[u8]) -> StorageResult<Self> {
        let record: Self = serde_json::from_slice(bytes).map_err(|e| StorageError::Corrupted {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        record.validate().map_err(|e| StorageError::Corrupted {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(record)
    }
}
