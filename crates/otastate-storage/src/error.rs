//! Error types for otastate-storage

use thiserror::Error;

/// Errors that can occur during storage operations
///
/// Reading a record that was never written is not an error; getters return
/// `Ok(None)` for that case.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// The durable medium could not be opened, or has been released
    #[error("storage medium unavailable: {0}")]
    MediumUnavailable(String),

    /// The medium has no room left for the write
    #[error("storage medium full while writing {key}")]
    MediumFull {
        /// Key being written
        key: String,
    },

    /// I/O error while accessing the medium
    #[error("I/O error on {key}: {reason}")]
    Io {
        /// Key being accessed
        key: String,
        /// Underlying error message
        reason: String,
    },

    /// A stored record could not be decoded
    #[error("corrupted record {key}: {reason}")]
    Corrupted {
        /// Key holding the record
        key: String,
        /// Decoding failure
        reason: String,
    },

    /// Record rejected before being written
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Key not usable on this medium
    #[error("invalid medium key: {0}")]
    InvalidKey(String),

    /// Out of memory while copying a record
    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    /// Internal lock could not be acquired
    #[error("lock failure: {0}")]
    LockFailure(String),
}

impl StorageError {
    /// Check if error is retryable
    ///
    /// Transient I/O failures may succeed on a later attempt; a full, closed or
    /// corrupted medium will not recover on its own.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Io { .. } | StorageError::LockFailure(_))
    }

    pub(crate) fn io(key: &str, err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::StorageFull {
            return StorageError::MediumFull {
                key: key.to_string(),
            };
        }
        StorageError::Io {
            key: key.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
