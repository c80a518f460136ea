//! Error types for otastate-inventory

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during inventory operations
#[derive(Error, Debug, Clone)]
pub enum InventoryError {
    /// Copying an entry into cache-owned storage failed
    #[error("allocation failure copying entry {index}: {reason}")]
    AllocationFailure {
        /// Position of the entry in the submitted list
        index: usize,
        /// Why the copy failed
        reason: String,
    },

    /// The cache lock was not acquired in time
    #[error("inventory lock not acquired within {0:?}")]
    LockTimeout(Duration),

    /// The publish collaborator reported a failure
    #[error("publish failed: {0}")]
    PublishFailure(String),

    /// The periodic schedule is not running
    #[error("inventory schedule is not active")]
    NotActive,

    /// The schedule could not be started
    #[error("schedule error: {0}")]
    ScheduleError(String),

    /// The inventory has been released by `exit`
    #[error("inventory has been released")]
    Released,
}

impl InventoryError {
    /// Check if error is retryable
    ///
    /// The periodic publisher retries these on its next tick.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InventoryError::LockTimeout(_) | InventoryError::PublishFailure(_)
        )
    }
}

/// Result type for inventory operations
pub type InventoryResult<T> = Result<T, InventoryError>;
