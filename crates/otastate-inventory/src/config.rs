//! Inventory configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Publish period used when none is configured (8 hours)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(28_800);

/// Longest accepted publish period (one year); larger values are clamped
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Maximum wait for the cache lock when none is configured
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the inventory cache and its publisher
///
/// Zero intervals mean "use the default".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Name of the currently installed artifact
    #[serde(default)]
    pub artifact_name: String,
    /// Device type reported to the management server
    #[serde(default)]
    pub device_type: String,
    /// Publish period in seconds
    #[serde(default)]
    pub poll_interval: u64,
    /// Cache lock timeout in milliseconds
    #[serde(default)]
    pub lock_timeout_ms: u64,
    /// Upper bound on bytes held by cached names and values
    #[serde(default)]
    pub memory_limit: Option<usize>,
}

impl InventoryConfig {
    /// Create a configuration with default intervals
    pub fn new(artifact_name: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            artifact_name: artifact_name.into(),
            device_type: device_type.into(),
            ..Self::default()
        }
    }

    /// Set publish period in seconds
    #[must_use]
    pub fn with_poll_interval(mut self, seconds: u64) -> Self {
        self.poll_interval = seconds;
        self
    }

    /// Set cache lock timeout
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set cache memory limit in bytes
    #[must_use]
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Publish period after defaulting and clamping to [`MAX_POLL_INTERVAL`]
    #[must_use]
    pub fn effective_poll_interval(&self) -> Duration {
        if self.poll_interval == 0 {
            DEFAULT_POLL_INTERVAL
        } else {
            Duration::from_secs(self.poll_interval).min(MAX_POLL_INTERVAL)
        }
    }

    /// Lock timeout after defaulting
    #[must_use]
    pub fn effective_lock_timeout(&self) -> Duration {
        if self.lock_timeout_ms == 0 {
            DEFAULT_LOCK_TIMEOUT
        } else {
            Duration::from_millis(self.lock_timeout_ms)
        }
    }
}
