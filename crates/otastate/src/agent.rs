//! Agent wiring: boot-time recovery and inventory publishing

use async_trait::async_trait;
use otastate_inventory::{
    InventoryConfig, InventoryError, InventoryList, InventoryPublisher, InventoryResult,
};
use otastate_storage::{DeploymentRecord, Storage, StorageResult};
use serde::Serialize;
use tracing::{info, instrument, warn};

/// State recovered from storage at boot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootState {
    /// Whether a key pair is already provisioned
    pub has_auth_keys: bool,
    /// Deployment interrupted by the last reboot, if any
    pub pending_deployment: Option<DeploymentRecord>,
}

/// Read the key pair and deployment marker left by the previous run
///
/// # Errors
/// Returns an error if storage cannot be read or a record is corrupted.
#[instrument(skip(storage))]
pub fn recover(storage: &Storage) -> StorageResult<BootState> {
    let has_auth_keys = storage.get_auth_keys()?.is_some();
    if !has_auth_keys {
        info!("no authentication keys stored, a new key pair must be provisioned");
    }

    let pending_deployment = storage.get_ota_deployment()?;
    match &pending_deployment {
        Some(record) => warn!(
            id = %record.id,
            artifact = %record.artifact_name,
            "deployment interrupted by reboot, update workflow must resume or roll back"
        ),
        None => info!("no deployment in progress"),
    }

    Ok(BootState {
        has_auth_keys,
        pending_deployment,
    })
}

#[derive(Serialize)]
struct InventoryReport<'a> {
    artifact_name: &'a str,
    device_type: &'a str,
    attributes: &'a InventoryList,
}

/// Publisher writing each inventory report to the log
///
/// Stands in for the networking layer when the agent runs without one.
pub struct LogPublisher {
    artifact_name: String,
    device_type: String,
}

impl LogPublisher {
    /// Create a publisher tagging reports with the device identity
    #[must_use]
    pub fn new(config: &InventoryConfig) -> Self {
        Self {
            artifact_name: config.artifact_name.clone(),
            device_type: config.device_type.clone(),
        }
    }

    /// Encode a report as JSON
    ///
    /// # Errors
    /// Returns `PublishFailure` if encoding fails.
    pub fn encode(&self, list: &InventoryList) -> InventoryResult<String> {
        let report = InventoryReport {
            artifact_name: &self.artifact_name,
            device_type: &self.device_type,
            attributes: list,
        };
        serde_json::to_string(&report).map_err(|e| InventoryError::PublishFailure(e.to_string()))
    }
}

#[async_trait]
impl InventoryPublisher for LogPublisher {
    async fn publish_inventory(&self, list: &InventoryList) -> InventoryResult<()> {
        let report = self.encode(list)?;
        info!(entries = list.len(), report = %report, "inventory report");
        Ok(())
    }
}
