//! `Inventory`: cache and publisher lifecycle
//!
//! Owns one [`InventoryCache`] and the [`PeriodicPublisher`] reading from it.
//! Instances are independent; nothing here is process-global.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::cache::InventoryCache;
use crate::config::InventoryConfig;
use crate::error::InventoryResult;
use crate::publisher::{InventoryPublisher, PeriodicPublisher, PublisherStatus};
use crate::types::{InventoryEntry, InventoryList};

/// Inventory subsystem
pub struct Inventory {
    cache: Arc<InventoryCache>,
    publisher: PeriodicPublisher,
}

impl Inventory {
    /// Create the cache and an inactive publish schedule
    #[instrument(skip(config, publisher), fields(artifact = %config.artifact_name, device_type = %config.device_type))]
    pub fn init(config: InventoryConfig, publisher: Arc<dyn InventoryPublisher>) -> Self {
        let mut cache = InventoryCache::new(config.effective_lock_timeout());
        if let Some(limit) = config.memory_limit {
            cache = cache.with_memory_limit(limit);
        }
        let cache = Arc::new(cache);
        let publisher = PeriodicPublisher::new(config, Arc::clone(&cache), publisher);

        info!(period = ?publisher.period(), "inventory initialized");
        Self { cache, publisher }
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &InventoryConfig {
        self.publisher.config()
    }

    /// Shared handle to the cache
    #[must_use]
    pub fn cache(&self) -> Arc<InventoryCache> {
        Arc::clone(&self.cache)
    }

    /// Start periodic publishing
    ///
    /// # Errors
    /// See [`PeriodicPublisher::activate`].
    pub fn activate(&self) -> InventoryResult<()> {
        self.publisher.activate()
    }

    /// Stop periodic publishing without releasing anything
    pub async fn deactivate(&self) {
        self.publisher.deactivate().await;
    }

    /// Publish once now
    ///
    /// # Errors
    /// See [`PeriodicPublisher::execute`].
    pub fn execute(&self) -> InventoryResult<()> {
        self.publisher.execute()
    }

    /// Replace the cached inventory
    ///
    /// # Errors
    /// See [`InventoryCache::set`].
    pub async fn set(&self, list: Option<&[InventoryEntry]>) -> InventoryResult<()> {
        self.cache.set(list).await
    }

    /// Current inventory
    ///
    /// # Errors
    /// See [`InventoryCache::snapshot`].
    pub async fn snapshot(&self) -> InventoryResult<Arc<InventoryList>> {
        self.cache.snapshot().await
    }

    /// Publisher counters
    #[must_use]
    pub fn status(&self) -> PublisherStatus {
        self.publisher.status()
    }

    /// Tear down: delete the schedule first, then release the cache
    ///
    /// Safe to call more than once.
    #[instrument(skip(self))]
    pub async fn exit(&self) {
        self.publisher.exit().await;
        self.cache.exit().await;
        info!("inventory released");
    }
}
