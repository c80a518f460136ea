//! Lock-protected inventory cache
//!
//! The cached list lives behind an `Arc` inside a single mutex. A replacement
//! list is deep-copied outside the lock and swapped in whole, and readers clone
//! the `Arc` and release the lock immediately, so no reader ever sees a list
//! that is half old and half new, and nothing slow runs under the lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::config::DEFAULT_LOCK_TIMEOUT;
use crate::error::{InventoryError, InventoryResult};
use crate::types::{InventoryEntry, InventoryList};

/// Cache of the most recent inventory list
pub struct InventoryCache {
    /// Current list; `None` once released
    list: Mutex<Option<Arc<InventoryList>>>,
    /// Maximum wait for `list`
    lock_timeout: Duration,
    /// Maximum bytes of names and values held
    memory_limit: Option<usize>,
    /// Set by `exit` before it tries the lock
    released: AtomicBool,
}

impl InventoryCache {
    /// Create an empty cache
    #[must_use]
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            list: Mutex::new(Some(Arc::new(InventoryList::new()))),
            lock_timeout,
            memory_limit: None,
            released: AtomicBool::new(false),
        }
    }

    /// Bound the bytes of cache-owned names and values
    #[must_use]
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Configured lock timeout
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    fn ensure_open(&self) -> InventoryResult<()> {
        if self.released.load(Ordering::Acquire) {
            return Err(InventoryError::Released);
        }
        Ok(())
    }

    async fn lock(&self) -> InventoryResult<MutexGuard<'_, Option<Arc<InventoryList>>>> {
        self.ensure_open()?;
        let guard = timeout(self.lock_timeout, self.list.lock())
            .await
            .map_err(|_| InventoryError::LockTimeout(self.lock_timeout))?;
        self.ensure_open()?;
        Ok(guard)
    }

    /// Replace the whole cached list
    ///
    /// Every entry is copied into cache-owned storage, so the caller's list may
    /// be changed or dropped as soon as this returns. `None` or an empty slice
    /// clears the cache.
    ///
    /// If any entry cannot be copied the whole call is abandoned and the
    /// previously cached list stays in place.
    ///
    /// # Errors
    /// Returns `AllocationFailure` if copying fails or exceeds the memory limit,
    /// `LockTimeout` if the lock is not acquired in time, and `Released` after
    /// `exit`.
    #[instrument(skip(self, list), fields(len = list.map_or(0, |l| l.len())))]
    pub async fn set(&self, list: Option<&[InventoryEntry]>) -> InventoryResult<()> {
        self.ensure_open()?;
        let replacement = Arc::new(self.copy_list(list.unwrap_or_default())?);

        let previous = {
            let mut guard = self.lock().await?;
            match guard.as_mut() {
                Some(current) => std::mem::replace(current, replacement),
                None => return Err(InventoryError::Released),
            }
        };

        debug!(previous_len = previous.len(), "inventory replaced");
        Ok(())
    }

    /// Empty the cached list
    ///
    /// # Errors
    /// See [`InventoryCache::set`].
    pub async fn clear(&self) -> InventoryResult<()> {
        self.set(None).await
    }

    /// Current list, shared and immutable
    ///
    /// The lock is held only long enough to clone the `Arc`.
    ///
    /// # Errors
    /// Returns `LockTimeout` if the lock is not acquired in time, and
    /// `Released` after `exit`.
    pub async fn snapshot(&self) -> InventoryResult<Arc<InventoryList>> {
        let guard = self.lock().await?;
        guard.as_ref().map(Arc::clone).ok_or(InventoryError::Released)
    }

    /// Number of cached entries
    ///
    /// # Errors
    /// See [`InventoryCache::snapshot`].
    pub async fn len(&self) -> InventoryResult<usize> {
        Ok(self.snapshot().await?.len())
    }

    /// Release the cached list
    ///
    /// Safe to call more than once. The cache rejects every later operation
    /// with `Released` even when the lock cannot be acquired in time; the list
    /// itself is then freed when the cache is dropped.
    #[instrument(skip(self))]
    pub async fn exit(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            debug!("inventory cache already released");
            return;
        }

        match timeout(self.lock_timeout, self.list.lock()).await {
            Ok(mut guard) => {
                guard.take();
                debug!("inventory cache released");
            }
            Err(_) => warn!(
                timeout = ?self.lock_timeout,
                "unable to lock inventory cache during exit"
            ),
        }
    }

    /// Build the cache-owned copy of `source`
    fn copy_list(&self, source: &[InventoryEntry]) -> InventoryResult<InventoryList> {
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(source.len())
            .map_err(|e| InventoryError::AllocationFailure {
                index: 0,
                reason: e.to_string(),
            })?;

        let mut total = 0usize;
        for (index, entry) in source.iter().enumerate() {
            total = total.saturating_add(entry.byte_len());
            if let Some(limit) = self.memory_limit
                && total > limit
            {
                return Err(InventoryError::AllocationFailure {
                    index,
                    reason: format!("inventory exceeds memory limit of {limit} bytes"),
                });
            }

            let copy = entry
                .try_clone()
                .map_err(|e| InventoryError::AllocationFailure {
                    index,
                    reason: e.to_string(),
                })?;
            entries.push(copy);
        }

        Ok(InventoryList::with_entries(entries))
    }
}

impl Default for InventoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}
