//! Periodic inventory publishing

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, instrument, warn};

use crate::cache::InventoryCache;
use crate::config::InventoryConfig;
use crate::error::{InventoryError, InventoryResult};
use crate::types::InventoryList;

/// Destination for inventory snapshots, supplied by the networking layer
///
/// Implementations should report failures as `PublishFailure`. Errors never
/// stop the periodic schedule; the next tick retries.
#[async_trait]
pub trait InventoryPublisher: Send + Sync {
    async fn publish_inventory(&self, list: &InventoryList) -> InventoryResult<()>;
}

/// Publish counters and last outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublisherStatus {
    /// Whether the periodic timer is running
    pub active: bool,
    /// Successful publishes since creation
    pub published: u64,
    /// Failed publishes since creation
    pub failed: u64,
    /// Time of the last successful publish
    pub last_published_at: Option<DateTime<Utc>>,
    /// Message of the most recent failure
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct PublishStats {
    published: AtomicU64,
    failed: AtomicU64,
    last_published_at: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

impl PublishStats {
    fn record_success(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut at) = self.last_published_at.lock() {
            *at = Some(Utc::now());
        }
    }

    fn record_failure(&self, error: &InventoryError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(error.to_string());
        }
    }
}

/// Handles of a running schedule
struct ActiveSchedule {
    stop_tx: watch::Sender<bool>,
    trigger: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl ActiveSchedule {
    fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

enum ScheduleState {
    Inactive,
    Active(ActiveSchedule),
    Deleted,
}

/// Recurring task publishing the cached inventory
///
/// Created inactive. Each tick takes a snapshot of the cache (holding its lock
/// only for the copy) and passes it to the [`InventoryPublisher`].
pub struct PeriodicPublisher {
    config: InventoryConfig,
    period: Duration,
    cache: Arc<InventoryCache>,
    publisher: Arc<dyn InventoryPublisher>,
    state: Mutex<ScheduleState>,
    stats: Arc<PublishStats>,
}

impl PeriodicPublisher {
    /// Create an inactive schedule
    ///
    /// A zero poll interval in `config` selects the default period.
    pub fn new(
        config: InventoryConfig,
        cache: Arc<InventoryCache>,
        publisher: Arc<dyn InventoryPublisher>,
    ) -> Self {
        let period = config.effective_poll_interval();
        debug!(period = ?period, "inventory schedule created");

        Self {
            config,
            period,
            cache,
            publisher,
            state: Mutex::new(ScheduleState::Inactive),
            stats: Arc::new(PublishStats::default()),
        }
    }

    /// Configuration the schedule was created with
    #[must_use]
    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    /// Effective publish period
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    fn state(&self) -> MutexGuard<'_, ScheduleState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("schedule state lock poisoned");
                poisoned.into_inner()
            }
        }
    }

    /// Start the recurring timer
    ///
    /// The first publish happens one period after activation. Activating an
    /// already running schedule does nothing; one whose task has ended is
    /// started again.
    ///
    /// # Errors
    /// Returns `Released` after `exit`, or `ScheduleError` when called outside
    /// a tokio runtime.
    #[instrument(skip(self))]
    pub fn activate(&self) -> InventoryResult<()> {
        let mut state = self.state();
        match &*state {
            ScheduleState::Active(active) if active.is_running() => {
                debug!("inventory schedule already active");
                return Ok(());
            }
            ScheduleState::Active(_) => warn!("inventory schedule task ended, restarting"),
            ScheduleState::Deleted => return Err(InventoryError::Released),
            ScheduleState::Inactive => {}
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| InventoryError::ScheduleError(e.to_string()))?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let trigger = Arc::new(Notify::new());
        let handle = runtime.spawn(run_schedule(
            self.period,
            Arc::clone(&self.cache),
            Arc::clone(&self.publisher),
            Arc::clone(&self.stats),
            stop_rx,
            Arc::clone(&trigger),
        ));

        *state = ScheduleState::Active(ActiveSchedule {
            stop_tx,
            trigger,
            handle,
        });
        info!(period = ?self.period, "inventory schedule activated");
        Ok(())
    }

    /// Stop the recurring timer, keeping the schedule for a later `activate`
    ///
    /// A publish already in progress is allowed to finish; this waits for it.
    #[instrument(skip(self))]
    pub async fn deactivate(&self) {
        if let Some(active) = self.take_schedule(ScheduleState::Inactive) {
            stop_schedule(active).await;
            info!("inventory schedule deactivated");
        }
    }

    /// Move out of `Active` into `next` under one lock, leaving `Deleted` as is
    fn take_schedule(&self, next: ScheduleState) -> Option<ActiveSchedule> {
        let mut state = self.state();
        if matches!(*state, ScheduleState::Deleted) {
            return None;
        }
        match std::mem::replace(&mut *state, next) {
            ScheduleState::Active(active) => Some(active),
            _ => None,
        }
    }

    /// Request one publish now, outside the periodic timer
    ///
    /// # Errors
    /// Returns `NotActive` if the schedule is not running.
    pub fn execute(&self) -> InventoryResult<()> {
        match &*self.state() {
            ScheduleState::Active(active) if active.is_running() => {
                active.trigger.notify_one();
                debug!("inventory publish requested");
                Ok(())
            }
            _ => Err(InventoryError::NotActive),
        }
    }

    /// Whether the timer is running
    ///
    /// A schedule whose task has ended on its own is not reported as active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        match &*self.state() {
            ScheduleState::Active(active) => active.is_running(),
            _ => false,
        }
    }

    /// Counters and last outcome
    #[must_use]
    pub fn status(&self) -> PublisherStatus {
        PublisherStatus {
            active: self.is_active(),
            published: self.stats.published.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            last_published_at: self
                .stats
                .last_published_at
                .lock()
                .map(|at| *at)
                .unwrap_or_default(),
            last_error: self
                .stats
                .last_error
                .lock()
                .map(|e| e.clone())
                .unwrap_or_default(),
        }
    }

    /// Deactivate and delete the schedule
    ///
    /// Safe to call more than once. After this the schedule cannot be
    /// activated again.
    #[instrument(skip(self))]
    pub async fn exit(&self) {
        if let Some(active) = self.take_schedule(ScheduleState::Deleted) {
            stop_schedule(active).await;
        }
        debug!("inventory schedule deleted");
    }
}

impl Drop for PeriodicPublisher {
    fn drop(&mut self) {
        if let ScheduleState::Active(active) = &*self.state() {
            warn!("inventory schedule dropped while active");
            active.handle.abort();
        }
    }
}

/// Signal the schedule task to stop and wait for it
async fn stop_schedule(active: ActiveSchedule) {
    // The receiver is gone if the task already ended
    let _ = active.stop_tx.send(true);
    if let Err(e) = active.handle.await {
        warn!(error = %e, "inventory schedule task ended abnormally");
    }
}

/// Schedule loop: wait for a tick, a manual trigger or the stop signal
///
/// The stop signal is only observed between publishes, so an in-flight
/// publish always completes.
async fn run_schedule(
    period: Duration,
    cache: Arc<InventoryCache>,
    publisher: Arc<dyn InventoryPublisher>,
    stats: Arc<PublishStats>,
    mut stop_rx: watch::Receiver<bool>,
    trigger: Arc<Notify>,
) {
    let now = Instant::now();
    let start = now.checked_add(period).unwrap_or(now);
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {}
            () = trigger.notified() => {}
        }

        if *stop_rx.borrow() {
            break;
        }

        match publish_once(&cache, publisher.as_ref()).await {
            Ok(len) => {
                stats.record_success();
                debug!(entries = len, "inventory published");
            }
            Err(e) => {
                stats.record_failure(&e);
                warn!(error = %e, "unable to publish inventory data");
            }
        }
    }

    debug!("inventory schedule loop stopped");
}

/// Snapshot the cache, release its lock, then publish
async fn publish_once(
    cache: &InventoryCache,
    publisher: &dyn InventoryPublisher,
) -> InventoryResult<usize> {
    let snapshot = cache.snapshot().await?;
    publisher.publish_inventory(&snapshot).await?;
    Ok(snapshot.len())
}
