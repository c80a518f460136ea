use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use otastate_inventory::*;

// Mock implementations
#[derive(Default)]
struct MockPublisher {
    calls: Mutex<Vec<InventoryList>>,
}

impl MockPublisher {
    fn calls(&self) -> Vec<InventoryList> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InventoryPublisher for MockPublisher {
    async fn publish_inventory(&self, list: &InventoryList) -> InventoryResult<()> {
        self.calls.lock().unwrap().push(list.clone());
        Ok(())
    }
}

/// Fails the first `failures` publishes, then succeeds
struct FlakyPublisher {
    failures: usize,
    attempts: AtomicUsize,
}

#[async_trait]
impl InventoryPublisher for FlakyPublisher {
    async fn publish_inventory(&self, _list: &InventoryList) -> InventoryResult<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(InventoryError::PublishFailure(
                "server unreachable".to_string(),
            ));
        }
        Ok(())
    }
}

/// Blocks inside the publish call until released
#[derive(Default)]
struct BlockingPublisher {
    entered: Notify,
    release: Notify,
    completed: AtomicUsize,
}

#[async_trait]
impl InventoryPublisher for BlockingPublisher {
    async fn publish_inventory(&self, _list: &InventoryList) -> InventoryResult<()> {
        self.entered.notify_one();
        self.release.notified().await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn entries(pairs: &[(&str, &str)]) -> Vec<InventoryEntry> {
    pairs
        .iter()
        .map(|(n, v)| InventoryEntry::new(*n, *v))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_default_interval_publishes_last_list_once() {
    let mock = Arc::new(MockPublisher::default());
    let config = InventoryConfig::new("release-2024.1", "rpi4").with_poll_interval(0);
    let inventory = Inventory::init(config, mock.clone());

    assert_eq!(
        inventory.config().effective_poll_interval(),
        Duration::from_secs(28_800)
    );

    inventory
        .set(Some(&entries(&[("os", "linux")])))
        .await
        .unwrap();
    let last = entries(&[("os", "linux"), ("kernel", "6.1.21"), ("rootfs", "a")]);
    inventory.set(Some(&last)).await.unwrap();

    inventory.activate().unwrap();
    tokio::time::sleep(Duration::from_secs(28_801)).await;

    let calls = mock.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].as_slice(), last.as_slice());

    inventory.exit().await;
}

#[tokio::test(start_paused = true)]
async fn test_publish_failure_does_not_stop_schedule() {
    let flaky = Arc::new(FlakyPublisher {
        failures: 2,
        attempts: AtomicUsize::new(0),
    });
    let config = InventoryConfig::new("release-1", "rpi4").with_poll_interval(30);
    let inventory = Inventory::init(config, flaky.clone());

    inventory.activate().unwrap();
    tokio::time::sleep(Duration::from_secs(95)).await;

    let status = inventory.status();
    assert!(status.active);
    assert_eq!(status.failed, 2);
    assert_eq!(status.published, 1);
    assert!(status.last_published_at.is_some());
    assert_eq!(
        status.last_error.as_deref(),
        Some("publish failed: server unreachable")
    );

    inventory.exit().await;
    assert!(!inventory.status().active);
}

#[tokio::test]
async fn test_set_is_not_blocked_by_slow_publish() {
    let blocking = Arc::new(BlockingPublisher::default());
    let config = InventoryConfig::new("release-1", "rpi4")
        .with_lock_timeout(Duration::from_millis(100));
    let inventory = Arc::new(Inventory::init(config, blocking.clone()));

    inventory.activate().unwrap();
    inventory.execute().unwrap();
    blocking.entered.notified().await;

    // Publish is in flight; the cache lock must be free
    inventory
        .set(Some(&entries(&[("state", "updating")])))
        .await
        .unwrap();
    assert_eq!(inventory.snapshot().await.unwrap().get("state"), Some("updating"));

    blocking.release.notify_one();
    inventory.exit().await;
    assert_eq!(blocking.completed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_exit_waits_for_in_flight_publish() {
    let blocking = Arc::new(BlockingPublisher::default());
    let inventory = Arc::new(Inventory::init(
        InventoryConfig::new("release-1", "rpi4"),
        blocking.clone(),
    ));

    inventory.activate().unwrap();
    inventory.execute().unwrap();
    blocking.entered.notified().await;

    let exiting = {
        let inventory = Arc::clone(&inventory);
        tokio::spawn(async move { inventory.exit().await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!exiting.is_finished());
    assert_eq!(blocking.completed.load(Ordering::SeqCst), 0);

    blocking.release.notify_one();
    exiting.await.unwrap();
    assert_eq!(blocking.completed.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_set_and_read_never_tear() {
    let cache = Arc::new(InventoryCache::default());

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                for i in 0..200 {
                    let generation = format!("{w}-{i}");
                    let list: Vec<InventoryEntry> = (0..8)
                        .map(|k| InventoryEntry::new(format!("attr{k}"), generation.clone()))
                        .collect();
                    cache.set(Some(&list)).await.unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                for _ in 0..200 {
                    let snapshot = cache.snapshot().await.unwrap();
                    if snapshot.is_empty() {
                        continue;
                    }
                    assert_eq!(snapshot.len(), 8);
                    let generation = &snapshot[0].value;
                    assert!(snapshot.iter().all(|e| &e.value == generation));
                }
            })
        })
        .collect();

    for task in writers.into_iter().chain(readers) {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn test_exit_twice_releases_everything() {
    let mock = Arc::new(MockPublisher::default());
    let inventory = Inventory::init(InventoryConfig::new("release-1", "rpi4"), mock.clone());
    inventory.activate().unwrap();

    inventory.exit().await;
    inventory.exit().await;

    assert!(matches!(
        inventory.snapshot().await,
        Err(InventoryError::Released)
    ));
    assert!(matches!(inventory.activate(), Err(InventoryError::Released)));
    assert!(mock.calls().is_empty());
    // The schedule task no longer holds the publisher
    assert_eq!(Arc::strong_count(&mock), 2);
}

#[tokio::test]
async fn test_set_none_then_read_is_empty() {
    let inventory = Inventory::init(
        InventoryConfig::new("release-1", "rpi4"),
        Arc::new(MockPublisher::default()),
    );
    inventory
        .set(Some(&entries(&[("a", "1")])))
        .await
        .unwrap();

    inventory.set(None).await.unwrap();

    assert!(inventory.snapshot().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_memory_limit_from_config() {
    let config = InventoryConfig::new("release-1", "rpi4").with_memory_limit(8);
    let inventory = Inventory::init(config, Arc::new(MockPublisher::default()));
    inventory.set(Some(&entries(&[("ok", "1")]))).await.unwrap();

    let err = inventory
        .set(Some(&entries(&[("too-long-name", "value")])))
        .await
        .unwrap_err();

    assert!(matches!(err, InventoryError::AllocationFailure { index: 0, .. }));
    assert_eq!(inventory.snapshot().await.unwrap().get("ok"), Some("1"));
}
