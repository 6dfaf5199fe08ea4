//! Integration tests for the offline queue facade
//!
//! Covers enqueue safeguards, drain sweeps, timer-driven retries with
//! backoff, dead-lettering and the store-unavailable fail-fast path. Timer
//! tests run on paused Tokio time so backoff waits complete instantly.

mod support;

use std::sync::Arc;
use std::time::Duration;

use courier_common::testing::MockClock;
use courier_common::time::Clock;
use courier_core::{NetworkMonitor, OfflineQueue, QueueStore};
use courier_domain::{
    ConnectivityStatus, DeliveryFailure, DrainReport, ItemStatus, NewMessage, QueueConfig,
    QueueError, QueueItem, QueueStats, Result,
};
use support::senders::{Script, ScriptedSender};
use support::store::MemoryStore;

fn message(id: &str) -> NewMessage {
    NewMessage::new("conv-1", format!("body of {id}")).with_id(id)
}

struct Harness {
    queue: OfflineQueue,
    store: Arc<MemoryStore>,
    monitor: Arc<NetworkMonitor>,
}

fn harness(online: bool, config: QueueConfig) -> Harness {
    harness_with_clock(online, config, None)
}

fn harness_with_clock(online: bool, config: QueueConfig, clock: Option<Arc<dyn Clock>>) -> Harness {
    let store = Arc::new(MemoryStore::new(config.max_capacity));
    let monitor = Arc::new(NetworkMonitor::new(online));
    let mut builder = OfflineQueue::builder(Arc::clone(&store) as Arc<dyn QueueStore>)
        .monitor(Arc::clone(&monitor))
        .config(config);
    if let Some(clock) = clock {
        builder = builder.clock(clock);
    }
    let queue = builder.build().expect("valid queue config");
    Harness { queue, store, monitor }
}

async fn enqueue_all(queue: &OfflineQueue, ids: &[&str]) -> Result<()> {
    for id in ids {
        queue.enqueue(message(id)).await?;
    }
    Ok(())
}

fn ids(items: &[QueueItem]) -> Vec<&str> {
    items.iter().map(|item| item.id.as_str()).collect()
}

/// Messages queued while offline are all pending.
#[tokio::test]
async fn test_offline_enqueue_counts_pending() -> Result<()> {
    let h = harness(false, QueueConfig::default());
    enqueue_all(&h.queue, &["m1", "m2", "m3"]).await?;

    let stats = h.queue.get_stats().await?;
    assert_eq!(stats.total, 3);
    assert_eq!(stats.pending, 3);
    assert_eq!(stats.retrying, 0);
    assert_eq!(stats.failed, 0);
    assert!(stats.oldest_timestamp.is_some());
    Ok(())
}

/// An empty queue reports zeros and no oldest timestamp.
#[tokio::test]
async fn test_empty_queue_stats() -> Result<()> {
    let h = harness(false, QueueConfig::default());
    assert_eq!(h.queue.get_stats().await?, QueueStats::default());
    Ok(())
}

/// Going online triggers an automatic drain with the registered sender.
#[tokio::test(start_paused = true)]
async fn test_online_transition_drains_automatically() -> Result<()> {
    let h = harness(false, QueueConfig::default());
    enqueue_all(&h.queue, &["m1", "m2", "m3"]).await?;

    let sender = Arc::new(ScriptedSender::new());
    h.queue.start(Arc::clone(&sender).into_dyn()).await?;
    assert_eq!(sender.attempt_count(), 0);

    h.monitor.report_online();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let order: Vec<String> = sender.attempts().into_iter().map(|(id, _)| id).collect();
    assert_eq!(order, vec!["m1", "m2", "m3"]);
    assert_eq!(h.queue.get_stats().await?.total, 0);

    h.queue.shutdown().await;
    Ok(())
}

/// A manual drain with an always-succeeding sender empties the queue.
#[tokio::test]
async fn test_manual_drain_reports_sent() -> Result<()> {
    let h = harness(true, QueueConfig::default());
    enqueue_all(&h.queue, &["m1", "m2", "m3"]).await?;

    let sender = Arc::new(ScriptedSender::new());
    let report = h.queue.drain_queue(sender.into_dyn()).await?;

    assert_eq!(report, DrainReport { sent: 3, failed: 0, retried: 0, errors: vec![] });
    assert_eq!(h.queue.get_stats().await?.total, 0);
    Ok(())
}

/// A message failing twice is retried on its backoff schedule and then
/// delivered.
#[tokio::test(start_paused = true)]
async fn test_retry_with_backoff_until_delivered() -> Result<()> {
    let h = harness(true, QueueConfig::default());
    enqueue_all(&h.queue, &["m1", "m2", "m3"]).await?;

    let sender = Arc::new(ScriptedSender::new().script(
        "m2",
        vec![Script::FailTransient, Script::FailTransient, Script::Succeed],
    ));
    let report = h.queue.drain_queue(Arc::clone(&sender).into_dyn()).await?;

    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].id, "m2");

    let queued = h.queue.get_queue(None).await?;
    assert_eq!(ids(&queued), vec!["m2"]);
    assert_eq!(queued[0].retry_count, 1);
    assert_eq!(queued[0].status, ItemStatus::Retrying);
    assert!(queued[0].last_error.is_some());
    assert_eq!(h.queue.pending_retries(), 1);

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let queued = h.queue.get_queue(None).await?;
    assert_eq!(queued[0].retry_count, 2);
    assert_eq!(queued[0].status, ItemStatus::Retrying);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(h.queue.get_queue(None).await?.is_empty());

    let attempts = sender.attempts_for("m2");
    assert_eq!(attempts.len(), 3);
    assert!(attempts[2].duration_since(attempts[0]) >= Duration::from_secs(3));

    h.queue.shutdown().await;
    Ok(())
}

/// A queue started again after `shutdown` still serves retry timers.
#[tokio::test(start_paused = true)]
async fn test_restart_after_shutdown_serves_retries() -> Result<()> {
    let h = harness(false, QueueConfig::default());
    let sender = Arc::new(
        ScriptedSender::new().script("m1", vec![Script::FailTransient, Script::Succeed]),
    );

    h.queue.start(Arc::clone(&sender).into_dyn()).await?;
    h.queue.shutdown().await;
    h.queue.start(Arc::clone(&sender).into_dyn()).await?;

    h.queue.enqueue(message("m1")).await?;
    assert!(h.monitor.report_online());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(h.queue.get_queue(None).await?.is_empty());
    assert_eq!(sender.attempts_for("m1").len(), 2);
    assert_eq!(h.queue.pending_retries(), 0);

    h.queue.shutdown().await;
    Ok(())
}

/// New enqueues sort behind persisted items even when the first read of the
/// store fails.
#[tokio::test]
async fn test_timestamps_follow_persisted_items_after_read_failure() -> Result<()> {
    let clock = Arc::new(MockClock::at_millis(1_000));
    let h = harness_with_clock(false, QueueConfig::default(), Some(clock as Arc<dyn Clock>));
    h.store
        .seed(QueueItem::from_message(message("persisted"), "persisted".into(), 5_000))
        .await;
    h.store.fail_next_reads(1);

    assert!(matches!(h.queue.enqueue(message("m1")).await, Err(QueueError::Storage(_))));

    let fresh = h.queue.enqueue(message("m1")).await?;
    assert!(fresh.timestamp > 5_000);
    assert_eq!(ids(&h.queue.get_queue(None).await?), vec!["persisted", "m1"]);
    Ok(())
}

/// Successive waits for an always-failing message follow the backoff table.
#[tokio::test(start_paused = true)]
async fn test_backoff_delays_follow_table() -> Result<()> {
    let h = harness(true, QueueConfig { max_attempts: 0, ..QueueConfig::default() });
    h.queue.enqueue(message("stubborn")).await?;

    let sender = Arc::new(ScriptedSender::new().always_failing("stubborn"));
    h.queue.drain_queue(Arc::clone(&sender).into_dyn()).await?;
    tokio::time::sleep(Duration::from_secs(80)).await;

    let attempts = sender.attempts_for("stubborn");
    assert!(attempts.len() >= 7, "expected at least 7 attempts, got {}", attempts.len());

    let gaps: Vec<u64> =
        attempts.windows(2).take(6).map(|pair| pair[1].duration_since(pair[0]).as_secs()).collect();
    assert_eq!(gaps, vec![1, 2, 5, 10, 30, 30]);

    h.queue.shutdown().await;
    Ok(())
}

/// Duplicate ids are rejected and the original item is kept.
#[tokio::test]
async fn test_duplicate_id_rejected() -> Result<()> {
    let h = harness(false, QueueConfig::default());
    h.queue.enqueue(message("dup")).await?;

    match h.queue.enqueue(message("dup")).await {
        Err(QueueError::DuplicateId(id)) => assert_eq!(id, "dup"),
        other => panic!("expected duplicate error, got {other:?}"),
    }

    assert_eq!(h.queue.get_queue(None).await?.len(), 1);
    Ok(())
}

/// The queue accepts exactly its capacity.
#[tokio::test]
async fn test_capacity_boundary() -> Result<()> {
    let h = harness(false, QueueConfig::default());
    for i in 0..1000 {
        h.queue.enqueue(message(&format!("m{i}"))).await?;
    }

    match h.queue.enqueue(message("overflow")).await {
        Err(QueueError::CapacityExceeded(limit)) => assert_eq!(limit, 1000),
        other => panic!("expected capacity error, got {other:?}"),
    }
    assert_eq!(h.queue.get_stats().await?.total, 1000);
    Ok(())
}

/// Enqueue order is preserved even when the clock does not move.
#[tokio::test]
async fn test_fifo_order_with_frozen_clock() -> Result<()> {
    let clock = MockClock::at_millis(1_700_000_000_000);
    let h = harness_with_clock(false, QueueConfig::default(), Some(Arc::new(clock)));
    enqueue_all(&h.queue, &["m3", "m1", "m2"]).await?;

    let queued = h.queue.get_queue(None).await?;
    assert_eq!(ids(&queued), vec!["m3", "m1", "m2"]);
    assert!(queued.windows(2).all(|pair| pair[0].timestamp < pair[1].timestamp));
    Ok(())
}

/// Generated ids are unique when the caller supplies none.
#[tokio::test]
async fn test_generated_ids() -> Result<()> {
    let h = harness(false, QueueConfig::default());
    let first = h.queue.enqueue(NewMessage::new("conv-1", "a")).await?;
    let second = h.queue.enqueue(NewMessage::new("conv-1", "b")).await?;

    assert!(!first.id.is_empty());
    assert_ne!(first.id, second.id);
    Ok(())
}

/// A second drain while the first is running does nothing.
#[tokio::test(start_paused = true)]
async fn test_concurrent_drain_is_noop() -> Result<()> {
    let h = harness(true, QueueConfig::default());
    enqueue_all(&h.queue, &["m1", "m2", "m3"]).await?;

    let sender = Arc::new(ScriptedSender::with_delay(Duration::from_secs(1)));
    let first = {
        let queue = h.queue.clone();
        let sender = Arc::clone(&sender).into_dyn();
        tokio::spawn(async move { queue.drain_queue(sender).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let second = h.queue.drain_queue(Arc::clone(&sender).into_dyn()).await?;
    assert_eq!(second, DrainReport::default());

    let first = first.await.expect("drain task panicked")?;
    assert_eq!(first.sent, 3);
    assert_eq!(sender.attempt_count(), 3);
    Ok(())
}

/// Draining while offline never calls the sender.
#[tokio::test]
async fn test_offline_drain_is_noop() -> Result<()> {
    let h = harness(false, QueueConfig::default());
    enqueue_all(&h.queue, &["m1", "m2"]).await?;

    let sender = Arc::new(ScriptedSender::new());
    let report = h.queue.drain_queue(Arc::clone(&sender).into_dyn()).await?;

    assert!(report.is_empty());
    assert_eq!(sender.attempt_count(), 0);
    assert_eq!(h.queue.get_stats().await?.total, 2);
    Ok(())
}

/// Items still inside their backoff window are rescheduled, not sent.
#[tokio::test(start_paused = true)]
async fn test_not_yet_due_items_are_rescheduled() -> Result<()> {
    let clock = MockClock::at_millis(1_700_000_000_000);
    let h = harness_with_clock(true, QueueConfig::default(), Some(Arc::new(clock.clone())));

    let mut item = QueueItem::from_message(message("waiting"), "waiting".into(), 1_000);
    item.retry_count = 2;
    item.status = ItemStatus::Retrying;
    item.last_retry_at = Some(clock.millis_since_epoch() - 500);
    h.store.seed(item).await;

    let sender = Arc::new(ScriptedSender::new());
    let report = h.queue.drain_queue(Arc::clone(&sender).into_dyn()).await?;

    assert_eq!(report, DrainReport { sent: 0, failed: 0, retried: 1, errors: vec![] });
    assert_eq!(sender.attempt_count(), 0);
    assert_eq!(h.queue.pending_retries(), 1);

    tokio::time::sleep(Duration::from_millis(1_600)).await;
    assert_eq!(sender.attempt_count(), 1);
    assert!(h.queue.get_queue(None).await?.is_empty());

    h.queue.shutdown().await;
    Ok(())
}

/// An overdue item is attempted right away by the sweep.
#[tokio::test]
async fn test_overdue_item_is_attempted() -> Result<()> {
    let clock = MockClock::at_millis(1_700_000_000_000);
    let h = harness_with_clock(true, QueueConfig::default(), Some(Arc::new(clock.clone())));

    let mut item = QueueItem::from_message(message("overdue"), "overdue".into(), 1_000);
    item.retry_count = 1;
    item.status = ItemStatus::Retrying;
    item.last_retry_at = Some(clock.millis_since_epoch() - 5_000);
    h.store.seed(item).await;

    let report = h.queue.drain_queue(Arc::new(ScriptedSender::new()).into_dyn()).await?;
    assert_eq!(report.sent, 1);
    Ok(())
}

/// Transient failures dead-letter once the attempt budget is spent.
#[tokio::test(start_paused = true)]
async fn test_dead_letter_after_max_attempts() -> Result<()> {
    let h = harness(true, QueueConfig { max_attempts: 3, ..QueueConfig::default() });
    h.queue.enqueue(message("doomed")).await?;

    let sender = Arc::new(ScriptedSender::new().always_failing("doomed"));
    h.queue.drain_queue(Arc::clone(&sender).into_dyn()).await?;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(sender.attempts_for("doomed").len(), 3);
    let queued = h.queue.get_queue(None).await?;
    assert_eq!(queued[0].status, ItemStatus::Failed);
    assert_eq!(queued[0].retry_count, 3);
    assert_eq!(h.queue.pending_retries(), 0);

    let stats = h.queue.get_stats().await?;
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.retrying, 0);

    let report = h.queue.drain_queue(Arc::clone(&sender).into_dyn()).await?;
    assert!(report.is_empty());
    assert_eq!(sender.attempts_for("doomed").len(), 3);

    h.queue.shutdown().await;
    Ok(())
}

/// A permanent rejection dead-letters immediately and can be requeued.
#[tokio::test(start_paused = true)]
async fn test_permanent_failure_and_requeue() -> Result<()> {
    let h = harness(true, QueueConfig::default());
    h.queue.enqueue(message("bad")).await?;

    let sender = Arc::new(
        ScriptedSender::new().script("bad", vec![Script::FailPermanent, Script::Succeed]),
    );
    let report = h.queue.drain_queue(Arc::clone(&sender).into_dyn()).await?;

    assert_eq!(report.failed, 1);
    assert_eq!(
        report.errors,
        vec![DeliveryFailure { id: "bad".into(), error: "400 invalid payload".into() }]
    );
    assert_eq!(h.queue.pending_retries(), 0);
    assert_eq!(h.queue.get_stats().await?.failed, 1);

    match h.queue.requeue_failed("missing").await {
        Err(QueueError::NotFound(id)) => assert_eq!(id, "missing"),
        other => panic!("expected not found, got {other:?}"),
    }

    let requeued = h.queue.requeue_failed("bad").await?;
    assert_eq!(requeued.status, ItemStatus::Pending);
    assert_eq!(requeued.retry_count, 0);
    assert_eq!(requeued.last_error, None);
    assert!(matches!(h.queue.requeue_failed("bad").await, Err(QueueError::InvalidState(_))));

    let report = h.queue.drain_queue(sender.into_dyn()).await?;
    assert_eq!(report.sent, 1);
    Ok(())
}

/// Clearing the queue disarms outstanding retry timers.
#[tokio::test(start_paused = true)]
async fn test_clear_cancels_timers() -> Result<()> {
    let h = harness(true, QueueConfig::default());
    enqueue_all(&h.queue, &["a", "b"]).await?;

    let sender = Arc::new(ScriptedSender::new().always_failing("a").always_failing("b"));
    h.queue.drain_queue(Arc::clone(&sender).into_dyn()).await?;
    assert_eq!(h.queue.pending_retries(), 2);

    h.queue.clear_queue().await?;
    assert_eq!(h.queue.pending_retries(), 0);
    assert!(h.queue.get_queue(None).await?.is_empty());
    assert_eq!(h.queue.get_stats().await?.total, 0);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(sender.attempt_count(), 2);

    h.queue.clear_queue().await?;
    h.queue.shutdown().await;
    Ok(())
}

/// Removing an item disarms its timer; removing twice is fine.
#[tokio::test(start_paused = true)]
async fn test_remove_cancels_timer() -> Result<()> {
    let h = harness(true, QueueConfig::default());
    enqueue_all(&h.queue, &["keep", "drop"]).await?;

    let sender = Arc::new(ScriptedSender::new().always_failing("drop").always_failing("keep"));
    h.queue.drain_queue(Arc::clone(&sender).into_dyn()).await?;

    h.queue.remove_from_queue("drop").await?;
    h.queue.remove_from_queue("drop").await?;
    assert_eq!(h.queue.pending_retries(), 1);

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(sender.attempts_for("drop").len(), 1);
    assert_eq!(sender.attempts_for("keep").len(), 2);

    h.queue.shutdown().await;
    Ok(())
}

/// A timer that fires while offline leaves the item for the next online
/// drain.
#[tokio::test(start_paused = true)]
async fn test_retry_waits_for_reconnect() -> Result<()> {
    let clock = MockClock::at_millis(1_700_000_000_000);
    let h = harness_with_clock(true, QueueConfig::default(), Some(Arc::new(clock.clone())));
    h.queue.enqueue(message("m1")).await?;

    let sender = Arc::new(ScriptedSender::new().script(
        "m1",
        vec![Script::FailTransient, Script::Succeed],
    ));
    h.queue.start(Arc::clone(&sender).into_dyn()).await?;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(sender.attempt_count(), 1);

    h.monitor.report_offline();
    tokio::time::sleep(Duration::from_secs(5)).await;
    clock.advance(Duration::from_secs(5));
    assert_eq!(sender.attempt_count(), 1);
    assert_eq!(h.queue.pending_retries(), 0);

    h.monitor.report_online();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(sender.attempt_count(), 2);
    assert!(h.queue.get_queue(None).await?.is_empty());

    h.queue.shutdown().await;
    Ok(())
}

/// `get_queue` can be limited to one conversation.
#[tokio::test]
async fn test_get_queue_by_conversation() -> Result<()> {
    let h = harness(false, QueueConfig::default());
    h.queue.enqueue(NewMessage::new("alpha", "one").with_id("a1")).await?;
    h.queue.enqueue(NewMessage::new("beta", "two").with_id("b1")).await?;
    h.queue.enqueue(NewMessage::new("alpha", "three").with_id("a2")).await?;

    let alpha = h.queue.get_queue(Some("alpha")).await?;
    assert_eq!(ids(&alpha), vec!["a1", "a2"]);
    assert!(h.queue.get_queue(Some("gamma")).await?.is_empty());
    Ok(())
}

/// Listeners see transitions even when another listener panics.
#[tokio::test]
async fn test_listeners_are_isolated() {
    let h = harness(false, QueueConfig::default());
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let _boom = h.queue.add_listener(|_| panic!("listener bug"));
    let sink = Arc::clone(&seen);
    let subscription = h.queue.add_listener(move |status| sink.lock().push(status));

    h.monitor.report_online();
    h.monitor.report_offline();
    subscription.unsubscribe();
    h.monitor.report_online();

    assert_eq!(*seen.lock(), vec![ConnectivityStatus::Online, ConnectivityStatus::Offline]);
}

/// Every operation fails fast once store initialization has failed.
#[tokio::test]
async fn test_store_unavailable_fails_fast() {
    let store: Arc<dyn QueueStore> = Arc::new(MemoryStore::broken());
    let queue = OfflineQueue::builder(store).build().expect("valid queue config");

    for _ in 0..2 {
        assert!(matches!(
            queue.enqueue(message("m1")).await,
            Err(QueueError::StoreUnavailable(_))
        ));
    }
    assert!(matches!(queue.get_stats().await, Err(QueueError::StoreUnavailable(_))));
    assert!(matches!(queue.get_queue(None).await, Err(QueueError::StoreUnavailable(_))));
    assert!(matches!(queue.clear_queue().await, Err(QueueError::StoreUnavailable(_))));
    assert!(matches!(
        queue.drain_queue(Arc::new(ScriptedSender::new()).into_dyn()).await,
        Err(QueueError::StoreUnavailable(_))
    ));
}

/// Invalid configuration is rejected at build time.
#[test]
fn test_builder_rejects_invalid_config() {
    let store: Arc<dyn QueueStore> = Arc::new(MemoryStore::new(10));
    let result = OfflineQueue::builder(store)
        .config(QueueConfig { backoff_ms: vec![], ..QueueConfig::default() })
        .build();
    assert!(matches!(result, Err(QueueError::Config(_))));
}
