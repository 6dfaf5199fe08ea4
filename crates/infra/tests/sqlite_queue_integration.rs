//! Integration tests for the offline queue on the SQLite store
//!
//! **Coverage:**
//! - Items and FIFO order survive a restart
//! - Capacity holds under concurrent enqueues
//! - Dead-letter bookkeeping is persisted
//! - A drain delivers through the HTTP sender and deletes rows
//!
//! **Infrastructure:**
//! - Real SQLite database (tempdir)
//! - WireMock HTTP server standing in for the messaging backend

#[path = "support.rs"]
mod support;

use std::sync::Arc;
use std::time::Duration;

use courier_core::{OfflineQueue, QueueStore};
use courier_domain::{ItemStatus, QueueConfig, QueueError};
use courier_infra::{HttpMessageSender, SqliteQueueStore};
use support::{message, TestDatabase};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test(flavor = "multi_thread")]
async fn queued_items_survive_restart() {
    let db = TestDatabase::new();

    let first_timestamps = {
        let (queue, _monitor) = db.queue(false);
        for id in ["m1", "m2", "m3"] {
            queue.enqueue(message(id)).await.expect("enqueue");
        }
        let items = queue.get_queue(None).await.expect("queue");
        items.into_iter().map(|item| item.timestamp).collect::<Vec<_>>()
    };

    let (queue, _monitor) = db.queue(false);
    let items = queue.get_queue(None).await.expect("queue after restart");
    let ids: Vec<&str> = items.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2", "m3"]);

    let newest = *first_timestamps.iter().max().expect("timestamps");
    let later = queue.enqueue(message("m4")).await.expect("enqueue after restart");
    assert!(later.timestamp > newest, "timestamps keep increasing across restarts");
}

#[tokio::test(flavor = "multi_thread")]
async fn capacity_holds_under_concurrent_enqueue() {
    let db = TestDatabase::new();
    let store = db.store(10);
    let queue = OfflineQueue::builder(Arc::clone(&store) as Arc<dyn QueueStore>)
        .config(QueueConfig { max_capacity: 10, ..QueueConfig::default() })
        .build()
        .expect("queue builds");

    let mut handles = Vec::new();
    for i in 0..25 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move { queue.enqueue(message(&format!("m{i}"))).await }));
    }

    let mut accepted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.expect("task joins") {
            Ok(_) => accepted += 1,
            Err(QueueError::CapacityExceeded(10)) => rejected += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(accepted, 10);
    assert_eq!(rejected, 15);
    assert_eq!(store.count().await.expect("count"), 10);
}

#[tokio::test(flavor = "multi_thread")]
async fn drain_delivers_over_http_and_dead_letters_rejections() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(body_partial_json(serde_json::json!({ "id": "bad" })))
        .respond_with(ResponseTemplate::new(422))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let db = TestDatabase::new();
    let (queue, _monitor) = db.queue(true);
    for id in ["m1", "bad", "m2"] {
        queue.enqueue(message(id)).await.expect("enqueue");
    }

    let sender = HttpMessageSender::new(format!("{}/messages", server.uri()), Duration::from_secs(2))
        .expect("sender builds");
    let report = queue.drain_queue(Arc::new(sender)).await.expect("drain");

    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors[0].id, "bad");
    assert!(report.errors[0].error.contains("422"));

    // A fresh handle reads the persisted dead-letter state.
    let (reopened, _monitor) = db.queue(false);
    let items = reopened.get_queue(None).await.expect("queue");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, ItemStatus::Failed);
    assert_eq!(items[0].retry_count, 1);

    let stats = reopened.get_stats().await.expect("stats");
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.total, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn unusable_database_makes_queue_unavailable() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let store = Arc::new(SqliteQueueStore::open(dir.path(), 1, 10));
    let queue = OfflineQueue::builder(store).build().expect("queue builds");

    assert!(matches!(queue.enqueue(message("m1")).await, Err(QueueError::StoreUnavailable(_))));
    assert!(matches!(queue.get_stats().await, Err(QueueError::StoreUnavailable(_))));
}
