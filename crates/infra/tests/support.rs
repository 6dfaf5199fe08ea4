//! Shared helpers for infra integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use courier_core::{NetworkMonitor, OfflineQueue, QueueStore};
use courier_domain::{NewMessage, QueueConfig};
use courier_infra::SqliteQueueStore;
use tempfile::TempDir;

/// Temporary database directory that lives as long as the test.
pub struct TestDatabase {
    pub path: PathBuf,
    _temp_dir: TempDir,
}

impl TestDatabase {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let path = temp_dir.path().join("queue.db");
        Self { path, _temp_dir: temp_dir }
    }

    /// A fresh store handle on this database file.
    pub fn store(&self, capacity: usize) -> Arc<SqliteQueueStore> {
        Arc::new(SqliteQueueStore::open(&self.path, 4, capacity))
    }

    /// A queue over a fresh store handle on this database file.
    pub fn queue(&self, online: bool) -> (OfflineQueue, Arc<NetworkMonitor>) {
        let monitor = Arc::new(NetworkMonitor::new(online));
        let queue = OfflineQueue::builder(self.store(1000) as Arc<dyn QueueStore>)
            .monitor(Arc::clone(&monitor))
            .config(QueueConfig::default())
            .build()
            .expect("queue should build");
        (queue, monitor)
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

pub fn message(id: &str) -> NewMessage {
    NewMessage::new("conv-1", format!("body of {id}")).with_id(id)
}
