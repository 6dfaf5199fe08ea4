//! In-memory `QueueStore` with failure injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use courier_core::QueueStore;
use courier_domain::{ItemPatch, QueueError, QueueItem, Result};
use tokio::sync::Mutex;

/// Store backed by a `HashMap`, enforcing capacity and unique ids.
pub struct MemoryStore {
    items: Mutex<HashMap<String, QueueItem>>,
    capacity: usize,
    fail_init: AtomicBool,
    failing_reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            capacity,
            fail_init: AtomicBool::new(false),
            failing_reads: AtomicUsize::new(0),
        }
    }

    /// A store whose `initialize` always fails.
    pub fn broken() -> Self {
        let store = Self::new(1000);
        store.fail_init.store(true, Ordering::SeqCst);
        store
    }

    /// Make the next `count` calls to `get_all` fail.
    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Insert an item directly, bypassing capacity checks.
    pub async fn seed(&self, item: QueueItem) {
        self.items.lock().await.insert(item.id.clone(), item);
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn initialize(&self) -> Result<()> {
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(QueueError::Storage("database is locked".into()));
        }
        Ok(())
    }

    async fn add(&self, item: QueueItem) -> Result<QueueItem> {
        let mut items = self.items.lock().await;
        if items.len() >= self.capacity {
            return Err(QueueError::CapacityExceeded(self.capacity));
        }
        if items.contains_key(&item.id) {
            return Err(QueueError::DuplicateId(item.id));
        }
        items.insert(item.id.clone(), item.clone());
        Ok(item)
    }

    async fn get_all(&self) -> Result<Vec<QueueItem>> {
        let failing = self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(QueueError::Storage("disk I/O error".into()));
        }
        Ok(self.items.lock().await.values().cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<QueueItem>> {
        Ok(self.items.lock().await.get(id).cloned())
    }

    async fn update(&self, id: &str, patch: &ItemPatch) -> Result<QueueItem> {
        let mut items = self.items.lock().await;
        let item = items.get_mut(id).ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        item.apply(patch);
        Ok(item.clone())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.items.lock().await.remove(id);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.items.lock().await.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.items.lock().await.len())
    }
}
