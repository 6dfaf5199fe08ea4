//! Volatile queue store for tests and hosts without a writable disk.

use std::collections::HashMap;

use async_trait::async_trait;
use courier_core::QueueStore;
use courier_domain::{ItemPatch, QueueError, QueueItem, Result};
use tokio::sync::RwLock;

/// Queue store kept in a `HashMap` behind a single write lock.
///
/// Contents are lost when the process exits.
#[derive(Debug)]
pub struct InMemoryQueueStore {
    items: RwLock<HashMap<String, QueueItem>>,
    capacity: usize,
}

impl InMemoryQueueStore {
    pub fn new(capacity: usize) -> Self {
        Self { items: RwLock::new(HashMap::new()), capacity }
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn add(&self, item: QueueItem) -> Result<QueueItem> {
        let mut items = self.items.write().await;
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
        Ok(self.items.read().await.values().cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<QueueItem>> {
        Ok(self.items.read().await.get(id).cloned())
    }

    async fn update(&self, id: &str, patch: &ItemPatch) -> Result<QueueItem> {
        let mut items = self.items.write().await;
        let item = items.get_mut(id).ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        item.apply(patch);
        Ok(item.clone())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.items.write().await.remove(id);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.items.write().await.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.items.read().await.len())
    }
}
