//! Port interfaces for queue persistence and delivery

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use courier_domain::{DeliveryError, ItemPatch, ItemStatus, QueueItem, Result};

/// Durable storage for queue items, keyed by item id.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Prepare the backing storage. A failure here makes the queue unusable.
    async fn initialize(&self) -> Result<()>;

    /// Persist a new item.
    ///
    /// Fails with `CapacityExceeded` when the store is full and with
    /// `DuplicateId` when the id is already present.
    async fn add(&self, item: QueueItem) -> Result<QueueItem>;

    /// Every stored item, in no particular order.
    async fn get_all(&self) -> Result<Vec<QueueItem>>;

    /// Look up a single item.
    async fn get(&self, id: &str) -> Result<Option<QueueItem>>;

    /// Merge `patch` into the stored item and return the result.
    ///
    /// Fails with `NotFound` when the id is absent. Atomic with respect to
    /// concurrent `update`/`remove` calls for the same id.
    async fn update(&self, id: &str, patch: &ItemPatch) -> Result<QueueItem>;

    /// Delete an item. Removing a missing id is not an error.
    async fn remove(&self, id: &str) -> Result<()>;

    /// Delete every item.
    async fn clear(&self) -> Result<()>;

    /// Current number of stored items.
    async fn count(&self) -> Result<usize>;

    /// Items belonging to one conversation.
    async fn find_by_conversation(&self, conversation_id: &str) -> Result<Vec<QueueItem>> {
        let mut items = self.get_all().await?;
        items.retain(|item| item.conversation_id == conversation_id);
        Ok(items)
    }

    /// Items in the given delivery state.
    async fn find_by_status(&self, status: ItemStatus) -> Result<Vec<QueueItem>> {
        let mut items = self.get_all().await?;
        items.retain(|item| item.status == status);
        Ok(items)
    }

    /// Items that have failed at least `min_retry_count` times.
    async fn find_by_min_retry_count(&self, min_retry_count: u32) -> Result<Vec<QueueItem>> {
        let mut items = self.get_all().await?;
        items.retain(|item| item.retry_count >= min_retry_count);
        Ok(items)
    }

    /// The item with the smallest enqueue timestamp.
    async fn oldest(&self) -> Result<Option<QueueItem>> {
        let items = self.get_all().await?;
        Ok(items.into_iter().min_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id))))
    }
}

/// Performs the actual network delivery of one message.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Deliver `item`. Errors are classified as transient or permanent.
    async fn send(&self, item: &QueueItem) -> std::result::Result<(), DeliveryError>;
}

/// [`MessageSender`] backed by an async closure.
///
/// ```
/// use courier_core::send_fn;
/// use courier_domain::DeliveryError;
///
/// let sender = send_fn(|item| async move {
///     if item.content.is_empty() {
///         Err(DeliveryError::permanent("empty message"))
///     } else {
///         Ok(())
///     }
/// });
/// # let _ = sender;
/// ```
pub struct SendFn<F> {
    f: F,
}

/// Wrap an async closure as a [`MessageSender`].
pub fn send_fn<F, Fut>(f: F) -> SendFn<F>
where
    F: Fn(QueueItem) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), DeliveryError>> + Send,
{
    SendFn { f }
}

#[async_trait]
impl<F, Fut> MessageSender for SendFn<F>
where
    F: Fn(QueueItem) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), DeliveryError>> + Send,
{
    async fn send(&self, item: &QueueItem) -> std::result::Result<(), DeliveryError> {
        (self.f)(item.clone()).await
    }
}

impl<F> fmt::Debug for SendFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendFn").finish_non_exhaustive()
    }
}
