//! Public queue facade.
//!
//! [`OfflineQueue`] is built explicitly with its collaborators injected; there
//! is no global instance. The store is initialized on first use. If that
//! fails, every later call fails fast with `StoreUnavailable`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use courier_core::{send_fn, NetworkMonitor, OfflineQueue, QueueStore};
//! use courier_domain::NewMessage;
//!
//! # async fn example(store: Arc<dyn QueueStore>) -> courier_domain::Result<()> {
//! let monitor = Arc::new(NetworkMonitor::new(false));
//! let queue = OfflineQueue::builder(store).monitor(Arc::clone(&monitor)).build()?;
//!
//! queue.enqueue(NewMessage::new("conversation-1", "hello")).await?;
//!
//! let sender = Arc::new(send_fn(|_item| async { Ok(()) }));
//! queue.start(sender).await?;
//!
//! // Reconnecting triggers a drain with the registered sender.
//! monitor.report_online();
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use courier_common::time::{Clock, SystemClock};
use courier_domain::{
    ConnectivityStatus, DrainReport, ItemPatch, NewMessage, QueueConfig, QueueError, QueueItem,
    QueueStats, Result,
};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::backoff::BackoffPolicy;
use super::drain::DrainController;
use super::ports::{MessageSender, QueueStore};
use super::scheduler::{RetryHandler, RetryScheduler};
use crate::network::monitor::NetworkMonitor;
use crate::notify::Subscription;

/// Builder for [`OfflineQueue`].
pub struct OfflineQueueBuilder {
    store: Arc<dyn QueueStore>,
    clock: Arc<dyn Clock>,
    monitor: Option<Arc<NetworkMonitor>>,
    config: QueueConfig,
}

impl OfflineQueueBuilder {
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn monitor(mut self, monitor: Arc<NetworkMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    #[must_use]
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the configuration and assemble the queue.
    ///
    /// Defaults to the system clock and an offline, passive-only monitor.
    pub fn build(self) -> Result<OfflineQueue> {
        self.config.validate()?;
        let backoff = BackoffPolicy::from_config(&self.config)?;
        let monitor = self.monitor.unwrap_or_else(|| Arc::new(NetworkMonitor::new(false)));
        let scheduler = Arc::new(RetryScheduler::new());
        let drain = Arc::new(DrainController::new(
            Arc::clone(&self.store),
            Arc::clone(&monitor),
            Arc::clone(&scheduler),
            Arc::clone(&self.clock),
            backoff,
            self.config.max_attempts,
        ));
        let handler: Arc<dyn RetryHandler> = Arc::clone(&drain) as Arc<dyn RetryHandler>;
        let retry_handler = Arc::downgrade(&handler);

        Ok(OfflineQueue {
            inner: Arc::new(QueueInner {
                store: self.store,
                clock: self.clock,
                monitor,
                scheduler,
                drain,
                retry_handler,
                ready: OnceCell::new(),
                last_timestamp: AtomicU64::new(0),
                seeded: AtomicBool::new(false),
                auto_drain: Mutex::new(None),
            }),
        })
    }
}

struct QueueInner {
    store: Arc<dyn QueueStore>,
    clock: Arc<dyn Clock>,
    monitor: Arc<NetworkMonitor>,
    scheduler: Arc<RetryScheduler>,
    drain: Arc<DrainController>,
    retry_handler: Weak<dyn RetryHandler>,
    /// Outcome of store initialization; `Err` holds the failure reason.
    ready: OnceCell<std::result::Result<(), String>>,
    last_timestamp: AtomicU64,
    seeded: AtomicBool,
    auto_drain: Mutex<Option<Subscription>>,
}

/// Offline-resilient message queue.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct OfflineQueue {
    inner: Arc<QueueInner>,
}

impl OfflineQueue {
    pub fn builder(store: Arc<dyn QueueStore>) -> OfflineQueueBuilder {
        OfflineQueueBuilder {
            store,
            clock: Arc::new(SystemClock),
            monitor: None,
            config: QueueConfig::default(),
        }
    }

    /// Initialize the store once and make sure the retry scheduler is running.
    ///
    /// Restarts the scheduler loop if a `shutdown` stopped it.
    async fn ensure_ready(&self) -> Result<()> {
        let inner = &self.inner;
        let outcome = inner
            .ready
            .get_or_init(|| async {
                match inner.store.initialize().await {
                    Ok(()) => {
                        info!("offline queue ready");
                        Ok(())
                    }
                    Err(e) => {
                        error!(error = %e, "queue store failed to initialize");
                        Err(e.to_string())
                    }
                }
            })
            .await;

        outcome.clone().map_err(QueueError::StoreUnavailable)?;
        if !inner.seeded.load(Ordering::SeqCst) {
            self.seed_last_timestamp().await?;
        }
        inner.scheduler.start(inner.retry_handler.clone());
        Ok(())
    }

    /// Raise the timestamp floor above every persisted item so enqueues after
    /// a restart sort behind them. Retried on each call until a read succeeds.
    async fn seed_last_timestamp(&self) -> Result<()> {
        let items = self.inner.store.get_all().await.inspect_err(|e| {
            warn!(error = %e, "could not read persisted items to order new enqueues");
        })?;
        let newest = items.iter().map(|item| item.timestamp).max().unwrap_or(0);
        self.inner.last_timestamp.fetch_max(newest, Ordering::SeqCst);
        self.inner.seeded.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Enqueue time in epoch milliseconds, strictly greater than any issued
    /// before so FIFO order is total.
    fn next_timestamp(&self) -> u64 {
        let now = self.inner.clock.millis_since_epoch();
        let previous = self
            .inner
            .last_timestamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }

    /// Persist a message for later delivery.
    ///
    /// Fails with `DuplicateId` when the caller-supplied id is already queued
    /// and with `CapacityExceeded` when the queue is full.
    #[instrument(skip(self, message), fields(conversation_id = %message.conversation_id))]
    pub async fn enqueue(&self, message: NewMessage) -> Result<QueueItem> {
        self.ensure_ready().await?;

        let id = message
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let item = QueueItem::from_message(message, id, self.next_timestamp());

        match self.inner.store.add(item).await {
            Ok(stored) => {
                info!(item_id = %stored.id, timestamp = stored.timestamp, "message queued");
                Ok(stored)
            }
            Err(e) => {
                warn!(error = %e, "enqueue rejected");
                Err(e)
            }
        }
    }

    /// Queued items in enqueue order, optionally limited to one conversation.
    pub async fn get_queue(&self, conversation_id: Option<&str>) -> Result<Vec<QueueItem>> {
        self.ensure_ready().await?;
        let mut items = match conversation_id {
            Some(conversation_id) => self.inner.store.find_by_conversation(conversation_id).await?,
            None => self.inner.store.get_all().await?,
        };
        items.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    /// Delete an item and disarm its retry timer. Idempotent.
    #[instrument(skip(self))]
    pub async fn remove_from_queue(&self, id: &str) -> Result<()> {
        self.ensure_ready().await?;
        self.inner.scheduler.cancel(id);
        self.inner.store.remove(id).await?;
        debug!(item_id = id, "message removed");
        Ok(())
    }

    /// Delete every item and disarm every retry timer.
    #[instrument(skip(self))]
    pub async fn clear_queue(&self) -> Result<()> {
        self.ensure_ready().await?;
        let cancelled = self.inner.scheduler.cancel_all();
        self.inner.store.clear().await?;
        info!(cancelled_timers = cancelled, "queue cleared");
        Ok(())
    }

    /// Run one drain sweep with `sender`.
    pub async fn drain_queue(&self, sender: Arc<dyn MessageSender>) -> Result<DrainReport> {
        self.ensure_ready().await?;
        self.inner.drain.drain(sender).await
    }

    pub async fn get_stats(&self) -> Result<QueueStats> {
        self.ensure_ready().await?;
        let items = self.inner.store.get_all().await?;
        Ok(QueueStats::from_items(&items))
    }

    /// Register a connectivity listener.
    pub fn add_listener<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ConnectivityStatus) + Send + Sync + 'static,
    {
        self.inner.monitor.subscribe(callback)
    }

    /// Move a dead-lettered item back to `pending` with a fresh retry budget.
    #[instrument(skip(self))]
    pub async fn requeue_failed(&self, id: &str) -> Result<QueueItem> {
        self.ensure_ready().await?;
        let item = self
            .inner
            .store
            .get(id)
            .await?
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        if !item.is_dead_letter() {
            return Err(QueueError::InvalidState(format!(
                "item {id} is {} and cannot be requeued",
                item.status
            )));
        }
        let item = self.inner.store.update(id, &ItemPatch::reset()).await?;
        info!(item_id = id, "dead-lettered message requeued");
        Ok(item)
    }

    pub fn is_online(&self) -> bool {
        self.inner.monitor.is_online()
    }

    pub fn monitor(&self) -> &Arc<NetworkMonitor> {
        &self.inner.monitor
    }

    /// Number of armed retry timers.
    pub fn pending_retries(&self) -> usize {
        self.inner.scheduler.pending_count()
    }

    /// Drain automatically with `sender` on every online transition.
    ///
    /// Also drains once right away when already online. Calling `start` again
    /// replaces the registered sender.
    pub async fn start(&self, sender: Arc<dyn MessageSender>) -> Result<()> {
        self.ensure_ready().await?;

        let runtime = Handle::current();
        let drain = Arc::downgrade(&self.inner.drain);
        let listener_sender = Arc::clone(&sender);
        let subscription = self.inner.monitor.subscribe(move |status| {
            if !status.is_online() {
                return;
            }
            let Some(drain) = drain.upgrade() else {
                return;
            };
            let sender = Arc::clone(&listener_sender);
            runtime.spawn(async move {
                if let Err(e) = drain.drain(sender).await {
                    warn!(error = %e, "automatic drain failed");
                }
            });
        });

        if let Some(previous) = self.inner.auto_drain.lock().replace(subscription) {
            previous.unsubscribe();
        }
        info!("automatic drain enabled");

        if self.is_online() {
            let drain = Arc::clone(&self.inner.drain);
            tokio::spawn(async move {
                if let Err(e) = drain.drain(sender).await {
                    warn!(error = %e, "initial drain failed");
                }
            });
        }
        Ok(())
    }

    /// Stop automatic draining and disarm every retry timer.
    ///
    /// The queue stays usable; the next operation restarts the scheduler.
    pub async fn shutdown(&self) {
        if let Some(subscription) = self.inner.auto_drain.lock().take() {
            subscription.unsubscribe();
        }
        let cancelled = self.inner.scheduler.cancel_all();
        self.inner.scheduler.stop().await;
        info!(cancelled_timers = cancelled, "offline queue shut down");
    }
}

impl std::fmt::Debug for OfflineQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineQueue")
            .field("online", &self.is_online())
            .field("pending_retries", &self.pending_retries())
            .finish_non_exhaustive()
    }
}
