//! Drain sweeps and single-item delivery attempts.
//!
//! A sweep walks the queue in enqueue order and either delivers each item,
//! defers it to the retry scheduler when it is still inside its backoff
//! window, or leaves it alone when a timer already owns it. Timer callbacks
//! re-enter through [`RetryHandler`] and share the same attempt path.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_common::error::{ErrorClassification, ErrorSeverity};
use courier_common::time::Clock;
use courier_domain::{
    DeliveryError, DeliveryFailure, DrainReport, ItemPatch, ItemStatus, QueueError, QueueItem,
    Result,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::backoff::BackoffPolicy;
use super::ports::{MessageSender, QueueStore};
use super::scheduler::{RetryHandler, RetryScheduler};
use crate::network::monitor::NetworkMonitor;

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Delivered,
    /// Failed and armed for another attempt.
    Retrying { error: String },
    /// Failed and moved to the dead-letter state.
    DeadLettered { error: String },
    /// Item vanished, was already in flight, or is dead-lettered.
    Skipped,
}

/// Orchestrates drain sweeps and timer-driven retries.
pub struct DrainController {
    store: Arc<dyn QueueStore>,
    monitor: Arc<NetworkMonitor>,
    scheduler: Arc<RetryScheduler>,
    clock: Arc<dyn Clock>,
    backoff: BackoffPolicy,
    max_attempts: u32,
    draining: AtomicBool,
    in_flight: Mutex<HashSet<String>>,
}

struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct InFlightClaim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.id);
    }
}

impl DrainController {
    pub fn new(
        store: Arc<dyn QueueStore>,
        monitor: Arc<NetworkMonitor>,
        scheduler: Arc<RetryScheduler>,
        clock: Arc<dyn Clock>,
        backoff: BackoffPolicy,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            monitor,
            scheduler,
            clock,
            backoff,
            max_attempts,
            draining: AtomicBool::new(false),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Run one sweep over the queue.
    ///
    /// Returns an empty report without touching the store when another sweep
    /// is running or the monitor reports offline.
    #[instrument(skip(self, sender))]
    pub async fn drain(&self, sender: Arc<dyn MessageSender>) -> Result<DrainReport> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("drain already in progress");
            return Ok(DrainReport::default());
        }
        let _guard = DrainGuard(&self.draining);

        if !self.monitor.is_online() {
            debug!("offline, skipping drain");
            return Ok(DrainReport::default());
        }

        let mut items = self.store.get_all().await?;
        items.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

        let mut report = DrainReport::default();
        for item in items {
            if item.is_dead_letter() || self.scheduler.is_scheduled(&item.id) {
                continue;
            }

            if let Some(remaining) = self.remaining_backoff(&item) {
                self.scheduler.schedule(&item.id, Arc::clone(&sender), remaining);
                report.retried += 1;
                continue;
            }

            match self.attempt(&item.id, &sender).await? {
                AttemptOutcome::Delivered => report.sent += 1,
                AttemptOutcome::Retrying { error } | AttemptOutcome::DeadLettered { error } => {
                    report.failed += 1;
                    report.errors.push(DeliveryFailure { id: item.id.clone(), error });
                }
                AttemptOutcome::Skipped => {}
            }
        }

        info!(
            sent = report.sent,
            failed = report.failed,
            retried = report.retried,
            "drain complete"
        );
        Ok(report)
    }

    /// Time left in the item's backoff window, if it is not yet due.
    fn remaining_backoff(&self, item: &QueueItem) -> Option<Duration> {
        if item.retry_count == 0 {
            return None;
        }
        let wait = self.backoff.delay_after_failures(item.retry_count);
        let elapsed_ms = self.clock.millis_since_epoch().saturating_sub(item.last_attempt_at());
        let elapsed = Duration::from_millis(elapsed_ms);
        (elapsed < wait).then(|| wait - elapsed)
    }

    fn claim(&self, id: &str) -> Option<InFlightClaim<'_>> {
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(id.to_string()) {
            return None;
        }
        Some(InFlightClaim { in_flight: &self.in_flight, id: id.to_string() })
    }

    /// Deliver one item now and record the outcome.
    ///
    /// At most one attempt per id runs at a time; a concurrent attempt for
    /// the same id is skipped.
    #[instrument(skip(self, sender))]
    pub async fn attempt(&self, id: &str, sender: &Arc<dyn MessageSender>) -> Result<AttemptOutcome> {
        let Some(_claim) = self.claim(id) else {
            debug!(item_id = id, "attempt already in flight");
            return Ok(AttemptOutcome::Skipped);
        };

        let Some(item) = self.store.get(id).await? else {
            debug!(item_id = id, "item vanished before delivery");
            return Ok(AttemptOutcome::Skipped);
        };
        if item.is_dead_letter() {
            return Ok(AttemptOutcome::Skipped);
        }

        match sender.send(&item).await {
            Ok(()) => {
                self.store.remove(id).await?;
                self.scheduler.cancel(id);
                info!(item_id = id, retry_count = item.retry_count, "message delivered");
                Ok(AttemptOutcome::Delivered)
            }
            Err(error) => self.record_failure(&item, &error, sender).await,
        }
    }

    async fn record_failure(
        &self,
        item: &QueueItem,
        error: &DeliveryError,
        sender: &Arc<dyn MessageSender>,
    ) -> Result<AttemptOutcome> {
        let retry_count = item.retry_count.saturating_add(1);
        let exhausted = self.max_attempts > 0 && retry_count >= self.max_attempts;
        let dead_letter = !error.is_retryable() || exhausted;
        let status = if dead_letter { ItemStatus::Failed } else { ItemStatus::Retrying };

        let patch = ItemPatch::failed_attempt(
            retry_count,
            self.clock.millis_since_epoch(),
            &error.message,
            status,
        );
        match self.store.update(&item.id, &patch).await {
            Ok(_) => {}
            Err(QueueError::NotFound(_)) => {
                debug!(item_id = %item.id, "item removed while delivery was failing");
                return Ok(AttemptOutcome::Skipped);
            }
            Err(e) => return Err(e),
        }

        if dead_letter {
            if error.severity() >= ErrorSeverity::Error {
                error!(
                    item_id = %item.id,
                    retry_count,
                    error = %error.message,
                    "message rejected, dead-lettered"
                );
            } else {
                warn!(
                    item_id = %item.id,
                    retry_count,
                    error = %error.message,
                    "retries exhausted, dead-lettered"
                );
            }
            return Ok(AttemptOutcome::DeadLettered { error: error.message.clone() });
        }

        let delay = self.backoff.delay_after_failures(retry_count);
        self.scheduler.schedule(&item.id, Arc::clone(sender), delay);
        warn!(
            item_id = %item.id,
            retry_count,
            delay_ms = delay.as_millis(),
            error = %error.message,
            "delivery failed, retry scheduled"
        );
        Ok(AttemptOutcome::Retrying { error: error.message.clone() })
    }
}

#[async_trait]
impl RetryHandler for DrainController {
    async fn retry_due(&self, item_id: String, sender: Arc<dyn MessageSender>) {
        if !self.monitor.is_online() {
            debug!(item_id = %item_id, "retry due while offline, waiting for reconnect");
            return;
        }
        if let Err(e) = self.attempt(&item_id, &sender).await {
            warn!(item_id = %item_id, error = %e, "scheduled retry failed");
        }
    }
}

impl std::fmt::Debug for DrainController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrainController")
            .field("draining", &self.is_draining())
            .field("in_flight", &self.in_flight.lock().len())
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}
