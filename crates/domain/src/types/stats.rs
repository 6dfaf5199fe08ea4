//! Aggregate views over the queue.

use serde::{Deserialize, Serialize};

use super::queue::{ItemStatus, QueueItem};

/// Snapshot returned by `get_stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub retrying: usize,
    /// Dead-lettered items.
    pub failed: usize,
    pub oldest_timestamp: Option<u64>,
    pub average_retry_count: f64,
}

impl QueueStats {
    /// Compute statistics over a set of items. An empty set yields zeros.
    pub fn from_items(items: &[QueueItem]) -> Self {
        let mut stats = Self { total: items.len(), ..Self::default() };
        let mut retry_sum: u64 = 0;

        for item in items {
            match item.status {
                ItemStatus::Pending => stats.pending += 1,
                ItemStatus::Retrying => stats.retrying += 1,
                ItemStatus::Failed => stats.failed += 1,
            }
            retry_sum += u64::from(item.retry_count);
            stats.oldest_timestamp = Some(
                stats.oldest_timestamp.map_or(item.timestamp, |oldest| oldest.min(item.timestamp)),
            );
        }

        if stats.total > 0 {
            #[allow(clippy::cast_precision_loss)]
            let average = retry_sum as f64 / stats.total as f64;
            stats.average_retry_count = average;
        }
        stats
    }
}

/// One failed delivery recorded during a drain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    pub id: String,
    pub error: String,
}

/// Outcome counters for one drain sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Delivered and removed.
    pub sent: usize,
    /// Attempted and failed during this sweep.
    pub failed: usize,
    /// Not yet due; rescheduled for later.
    pub retried: usize,
    pub errors: Vec<DeliveryFailure>,
}

impl DrainReport {
    /// True when the sweep did nothing (offline, re-entrant, or empty queue).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sent == 0 && self.failed == 0 && self.retried == 0 && self.errors.is_empty()
    }
}
