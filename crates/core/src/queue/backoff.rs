//! Retry delay lookup.

use std::time::Duration;

use courier_domain::{QueueConfig, QueueError, Result};

/// Fixed backoff table indexed by retry count, clamped to its last entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    delays: Vec<Duration>,
}

impl BackoffPolicy {
    /// Build a policy from a non-empty, non-decreasing table.
    pub fn new(delays: Vec<Duration>) -> Result<Self> {
        if delays.is_empty() {
            return Err(QueueError::Config("backoff table must not be empty".into()));
        }
        if delays.windows(2).any(|pair| pair[1] < pair[0]) {
            return Err(QueueError::Config("backoff table must be non-decreasing".into()));
        }
        Ok(Self { delays })
    }

    pub fn from_config(config: &QueueConfig) -> Result<Self> {
        Self::new(config.backoff())
    }

    /// Table entry for `retry_count`, i.e. `delays[min(retry_count, len - 1)]`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let last = self.delays.len() - 1;
        let index = usize::try_from(retry_count).map_or(last, |count| count.min(last));
        self.delays[index]
    }

    /// Wait imposed after the `failed_attempts`-th failure.
    ///
    /// The first failure waits `delays[0]`, the second `delays[1]`, and so on.
    pub fn delay_after_failures(&self, failed_attempts: u32) -> Duration {
        self.delay_for(failed_attempts.saturating_sub(1))
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { delays: QueueConfig::default().backoff() }
    }
}
