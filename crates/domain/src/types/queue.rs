//! Queue item model and its mutation types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MESSAGE_TYPE, MAX_ERROR_LENGTH};

/// Delivery state of a queued message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Never attempted, or requeued after dead-lettering.
    #[default]
    Pending,
    /// At least one attempt failed; a retry is pending.
    Retrying,
    /// Dead-lettered: retry budget exhausted or permanently rejected.
    Failed,
}

crate::impl_domain_status_conversions!(ItemStatus {
    Pending => "pending",
    Retrying => "retrying",
    Failed => "failed",
});

/// A message awaiting delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub conversation_id: String,
    pub content: String,
    pub message_type: String,
    pub media_url: Option<String>,
    pub receiver_id: Option<String>,
    /// Enqueue time in epoch milliseconds; defines FIFO order.
    pub timestamp: u64,
    pub retry_count: u32,
    pub last_retry_at: Option<u64>,
    pub status: ItemStatus,
    pub last_error: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl QueueItem {
    /// Materialize a new pending item from caller input.
    pub fn from_message(message: NewMessage, id: String, timestamp: u64) -> Self {
        Self {
            id,
            conversation_id: message.conversation_id,
            content: message.content,
            message_type: message.message_type,
            media_url: message.media_url,
            receiver_id: message.receiver_id,
            timestamp,
            retry_count: 0,
            last_retry_at: None,
            status: ItemStatus::Pending,
            last_error: None,
            metadata: message.metadata,
        }
    }

    /// Time of the most recent attempt, falling back to the enqueue time.
    #[must_use]
    pub fn last_attempt_at(&self) -> u64 {
        self.last_retry_at.unwrap_or(self.timestamp)
    }

    #[must_use]
    pub fn is_dead_letter(&self) -> bool {
        self.status == ItemStatus::Failed
    }

    /// Merge a partial update into this item.
    pub fn apply(&mut self, patch: &ItemPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(retry_count) = patch.retry_count {
            self.retry_count = retry_count;
        }
        if let Some(last_retry_at) = patch.last_retry_at {
            self.last_retry_at = last_retry_at;
        }
        if let Some(last_error) = &patch.last_error {
            self.last_error.clone_from(last_error);
        }
    }
}

/// Caller input for `enqueue`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Caller-supplied id; a UUID is generated when absent.
    pub id: Option<String>,
    pub conversation_id: String,
    pub content: String,
    pub message_type: String,
    pub media_url: Option<String>,
    pub receiver_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl NewMessage {
    pub fn new(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            conversation_id: conversation_id.into(),
            content: content.into(),
            message_type: DEFAULT_MESSAGE_TYPE.to_string(),
            media_url: None,
            receiver_id: None,
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = message_type.into();
        self
    }

    #[must_use]
    pub fn with_media_url(mut self, media_url: impl Into<String>) -> Self {
        self.media_url = Some(media_url.into());
        self
    }

    #[must_use]
    pub fn with_receiver(mut self, receiver_id: impl Into<String>) -> Self {
        self.receiver_id = Some(receiver_id.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Partial update merged by the store's `update`
///
/// `None` leaves a field untouched. The nullable fields use a nested
/// `Option` so a patch can clear them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPatch {
    pub status: Option<ItemStatus>,
    pub retry_count: Option<u32>,
    pub last_retry_at: Option<Option<u64>>,
    pub last_error: Option<Option<String>>,
}

impl ItemPatch {
    /// Bookkeeping for a failed attempt.
    pub fn failed_attempt(
        retry_count: u32,
        attempted_at: u64,
        error: &str,
        status: ItemStatus,
    ) -> Self {
        Self {
            status: Some(status),
            retry_count: Some(retry_count),
            last_retry_at: Some(Some(attempted_at)),
            last_error: Some(Some(truncate_error(error))),
        }
    }

    /// Back to a fresh pending item.
    #[must_use]
    pub fn reset() -> Self {
        Self {
            status: Some(ItemStatus::Pending),
            retry_count: Some(0),
            last_retry_at: Some(None),
            last_error: Some(None),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn truncate_error(error: &str) -> String {
    if error.len() <= MAX_ERROR_LENGTH {
        return error.to_string();
    }
    let mut end = MAX_ERROR_LENGTH;
    while !error.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &error[..end])
}
