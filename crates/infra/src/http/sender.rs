//! HTTP delivery of queued messages.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::MessageSender;
use courier_domain::{DeliveryError, QueueItem, Result};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use super::build_client;
use crate::errors::IntoDeliveryError;

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Request body posted for each message.
#[derive(Debug, Serialize)]
struct OutgoingMessage<'a> {
    id: &'a str,
    conversation_id: &'a str,
    content: &'a str,
    message_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    receiver_id: Option<&'a str>,
    timestamp: u64,
    metadata: &'a BTreeMap<String, String>,
}

impl<'a> From<&'a QueueItem> for OutgoingMessage<'a> {
    fn from(item: &'a QueueItem) -> Self {
        Self {
            id: &item.id,
            conversation_id: &item.conversation_id,
            content: &item.content,
            message_type: &item.message_type,
            media_url: item.media_url.as_deref(),
            receiver_id: item.receiver_id.as_deref(),
            timestamp: item.timestamp,
            metadata: &item.metadata,
        }
    }
}

/// [`MessageSender`] that POSTs each item as JSON.
///
/// The item id travels as an idempotency key so the backend can drop
/// duplicates after an ambiguous failure. Status codes are classified by
/// [`IntoDeliveryError`]: most 4xx answers dead-letter the item, everything
/// else is retried.
#[derive(Debug, Clone)]
pub struct HttpMessageSender {
    client: Client,
    endpoint: String,
}

impl HttpMessageSender {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self { client: build_client(timeout)?, endpoint: endpoint.into() })
    }
}

#[async_trait]
impl MessageSender for HttpMessageSender {
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    async fn send(&self, item: &QueueItem) -> std::result::Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(IDEMPOTENCY_HEADER, &item.id)
            .json(&OutgoingMessage::from(item))
            .send()
            .await
            .map_err(IntoDeliveryError::into_delivery_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status.into_delivery_error());
        }
        debug!(%status, "message accepted by backend");
        Ok(())
    }
}
