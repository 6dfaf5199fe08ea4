//! Error types used throughout the queue

use std::time::Duration;

use courier_common::error::ErrorSeverity;
use courier_common::impl_error_classification;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the queue and its store
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum QueueError {
    #[error("Queue is at maximum capacity ({0})")]
    CapacityExceeded(usize),

    #[error("Item with id {0} is already queued")]
    DuplicateId(String),

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl_error_classification!(QueueError,
    Self::CapacityExceeded(_) => {
        retryable: false,
        severity: ErrorSeverity::Warning,
        critical: false,
    },
    Self::DuplicateId(_) | Self::NotFound(_) => {
        retryable: false,
        severity: ErrorSeverity::Info,
        critical: false,
    },
    Self::StoreUnavailable(_) => {
        retryable: false,
        severity: ErrorSeverity::Critical,
        critical: true,
    },
    Self::Storage(_) => {
        retryable: true,
        severity: ErrorSeverity::Error,
        critical: false,
        retry_after: Some(Duration::from_millis(100)),
    },
    Self::Config(_) | Self::InvalidState(_) | Self::Internal(_) => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
);

/// Result type alias for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;

/// Whether a failed delivery is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryErrorKind {
    /// Network trouble or a busy backend; retried with backoff.
    Transient,
    /// The backend rejected the message itself; dead-lettered at once.
    Permanent,
}

crate::impl_domain_status_conversions!(DeliveryErrorKind {
    Transient => "transient",
    Permanent => "permanent",
});

/// Failure reported by a message sender or connectivity probe
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind} delivery failure: {message}")]
pub struct DeliveryError {
    pub kind: DeliveryErrorKind,
    pub message: String,
}

impl DeliveryError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self { kind: DeliveryErrorKind::Transient, message: message.into() }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self { kind: DeliveryErrorKind::Permanent, message: message.into() }
    }

    #[must_use]
    pub fn is_permanent(&self) -> bool {
        self.kind == DeliveryErrorKind::Permanent
    }
}

impl_error_classification!(DeliveryError,
    Self { kind: DeliveryErrorKind::Transient, .. } => {
        retryable: true,
        severity: ErrorSeverity::Warning,
        critical: false,
    },
    Self { kind: DeliveryErrorKind::Permanent, .. } => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
);
