//! Error classification shared across the courier crates.
//!
//! Every error enum in the workspace implements [`ErrorClassification`] so the
//! delivery engine and callers can make retry and alerting decisions without
//! matching on concrete variants.
//!
//! # Implementing classification
//!
//! ```rust
//! use std::time::Duration;
//!
//! use courier_common::error::ErrorSeverity;
//! use courier_common::impl_error_classification;
//!
//! #[derive(Debug, thiserror::Error)]
//! pub enum WidgetError {
//!     #[error("widget {0} not found")]
//!     NotFound(String),
//!     #[error("widget backend busy")]
//!     Busy,
//! }
//!
//! impl_error_classification!(WidgetError,
//!     Self::NotFound(_) => {
//!         retryable: false,
//!         severity: ErrorSeverity::Info,
//!         critical: false,
//!     },
//!     Self::Busy => {
//!         retryable: true,
//!         severity: ErrorSeverity::Warning,
//!         critical: false,
//!         retry_after: Some(Duration::from_secs(1)),
//!     },
//! );
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Trait for classifying errors by retryability and severity.
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient issues that may succeed if attempted
    /// again, such as a dropped connection or a busy backend.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    ///
    /// Used for logging and alerting decisions.
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    ///
    /// Critical errors indicate the subsystem cannot make progress at all,
    /// for example when the backing store failed to open.
    fn is_critical(&self) -> bool;

    /// Get the suggested retry delay if applicable
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Implements [`ErrorClassification`] from a table of variant patterns.
///
/// Each arm lists `retryable`, `severity` and `critical`, plus an optional
/// `retry_after`. Arms without `retry_after` report `None`.
///
/// ```rust,ignore
/// impl_error_classification!(QueueError,
///     Self::CapacityExceeded(_) => {
///         retryable: false,
///         severity: ErrorSeverity::Warning,
///         critical: false,
///     },
/// );
/// ```
#[macro_export]
macro_rules! impl_error_classification {
    (
        $error_type:ty
        $(,
            $variant:pat => {
                retryable: $retryable:expr,
                severity: $severity:expr,
                critical: $critical:expr
                $(, retry_after: $retry_after:expr)?
                $(,)?
            }
        )*
        $(,)?
    ) => {
        impl $crate::error::ErrorClassification for $error_type {
            fn is_retryable(&self) -> bool {
                match self {
                    $(
                        $variant => $retryable,
                    )*
                }
            }

            fn severity(&self) -> $crate::error::ErrorSeverity {
                match self {
                    $(
                        $variant => $severity,
                    )*
                }
            }

            fn is_critical(&self) -> bool {
                match self {
                    $(
                        $variant => $critical,
                    )*
                }
            }

            fn retry_after(&self) -> Option<std::time::Duration> {
                match self {
                    $(
                        $(
                            $variant => $retry_after,
                        )?
                    )*
                    #[allow(unreachable_patterns)]
                    _ => None,
                }
            }
        }
    };
}
