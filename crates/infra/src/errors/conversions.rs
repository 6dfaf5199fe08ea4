//! Conversions from external infrastructure errors into domain errors.

use courier_domain::{DeliveryError, QueueError};
use reqwest::{Error as HttpError, StatusCode};
use rusqlite::Error as SqlError;
use tokio::task::JoinError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub QueueError);

impl From<InfraError> for QueueError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<QueueError> for InfraError {
    fn from(value: QueueError) -> Self {
        Self(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoQueueError {
    fn into_queue_error(self) -> QueueError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → QueueError */
/* -------------------------------------------------------------------------- */

impl IntoQueueError for SqlError {
    fn into_queue_error(self) -> QueueError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => QueueError::Storage("database is busy".into()),
                    (ErrorCode::DatabaseLocked, _) => {
                        QueueError::Storage("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 1555 | 2067) => {
                        QueueError::Storage("unique constraint violation".into())
                    }
                    (ErrorCode::CannotOpen, _) => {
                        QueueError::StoreUnavailable(format!("unable to open database: {message}"))
                    }
                    (ErrorCode::NotADatabase, _) => QueueError::StoreUnavailable(
                        "file is not a database or is corrupted".into(),
                    ),
                    (ErrorCode::DiskFull, _) => QueueError::Storage("disk is full".into()),
                    _ => QueueError::Storage(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => QueueError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                QueueError::Storage(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, name, ty) => {
                QueueError::Storage(format!("invalid column type for {name}: {ty}"))
            }
            RE::Utf8Error(_) => QueueError::Storage("invalid UTF-8 returned from sqlite".into()),
            RE::InvalidPath(path) => QueueError::StoreUnavailable(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            RE::InvalidQuery => QueueError::Storage("invalid SQL query".into()),
            other => QueueError::Storage(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        Self(value.into_queue_error())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error / serde_json::Error / JoinError → QueueError */
/* -------------------------------------------------------------------------- */

impl IntoQueueError for r2d2::Error {
    fn into_queue_error(self) -> QueueError {
        QueueError::Storage(format!("connection pool error: {self}"))
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        Self(value.into_queue_error())
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        Self(QueueError::Storage(format!("invalid metadata JSON: {value}")))
    }
}

/// Map a failed `spawn_blocking` join into a domain error.
pub fn map_join_error(err: JoinError) -> QueueError {
    if err.is_cancelled() {
        QueueError::Internal("storage task cancelled".into())
    } else {
        QueueError::Internal(format!("storage task panic: {err}"))
    }
}

/// Shorthand used by the SQLite adapter.
pub fn map_sql_error(err: SqlError) -> QueueError {
    QueueError::from(InfraError::from(err))
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error / StatusCode → DeliveryError */
/* -------------------------------------------------------------------------- */

/// Classify HTTP failures as transient or permanent delivery errors.
pub trait IntoDeliveryError {
    fn into_delivery_error(self) -> DeliveryError;
}

impl IntoDeliveryError for StatusCode {
    fn into_delivery_error(self) -> DeliveryError {
        let message =
            format!("HTTP {} {}", self.as_u16(), self.canonical_reason().unwrap_or("unknown status"));

        match self.as_u16() {
            408 | 425 | 429 => DeliveryError::transient(message),
            400..=499 => DeliveryError::permanent(message),
            _ => DeliveryError::transient(message),
        }
    }
}

impl IntoDeliveryError for HttpError {
    fn into_delivery_error(self) -> DeliveryError {
        if self.is_timeout() {
            return DeliveryError::transient("HTTP request timed out");
        }

        if self.is_connect() {
            return DeliveryError::transient("HTTP connection failure");
        }

        if let Some(status) = self.status() {
            return status.into_delivery_error();
        }

        if self.is_builder() {
            return DeliveryError::permanent(format!("invalid HTTP request: {self}"));
        }

        DeliveryError::transient(self.to_string())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
