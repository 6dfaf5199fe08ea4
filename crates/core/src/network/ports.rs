//! Port interfaces for connectivity checks

use async_trait::async_trait;
use courier_domain::DeliveryError;

/// Lightweight reachability check against the backend.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Succeeds when the backend answered. The monitor bounds the call with
    /// its own timeout, so implementations need not.
    async fn probe(&self) -> Result<(), DeliveryError>;
}
