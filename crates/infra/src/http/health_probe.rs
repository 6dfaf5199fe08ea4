//! Backend reachability check used by the network monitor.
//!
//! Issues a `HEAD` request against a health endpoint. Any 2xx answer counts
//! as reachable; everything else, including timeouts and refused
//! connections, counts as unreachable.

use std::time::Duration;

use async_trait::async_trait;
use courier_core::ConnectivityProbe;
use courier_domain::{DeliveryError, NetworkConfig, Result};
use reqwest::Client;
use tracing::{debug, instrument};

use super::build_client;
use crate::errors::IntoDeliveryError;

/// [`ConnectivityProbe`] that pings an HTTP health endpoint.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: Client,
    url: String,
}

impl HttpHealthProbe {
    /// Probe `url` with requests bounded by `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self { client: build_client(timeout)?, url: url.into() })
    }

    /// Probe for the configured health URL, if any.
    pub fn from_config(config: &NetworkConfig) -> Result<Option<Self>> {
        config
            .health_url
            .as_deref()
            .map(|url| Self::new(url, config.probe_timeout()))
            .transpose()
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ConnectivityProbe for HttpHealthProbe {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn probe(&self) -> std::result::Result<(), DeliveryError> {
        let response = self
            .client
            .head(&self.url)
            .send()
            .await
            .map_err(IntoDeliveryError::into_delivery_error)?;

        let status = response.status();
        if status.is_success() {
            debug!(%status, "health endpoint reachable");
            Ok(())
        } else {
            Err(DeliveryError::transient(format!("health endpoint returned {status}")))
        }
    }
}
