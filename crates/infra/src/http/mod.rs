//! HTTP adapters: connectivity probe and message sender

pub mod health_probe;
pub mod sender;

use std::time::Duration;

use courier_domain::{QueueError, Result};
use reqwest::Client;

pub use health_probe::HttpHealthProbe;
pub use sender::HttpMessageSender;

const USER_AGENT: &str = concat!("courier/", env!("CARGO_PKG_VERSION"));

/// Shared client settings for the HTTP adapters.
fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .no_proxy()
        .build()
        .map_err(|e| QueueError::Config(format!("failed to build HTTP client: {e}")))
}
