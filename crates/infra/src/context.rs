//! Queue assembled from configuration.

use std::sync::Arc;

use courier_core::{ConnectivityProbe, MessageSender, NetworkMonitor, OfflineQueue, QueueStore};
use courier_domain::{CourierConfig, Result};
use tracing::info;

use crate::database::{InMemoryQueueStore, SqliteQueueStore};
use crate::http::HttpHealthProbe;

/// Owns the queue and its network monitor for the lifetime of the host.
///
/// A configured `storage.path` selects the SQLite store, otherwise items live
/// in memory. A configured `network.health_url` enables active probing.
#[derive(Debug)]
pub struct QueueContext {
    queue: OfflineQueue,
    monitor: Arc<NetworkMonitor>,
    config: CourierConfig,
}

impl QueueContext {
    pub fn from_config(config: CourierConfig) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn QueueStore> = match &config.storage.path {
            Some(path) => Arc::new(SqliteQueueStore::open(
                path,
                config.storage.pool_size,
                config.queue.max_capacity,
            )),
            None => Arc::new(InMemoryQueueStore::new(config.queue.max_capacity)),
        };

        let probe = HttpHealthProbe::from_config(&config.network)?
            .map(|probe| Arc::new(probe) as Arc<dyn ConnectivityProbe>);
        let monitor = Arc::new(NetworkMonitor::from_config(&config.network, probe));

        let queue = OfflineQueue::builder(store)
            .monitor(Arc::clone(&monitor))
            .config(config.queue.clone())
            .build()?;

        info!(
            persistent = config.storage.path.is_some(),
            probing = config.network.health_url.is_some(),
            capacity = config.queue.max_capacity,
            "queue context created"
        );
        Ok(Self { queue, monitor, config })
    }

    pub const fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    pub const fn monitor(&self) -> &Arc<NetworkMonitor> {
        &self.monitor
    }

    pub const fn config(&self) -> &CourierConfig {
        &self.config
    }

    /// Enable automatic draining with `sender`, then start probing.
    pub async fn start(&self, sender: Arc<dyn MessageSender>) -> Result<()> {
        self.queue.start(sender).await?;
        self.monitor.start()
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.monitor.stop().await?;
        self.queue.shutdown().await;
        Ok(())
    }
}
