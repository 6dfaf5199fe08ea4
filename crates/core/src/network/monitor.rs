//! Connectivity monitor with passive signals and an active probe.
//!
//! Two inputs feed one cached boolean:
//! - passive signals from the host runtime ([`NetworkMonitor::report_online`] /
//!   [`NetworkMonitor::report_offline`]), the low-latency path
//! - a periodic [`ConnectivityProbe`] bounded by a timeout, which also catches
//!   backend-only outages the host never reports
//!
//! Listeners are notified only on transitions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use courier_domain::{ConnectivityStatus, NetworkConfig, QueueError, Result};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::ports::ConnectivityProbe;
use crate::notify::{NotificationHub, Subscription};

const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

struct MonitorState {
    online: AtomicBool,
    hub: NotificationHub<ConnectivityStatus>,
}

impl MonitorState {
    /// Store the new state; notify listeners if it changed.
    fn set(&self, online: bool, source: &'static str) -> bool {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous == online {
            return false;
        }
        let status = ConnectivityStatus::from_online(online);
        info!(%status, source, "connectivity changed");
        self.hub.notify(&status);
        true
    }
}

/// Tracks connectivity and publishes online/offline transitions.
pub struct NetworkMonitor {
    state: Arc<MonitorState>,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    interval: Duration,
    timeout: Duration,
    worker: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl NetworkMonitor {
    /// Monitor driven only by passive signals until a probe is attached.
    pub fn new(initially_online: bool) -> Self {
        let defaults = NetworkConfig::default();
        Self {
            state: Arc::new(MonitorState {
                online: AtomicBool::new(initially_online),
                hub: NotificationHub::new(),
            }),
            probe: None,
            interval: defaults.probe_interval(),
            timeout: defaults.probe_timeout(),
            worker: Mutex::new(None),
        }
    }

    pub fn from_config(config: &NetworkConfig, probe: Option<Arc<dyn ConnectivityProbe>>) -> Self {
        let monitor = Self::new(config.start_online);
        match probe {
            Some(probe) => {
                monitor.with_probe(probe, config.probe_interval(), config.probe_timeout())
            }
            None => monitor,
        }
    }

    #[must_use]
    pub fn with_probe(
        mut self,
        probe: Arc<dyn ConnectivityProbe>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        self.probe = Some(probe);
        self.interval = interval;
        self.timeout = timeout;
        self
    }

    /// Cached state; never blocks.
    pub fn is_online(&self) -> bool {
        self.state.online.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ConnectivityStatus {
        ConnectivityStatus::from_online(self.is_online())
    }

    /// Passive "went online" signal from the host runtime.
    pub fn report_online(&self) -> bool {
        self.state.set(true, "signal")
    }

    /// Passive "went offline" signal from the host runtime.
    pub fn report_offline(&self) -> bool {
        self.state.set(false, "signal")
    }

    /// Register a listener for transitions.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ConnectivityStatus) + Send + Sync + 'static,
    {
        self.state.hub.subscribe(move |status: &ConnectivityStatus| callback(*status))
    }

    /// Run one probe now and apply its result.
    ///
    /// Without a probe this returns the cached state.
    pub async fn check_now(&self) -> bool {
        match &self.probe {
            Some(probe) => run_probe(&self.state, probe.as_ref(), self.timeout).await,
            None => self.is_online(),
        }
    }

    /// Start the periodic probe. Without a probe only passive signals apply.
    #[instrument(skip(self), fields(interval_secs = self.interval.as_secs()))]
    pub fn start(&self) -> Result<()> {
        let Some(probe) = self.probe.clone() else {
            debug!("no connectivity probe configured, relying on passive signals");
            return Ok(());
        };

        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(QueueError::InvalidState("network monitor already running".into()));
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(probe_worker(
            Arc::clone(&self.state),
            probe,
            self.interval,
            self.timeout,
            cancel.clone(),
        ));
        *worker = Some((cancel, handle));
        info!("network monitor started");
        Ok(())
    }

    /// Stop the periodic probe and wait for the worker to exit.
    pub async fn stop(&self) -> Result<()> {
        let Some((cancel, handle)) = self.worker.lock().take() else {
            return Ok(());
        };
        cancel.cancel();

        tokio::time::timeout(JOIN_TIMEOUT, handle)
            .await
            .map_err(|_| QueueError::Internal("network monitor shutdown timeout".into()))?
            .map_err(|e| QueueError::Internal(format!("network monitor join failed: {e}")))?;

        info!("network monitor stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.state.hub.listener_count()
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        if let Some((cancel, _)) = self.worker.get_mut().take() {
            cancel.cancel();
        }
    }
}

impl std::fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("online", &self.is_online())
            .field("probe", &self.probe.is_some())
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

async fn run_probe(state: &MonitorState, probe: &dyn ConnectivityProbe, timeout: Duration) -> bool {
    let reachable = match tokio::time::timeout(timeout, probe.probe()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(error = %e, "connectivity probe failed");
            false
        }
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis(), "connectivity probe timed out");
            false
        }
    };
    state.set(reachable, "probe");
    reachable
}

async fn probe_worker(
    state: Arc<MonitorState>,
    probe: Arc<dyn ConnectivityProbe>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("network monitor worker shutting down");
                break;
            }
            _ = ticker.tick() => {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = run_probe(&state, probe.as_ref(), timeout) => {}
                }
            }
        }
    }
}
