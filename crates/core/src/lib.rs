//! # Courier Core
//!
//! Delivery engine for the offline message queue. No database, HTTP, or
//! platform code lives here.
//!
//! This crate contains:
//! - Ports for the persistent store, the message sender and the
//!   connectivity probe
//! - The notification hub, network monitor and retry scheduler
//! - The drain controller and the [`OfflineQueue`] facade that ties them
//!   together
//!
//! ## Architecture Principles
//! - Depends only on `courier-common` and `courier-domain`
//! - Every collaborator is injected through a trait object
//! - Timers run on Tokio time so tests can pause and advance the clock

pub mod network;
pub mod notify;
pub mod queue;

pub use network::monitor::NetworkMonitor;
pub use network::ports::ConnectivityProbe;
pub use notify::{NotificationHub, Subscription};
pub use queue::backoff::BackoffPolicy;
pub use queue::drain::DrainController;
pub use queue::ports::{send_fn, MessageSender, QueueStore, SendFn};
pub use queue::scheduler::{RetryHandler, RetryScheduler};
pub use queue::service::{OfflineQueue, OfflineQueueBuilder};
