//! Domain types and models

pub mod network;
pub mod queue;
pub mod stats;

pub use network::ConnectivityStatus;
pub use queue::{ItemPatch, ItemStatus, NewMessage, QueueItem};
pub use stats::{DeliveryFailure, DrainReport, QueueStats};
