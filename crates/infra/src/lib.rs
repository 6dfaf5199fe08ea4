//! # Courier Infrastructure
//!
//! Infrastructure implementations of core queue ports.
//!
//! This crate contains:
//! - Queue stores (SQLite through an r2d2 pool, and in-memory)
//! - HTTP health probe and message sender
//! - Configuration loading from the environment and files
//! - Tracing subscriber setup
//!
//! ## Architecture
//! - Implements traits defined in `courier-core`
//! - Contains all "impure" code (disk, network, process environment)

pub mod config;
pub mod context;
pub mod database;
pub mod errors;
pub mod http;
pub mod observability;

// Re-export commonly used items
pub use context::QueueContext;
pub use database::{DbManager, InMemoryQueueStore, SqliteQueueStore};
pub use http::{HttpHealthProbe, HttpMessageSender};
pub use observability::init_tracing;
