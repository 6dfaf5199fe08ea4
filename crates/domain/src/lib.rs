//! # Courier Domain
//!
//! Plain data for the offline message queue.
//!
//! This crate contains:
//! - Queue item, patch, statistics and drain report types
//! - Error types and the `Result` alias
//! - Configuration structures with their defaults
//! - Domain constants
//!
//! ## Architecture
//! - Depends only on `courier-common` for error classification
//! - No I/O and no async runtime

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
