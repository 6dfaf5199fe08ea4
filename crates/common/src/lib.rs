//! Shared primitives for the courier crates.
//!
//! - [`error`]: error classification and severity shared by every error enum
//! - [`time`]: the [`Clock`](time::Clock) abstraction used for enqueue
//!   timestamps and backoff due-time checks
//! - [`testing`]: a controllable [`MockClock`](testing::MockClock), available
//!   with the `test-utils` feature

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod error;
pub mod time;

#[cfg(any(feature = "test-utils", test))]
pub mod testing;

pub use error::{ErrorClassification, ErrorSeverity};
pub use time::{Clock, SystemClock};
