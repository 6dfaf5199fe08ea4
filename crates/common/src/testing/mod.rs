//! Test utilities shared by the courier crates.
//!
//! Enabled with the `test-utils` feature.

mod time;

pub use time::MockClock;
