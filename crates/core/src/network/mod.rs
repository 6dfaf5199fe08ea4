//! Connectivity tracking.

pub mod monitor;
pub mod ports;
