//! Offline delivery queue.

pub mod backoff;
pub mod drain;
pub mod ports;
pub mod scheduler;
pub mod service;
