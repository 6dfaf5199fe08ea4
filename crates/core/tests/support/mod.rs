//! Shared test helpers for `courier-core` integration tests.
//!
//! An in-memory store and scripted senders so queue tests can focus on
//! delivery behaviour instead of storage plumbing.

#![allow(dead_code)]

pub mod senders;
pub mod store;
