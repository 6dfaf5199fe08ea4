//! Queue store implementations

pub mod manager;
pub mod memory_repository;
pub mod queue_repository;

pub use manager::*;
pub use memory_repository::*;
pub use queue_repository::*;
