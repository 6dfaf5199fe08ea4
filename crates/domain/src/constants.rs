//! Domain constants
//!
//! Defaults for queue sizing, retry backoff and connectivity probing.

// Queue sizing
pub const DEFAULT_MAX_CAPACITY: usize = 1000;

// Retry backoff, indexed by retry count and clamped to the last entry
pub const DEFAULT_BACKOFF_MS: [u64; 5] = [1_000, 2_000, 5_000, 10_000, 30_000];

/// Failed attempts before an item is dead-lettered. Zero retries forever.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

// Connectivity probing
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

// Storage
pub const DEFAULT_POOL_SIZE: u32 = 4;

// Messages
pub const DEFAULT_MESSAGE_TYPE: &str = "text";
pub const MAX_ERROR_LENGTH: usize = 500;

// Logging
pub const DEFAULT_LOG_LEVEL: &str = "info";
