//! Time abstraction.
//!
//! Queue timestamps and backoff due-time checks read the wall clock through
//! [`Clock`] so tests can substitute a controllable implementation.
//!
//! ```
//! use courier_common::time::{Clock, SystemClock};
//!
//! let clock = SystemClock;
//! assert!(clock.millis_since_epoch() > 0);
//! ```

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Trait for time operations to enable testing
pub trait Clock: Send + Sync {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;

    /// Get milliseconds since UNIX epoch
    ///
    /// A wall clock set before the epoch reads as zero.
    fn millis_since_epoch(&self) -> u64 {
        let millis = self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        u64::try_from(millis).unwrap_or(u64::MAX)
    }
}

/// Real system clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}
