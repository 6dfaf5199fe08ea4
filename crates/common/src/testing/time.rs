//! Controllable clock for deterministic tests.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::time::Clock;

/// Mock clock for deterministic testing
///
/// Time only moves when [`advance`](Self::advance) or
/// [`set_elapsed`](Self::set_elapsed) is called. Clones share the same
/// elapsed counter, so a clone handed to the queue observes advances made by
/// the test.
///
/// ```
/// use std::time::Duration;
///
/// use courier_common::testing::MockClock;
/// use courier_common::time::Clock;
///
/// let clock = MockClock::at_millis(1_000);
/// clock.advance(Duration::from_millis(250));
/// assert_eq!(clock.millis_since_epoch(), 1_250);
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
    base_system_time: SystemTime,
}

impl MockClock {
    /// Create a mock clock anchored at the current real time.
    pub fn new() -> Self {
        Self::anchored(SystemTime::now())
    }

    /// Create a mock clock whose wall clock reads `millis` after the epoch.
    pub fn at_millis(millis: u64) -> Self {
        Self::anchored(UNIX_EPOCH + Duration::from_millis(millis))
    }

    fn anchored(base_system_time: SystemTime) -> Self {
        Self {
            start: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
            base_system_time,
        }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        // Test utility: panic on poisoned mutex to fail tests early
        let mut elapsed = self.elapsed.lock().expect("mutex poisoned");
        *elapsed += duration;
    }

    /// Set the mock clock to a specific elapsed time
    pub fn set_elapsed(&self, duration: Duration) {
        // Test utility: panic on poisoned mutex to fail tests early
        let mut elapsed = self.elapsed.lock().expect("mutex poisoned");
        *elapsed = duration;
    }

    /// Get the current elapsed time
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        // Test utility: panic on poisoned mutex to fail tests early
        *self.elapsed.lock().expect("mutex poisoned")
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        self.base_system_time + self.elapsed()
    }
}
