//! Per-item retry timers driven by a single scheduler loop.
//!
//! Timers live in a min-heap ordered by due time. Each item id maps to at
//! most one live timer; re-scheduling or cancelling replaces the map entry and
//! leaves the old heap entry behind as stale, to be discarded when it reaches
//! the top of the heap.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ports::MessageSender;

const JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const STALE_COMPACTION_SLACK: usize = 64;

/// Receives fired timers.
#[async_trait]
pub trait RetryHandler: Send + Sync {
    /// Called once the timer for `item_id` is due.
    async fn retry_due(&self, item_id: String, sender: Arc<dyn MessageSender>);
}

struct TimerEntry {
    sequence: u64,
    sender: Arc<dyn MessageSender>,
}

#[derive(Debug, PartialEq, Eq)]
struct HeapEntry {
    due: Instant,
    sequence: u64,
    item_id: String,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due.cmp(&other.due).then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct SchedulerState {
    heap: BinaryHeap<Reverse<HeapEntry>>,
    timers: HashMap<String, TimerEntry>,
    next_sequence: u64,
}

type Fired = Vec<(String, Arc<dyn MessageSender>)>;

impl SchedulerState {
    fn is_live(&self, entry: &HeapEntry) -> bool {
        self.timers.get(&entry.item_id).is_some_and(|timer| timer.sequence == entry.sequence)
    }

    /// Pop every live entry due at `now`; return them with the next due time.
    fn take_due(&mut self, now: Instant) -> (Fired, Option<Instant>) {
        let mut fired = Vec::new();
        while let Some(Reverse(top)) = self.heap.peek() {
            if !self.is_live(top) {
                self.heap.pop();
                continue;
            }
            if top.due > now {
                return (fired, Some(top.due));
            }
            if let Some(Reverse(entry)) = self.heap.pop() {
                if let Some(timer) = self.timers.remove(&entry.item_id) {
                    fired.push((entry.item_id, timer.sender));
                }
            }
        }
        (fired, None)
    }

    fn compact(&mut self) {
        if self.heap.len() <= self.timers.len() * 2 + STALE_COMPACTION_SLACK {
            return;
        }
        let entries = std::mem::take(&mut self.heap).into_vec();
        let live: BinaryHeap<_> =
            entries.into_iter().filter(|Reverse(entry)| self.is_live(entry)).collect();
        self.heap = live;
    }
}

struct SchedulerShared {
    state: Mutex<SchedulerState>,
    wake: Notify,
}

/// Arms at most one retry timer per item id.
pub struct RetryScheduler {
    shared: Arc<SchedulerShared>,
    worker: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl RetryScheduler {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                state: Mutex::new(SchedulerState::default()),
                wake: Notify::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the scheduler loop. Does nothing if it is already running.
    ///
    /// The loop holds the handler weakly and exits once it is dropped.
    pub fn start(&self, handler: Weak<dyn RetryHandler>) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(run_loop(shared, handler, cancel.clone()));
        *worker = Some((cancel, handle));
        info!("retry scheduler started");
    }

    /// Cancel the loop and wait for it to finish.
    pub async fn stop(&self) {
        let Some((cancel, handle)) = self.worker.lock().take() else {
            return;
        };
        cancel.cancel();
        match tokio::time::timeout(JOIN_TIMEOUT, handle).await {
            Ok(Ok(())) => info!("retry scheduler stopped"),
            Ok(Err(e)) => warn!(error = %e, "retry scheduler task panicked"),
            Err(_) => warn!("retry scheduler did not stop within timeout"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Arm a timer for `item_id`, replacing any existing one.
    pub fn schedule(&self, item_id: &str, sender: Arc<dyn MessageSender>, delay: Duration) {
        let due = Instant::now() + delay;
        {
            let mut state = self.shared.state.lock();
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            let replaced = state
                .timers
                .insert(item_id.to_string(), TimerEntry { sequence, sender })
                .is_some();
            state.heap.push(Reverse(HeapEntry { due, sequence, item_id: item_id.to_string() }));
            state.compact();
            debug!(item_id, delay_ms = delay.as_millis(), replaced, "retry scheduled");
        }
        self.shared.wake.notify_one();
    }

    /// Disarm the timer for `item_id`. Returns whether one was armed.
    pub fn cancel(&self, item_id: &str) -> bool {
        let cancelled = self.shared.state.lock().timers.remove(item_id).is_some();
        if cancelled {
            debug!(item_id, "retry cancelled");
            self.shared.wake.notify_one();
        }
        cancelled
    }

    /// Disarm every timer.
    pub fn cancel_all(&self) -> usize {
        let cancelled = {
            let mut state = self.shared.state.lock();
            let cancelled = state.timers.len();
            state.timers.clear();
            state.heap.clear();
            cancelled
        };
        if cancelled > 0 {
            debug!(cancelled, "all retries cancelled");
        }
        self.shared.wake.notify_one();
        cancelled
    }

    pub fn is_scheduled(&self, item_id: &str) -> bool {
        self.shared.state.lock().timers.contains_key(item_id)
    }

    /// Number of armed timers.
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().timers.len()
    }
}

impl Default for RetryScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RetryScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryScheduler")
            .field("pending", &self.pending_count())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        if let Some((cancel, _)) = self.worker.get_mut().take() {
            cancel.cancel();
        }
    }
}

async fn run_loop(
    shared: Arc<SchedulerShared>,
    handler: Weak<dyn RetryHandler>,
    cancel: CancellationToken,
) {
    loop {
        let (fired, next_due) = shared.state.lock().take_due(Instant::now());

        for (item_id, sender) in fired {
            let Some(handler) = handler.upgrade() else {
                debug!("retry handler dropped, scheduler loop exiting");
                return;
            };
            debug!(item_id = %item_id, "retry timer fired");
            tokio::spawn(async move { handler.retry_due(item_id, sender).await });
        }

        match next_due {
            Some(due) => {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep_until(due) => {}
                    () = shared.wake.notified() => {}
                }
            }
            None => {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = shared.wake.notified() => {}
                }
            }
        }
    }
    debug!("retry scheduler loop cancelled");
}
