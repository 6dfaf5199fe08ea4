//! Fan-out of events to registered callbacks.
//!
//! Each callback runs inside `catch_unwind`, so a panicking listener is logged
//! and skipped while the remaining listeners still receive the event.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::error;

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct HubInner<E> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Callback<E>)>>,
}

impl<E> HubInner<E> {
    fn remove(&self, id: u64) {
        self.listeners.lock().retain(|(listener_id, _)| *listener_id != id);
    }
}

/// Publish/subscribe hub with panic-isolated listeners.
pub struct NotificationHub<E> {
    inner: Arc<HubInner<E>>,
}

impl<E: 'static> NotificationHub<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner { next_id: AtomicU64::new(0), listeners: Mutex::new(Vec::new()) }),
        }
    }

    /// Register a callback. It stays registered until the returned
    /// [`Subscription`] is explicitly unsubscribed.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(callback)));

        let hub: Weak<HubInner<E>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(hub) = hub.upgrade() {
                hub.remove(id);
            }
        })
    }

    /// Invoke every registered callback with `event`.
    ///
    /// Listeners are snapshotted first, so a callback may subscribe or
    /// unsubscribe without deadlocking.
    pub fn notify(&self, event: &E) {
        let snapshot: Vec<(u64, Callback<E>)> = self.inner.listeners.lock().clone();
        for (id, callback) in snapshot {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(event))) {
                error!(listener_id = id, panic = %panic_message(payload.as_ref()), "listener panicked");
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}

impl<E: 'static> Default for NotificationHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for NotificationHub<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationHub")
            .field("listeners", &self.inner.listeners.lock().len())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Handle returned by `subscribe`.
///
/// Dropping the handle keeps the listener registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    /// Remove the listener. Safe to call after the hub is gone.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("active", &self.cancel.is_some()).finish()
    }
}
