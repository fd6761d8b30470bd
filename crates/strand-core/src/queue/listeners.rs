//! Idle listeners.

use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::sync::lock;

/// Observer notified each time a pool's pending queue drains to empty.
pub trait IdleListener: Send + Sync {
    fn on_idle(&self);
}

impl<F> IdleListener for F
where
    F: Fn() + Send + Sync,
{
    fn on_idle(&self) {
        self()
    }
}

/// Set of listeners, keyed by `Arc` identity.
#[derive(Default)]
pub(crate) struct ListenerSet {
    listeners: Mutex<Vec<Arc<dyn IdleListener>>>,
}

impl ListenerSet {
    /// Returns `false` when this exact listener is already registered.
    pub(crate) fn add(&self, listener: Arc<dyn IdleListener>) -> bool {
        let mut listeners = lock(&self.listeners);
        if listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    pub(crate) fn remove(&self, listener: &Arc<dyn IdleListener>) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Call every listener once, outside the lock (a listener may add work).
    pub(crate) fn notify(&self) {
        let snapshot: Vec<_> = lock(&self.listeners).clone();
        trace!(listeners = snapshot.len(), "pool drained");
        for listener in snapshot {
            listener.on_idle();
        }
    }
}
