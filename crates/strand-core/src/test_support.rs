//! Test helpers shared by the unit tests of every module.

use std::sync::{Arc, Mutex};

use crate::domain::{Callback, CompletionResult, FlowError};
use crate::flow::Flow;
use crate::impls::ManualScheduler;
use crate::sync::lock;

/// A `Flow` driven by a fresh deterministic scheduler.
pub(crate) fn manual_flow() -> (Flow, Arc<ManualScheduler>) {
    let scheduler = Arc::new(ManualScheduler::new());
    (Flow::new(scheduler.clone()), scheduler)
}

/// Records every result delivered to the callback handed out by [`capture`].
pub(crate) struct Captured<T> {
    results: Arc<Mutex<Vec<CompletionResult<T>>>>,
}

impl<T> Clone for Captured<T> {
    fn clone(&self) -> Self {
        Self {
            results: Arc::clone(&self.results),
        }
    }
}

impl<T: Clone> Captured<T> {
    pub(crate) fn len(&self) -> usize {
        lock(&self.results).len()
    }

    pub(crate) fn values(&self) -> Vec<T> {
        lock(&self.results)
            .iter()
            .filter_map(|r| r.value().cloned())
            .collect()
    }

    pub(crate) fn causes(&self) -> Vec<FlowError> {
        lock(&self.results)
            .iter()
            .filter_map(|r| r.cause().cloned())
            .collect()
    }

    pub(crate) fn failures(&self) -> usize {
        self.causes().len()
    }

    pub(crate) fn take(&self) -> Vec<CompletionResult<T>> {
        std::mem::take(&mut *lock(&self.results))
    }
}

pub(crate) fn capture<T: Send + 'static>() -> (Callback<T>, Captured<T>) {
    let captured = Captured {
        results: Arc::new(Mutex::new(Vec::new())),
    };
    let sink = captured.clone();
    let cb: Callback<T> = Box::new(move |result| lock(&sink.results).push(result));
    (cb, captured)
}

/// Shared, ordered event log for asserting interleavings.
#[derive(Clone, Default)]
pub(crate) struct Journal {
    events: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub(crate) fn record(&self, event: impl Into<String>) {
        lock(&self.events).push(event.into());
    }

    pub(crate) fn events(&self) -> Vec<String> {
        lock(&self.events).clone()
    }
}
