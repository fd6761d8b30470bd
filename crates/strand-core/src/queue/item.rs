//! Work item: payload + callback.

/// A payload paired with the callback that receives its outcome.
///
/// Owned by the pool from `add` until dispatch, then moved into the worker.
/// `C` is `Callback<R>` when handed to a worker; cargo keeps a shared
/// callback while the item is pending.
pub struct WorkItem<T, C> {
    pub payload: T,
    pub callback: C,
}

impl<T, C> WorkItem<T, C> {
    pub fn new(payload: T, callback: C) -> Self {
        Self { payload, callback }
    }

    pub fn into_parts(self) -> (T, C) {
        (self.payload, self.callback)
    }
}
