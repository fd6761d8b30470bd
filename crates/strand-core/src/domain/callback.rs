//! Callback / Task / Transform と Latch
//!
//! # 設計原則
//! - callback は必ず一度だけ呼ばれる（Latch で保証）
//! - task の panic は同じ Failure チャネルに変換される
//!
//! A combinator never trusts the tasks it drives: a task may call back twice,
//! call back and then panic, or panic without calling back at all. Every
//! boundary therefore goes through [`call_guarded`], which wraps the
//! downstream callback in a [`Latch`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tracing::{error, trace, warn};

use super::errors::FlowError;
use super::result::CompletionResult;
use crate::sync::lock;

/// Completion callback.
pub type Callback<T> = Box<dyn FnOnce(CompletionResult<T>) + Send + 'static>;

/// Single-use unit of work taking a completion callback.
pub type Task<T> = Box<dyn FnOnce(Callback<T>) + Send + 'static>;

/// Single-use unit of work taking an input value and a completion callback.
pub type Transform<I, O> = Box<dyn FnOnce(I, Callback<O>) + Send + 'static>;

/// Box a closure as a [`Task`].
pub fn task<T, F>(f: F) -> Task<T>
where
    F: FnOnce(Callback<T>) + Send + 'static,
{
    Box::new(f)
}

/// Box a closure as a [`Transform`].
pub fn transform<I, O, F>(f: F) -> Transform<I, O>
where
    F: FnOnce(I, Callback<O>) + Send + 'static,
{
    Box::new(f)
}

/// Box a closure as a [`Callback`].
pub fn callback<T, F>(f: F) -> Callback<T>
where
    F: FnOnce(CompletionResult<T>) + Send + 'static,
{
    Box::new(f)
}

/// One-shot guarded callback.
///
/// Clones share the same slot: whichever clone fires first delivers the
/// result, every later `fire` is ignored and returns `false`.
pub struct Latch<T> {
    slot: Arc<Mutex<Option<Callback<T>>>>,
}

impl<T> Clone for Latch<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Send + 'static> Latch<T> {
    pub fn new(callback: Callback<T>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(callback))),
        }
    }

    /// Deliver `result` if nobody has fired yet. Returns whether this call won.
    pub fn fire(&self, result: CompletionResult<T>) -> bool {
        // take under the lock, invoke outside it: the callback may re-enter
        let callback = lock(&self.slot).take();
        match callback {
            Some(callback) => {
                callback(result);
                true
            }
            None => {
                trace!(failure = result.is_failure(), "latch already fired; result ignored");
                false
            }
        }
    }

    pub fn is_fired(&self) -> bool {
        lock(&self.slot).is_none()
    }

    /// A plain callback that fires this latch.
    pub fn callback(&self) -> Callback<T> {
        let latch = self.clone();
        Box::new(move |result| {
            latch.fire(result);
        })
    }
}

/// Invoke `f` with a latched version of `callback`.
///
/// - a second invocation of the callback by `f` is ignored;
/// - a panic inside `f` becomes `Failure(FlowError::Panicked)` unless the
///   callback already fired.
///
/// # Panics in `callback`
///
/// When `f` calls back synchronously, `callback` runs inside the guarded
/// region. A panic raised by `callback` itself is then indistinguishable from
/// a late panic in `f`: it is caught, logged at `error` level and dropped.
/// It is never redelivered as a `Failure`, and never propagates to the
/// caller of `call_guarded`.
pub fn call_guarded<T, F>(f: F, callback: Callback<T>)
where
    T: Send + 'static,
    F: FnOnce(Callback<T>),
{
    let latch = Latch::new(callback);
    let guarded = latch.callback();
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || f(guarded))) {
        let cause = FlowError::from_panic(payload.as_ref());
        if latch.is_fired() {
            error!(error = %cause, "panic after completion was delivered; dropped");
            return;
        }
        warn!(error = %cause, "task panicked");
        latch.fire(CompletionResult::Failure(cause));
    }
}

/// Hand `result` to a caller-owned completion callback, containing any panic
/// it raises. Returns `false` if the callback panicked.
///
/// Pools call this only after their own bookkeeping is done.
pub(crate) fn deliver<T, F>(callback: F, result: CompletionResult<T>) -> bool
where
    F: FnOnce(CompletionResult<T>),
{
    match panic::catch_unwind(AssertUnwindSafe(move || callback(result))) {
        Ok(()) => true,
        Err(payload) => {
            let cause = FlowError::from_panic(payload.as_ref());
            error!(error = %cause, "completion callback panicked");
            false
        }
    }
}
