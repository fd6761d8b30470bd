//! Timeouts and blocking work.
//!
//! Neither combinator can stop the work it guards: a task that loses against
//! its timer keeps running and its late result is dropped by the latch.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::Flow;
use crate::domain::{BoxError, Callback, CompletionResult, FlowError, Latch, Task, call_guarded, task};

impl Flow {
    /// Deliver `task`'s result, or `Failure(FlowError::TimedOut(limit))` when
    /// the task has not called back within `limit`.
    pub fn timeout<T: Send + 'static>(&self, task: Task<T>, limit: Duration, done: Callback<T>) {
        let latch = Latch::new(done);

        let on_timer = latch.clone();
        let timer = self.scheduler.run_after_delay(
            limit,
            Box::new(move || {
                if on_timer.fire(CompletionResult::Failure(FlowError::TimedOut(limit))) {
                    warn!(?limit, "task timed out");
                }
            }),
        );

        let scheduler = Arc::clone(&self.scheduler);
        self.scheduler.run_soon(Box::new(move || {
            call_guarded(
                task,
                Box::new(move |result: CompletionResult<T>| {
                    if latch.fire(result) {
                        scheduler.cancel(timer);
                    } else {
                        debug!(?limit, "late result after timeout discarded");
                    }
                }),
            );
        }));
    }

    /// Run a blocking closure off the line and deliver its outcome on it.
    ///
    /// `Err(e)` becomes `FlowError::Failed(e)`; a panic becomes
    /// `FlowError::Panicked`.
    pub fn blocking<T, E, W>(&self, work: W, done: Callback<T>)
    where
        T: Send + 'static,
        E: Into<BoxError>,
        W: FnOnce() -> Result<T, E> + Send + 'static,
    {
        self.scheduler.run_off_line(Box::new(move || {
            let outcome = match panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(Ok(value)) => CompletionResult::Success(value),
                Ok(Err(err)) => CompletionResult::Failure(FlowError::failed(err)),
                Err(payload) => {
                    let cause = FlowError::from_panic(payload.as_ref());
                    warn!(error = %cause, "blocking work panicked");
                    CompletionResult::Failure(cause)
                }
            };
            Box::new(move || done(outcome))
        }));
    }

    /// [`blocking`](Self::blocking) raced against a timer of `limit`.
    pub fn timeout_blocking<T, E, W>(&self, work: W, limit: Duration, done: Callback<T>)
    where
        T: Send + 'static,
        E: Into<BoxError>,
        W: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let flow = self.clone();
        self.timeout(task(move |cb| flow.blocking(work, cb)), limit, done);
    }
}
