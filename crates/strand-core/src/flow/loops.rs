//! Conditional loops: whilst, do_whilst, until, forever.
//!
//! Each loop is a trampoline: an iteration finishing successfully posts the
//! next one to the scheduler line instead of recursing, so stack depth stays
//! flat no matter how many iterations complete synchronously.

use std::convert::Infallible;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::debug;

use super::Flow;
use crate::domain::{Callback, CompletionResult, FlowError, call_guarded};
use crate::ports::Scheduler;

/// Evaluate a synchronous predicate, turning a panic into a failure.
fn check<P: Fn() -> bool>(predicate: &P) -> Result<bool, FlowError> {
    panic::catch_unwind(AssertUnwindSafe(predicate))
        .map_err(|payload| FlowError::from_panic(payload.as_ref()))
}

struct Whilst<P, B> {
    scheduler: Arc<dyn Scheduler>,
    test: P,
    body: B,
}

impl<P, B> Whilst<P, B>
where
    P: Fn() -> bool + Send + Sync + 'static,
    B: Fn(Callback<()>) + Send + Sync + 'static,
{
    fn iterate(self: Arc<Self>, done: Callback<()>) {
        match check(&self.test) {
            Ok(false) => done(CompletionResult::Success(())),
            Ok(true) => self.run_body(done, Self::iterate),
            Err(cause) => done(CompletionResult::Failure(cause)),
        }
    }

    /// `do_whilst`: body first, test afterwards.
    fn iterate_post(self: Arc<Self>, done: Callback<()>) {
        self.run_body(done, |this, done| match check(&this.test) {
            Ok(true) => this.iterate_post(done),
            Ok(false) => done(CompletionResult::Success(())),
            Err(cause) => done(CompletionResult::Failure(cause)),
        });
    }

    fn run_body(
        self: Arc<Self>,
        done: Callback<()>,
        next: fn(Arc<Self>, Callback<()>),
    ) {
        let this = Arc::clone(&self);
        call_guarded(
            |cb| (self.body)(cb),
            Box::new(move |result: CompletionResult<()>| match result {
                CompletionResult::Success(()) => {
                    let line = Arc::clone(&this.scheduler);
                    line.run_soon(Box::new(move || next(this, done)));
                }
                CompletionResult::Failure(cause) => {
                    debug!(error = %cause, "loop body failed");
                    done(CompletionResult::Failure(cause));
                }
            }),
        );
    }
}

struct Until<B, P> {
    scheduler: Arc<dyn Scheduler>,
    body: B,
    test: P,
}

impl<B, P> Until<B, P>
where
    B: Fn(Callback<()>) + Send + Sync + 'static,
    P: Fn(Callback<bool>) + Send + Sync + 'static,
{
    fn iterate(self: Arc<Self>, done: Callback<()>) {
        let this = Arc::clone(&self);
        call_guarded(
            |cb| (self.body)(cb),
            Box::new(move |result: CompletionResult<()>| match result {
                CompletionResult::Success(()) => this.evaluate(done),
                CompletionResult::Failure(cause) => {
                    debug!(error = %cause, "loop body failed");
                    done(CompletionResult::Failure(cause));
                }
            }),
        );
    }

    fn evaluate(self: Arc<Self>, done: Callback<()>) {
        let this = Arc::clone(&self);
        call_guarded(
            |cb| (self.test)(cb),
            Box::new(move |verdict: CompletionResult<bool>| match verdict {
                CompletionResult::Success(true) => done(CompletionResult::Success(())),
                CompletionResult::Success(false) => {
                    let line = Arc::clone(&this.scheduler);
                    line.run_soon(Box::new(move || this.iterate(done)));
                }
                CompletionResult::Failure(cause) => done(CompletionResult::Failure(cause)),
            }),
        );
    }
}

struct Forever<T, F> {
    scheduler: Arc<dyn Scheduler>,
    task: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> Forever<T, F>
where
    T: Send + 'static,
    F: Fn(Callback<T>) + Send + Sync + 'static,
{
    fn iterate(self: Arc<Self>, iteration: u64, done: Callback<Infallible>) {
        let this = Arc::clone(&self);
        call_guarded(
            |cb| (self.task)(cb),
            Box::new(move |result: CompletionResult<T>| match result {
                CompletionResult::Success(_) => {
                    let line = Arc::clone(&this.scheduler);
                    line.run_soon(Box::new(move || this.iterate(iteration + 1, done)));
                }
                CompletionResult::Failure(cause) => {
                    debug!(iteration, error = %cause, "forever stopped");
                    done(CompletionResult::Failure(cause));
                }
            }),
        );
    }
}

impl Flow {
    /// Run `body` while `test` holds; the test is checked before every
    /// iteration, so the body may never run.
    pub fn whilst<P, B>(&self, test: P, body: B, done: Callback<()>)
    where
        P: Fn() -> bool + Send + Sync + 'static,
        B: Fn(Callback<()>) + Send + Sync + 'static,
    {
        let state = Arc::new(Whilst {
            scheduler: Arc::clone(&self.scheduler),
            test,
            body,
        });
        state.iterate(done);
    }

    /// Run `body` at least once, then again while `test` holds.
    pub fn do_whilst<B, P>(&self, body: B, test: P, done: Callback<()>)
    where
        B: Fn(Callback<()>) + Send + Sync + 'static,
        P: Fn() -> bool + Send + Sync + 'static,
    {
        let state = Arc::new(Whilst {
            scheduler: Arc::clone(&self.scheduler),
            test,
            body,
        });
        state.iterate_post(done);
    }

    /// Run `body`, then ask the asynchronous `test`; stop once it yields
    /// `true`. A failing test stops the loop with that failure.
    pub fn until<B, P>(&self, body: B, test: P, done: Callback<()>)
    where
        B: Fn(Callback<()>) + Send + Sync + 'static,
        P: Fn(Callback<bool>) + Send + Sync + 'static,
    {
        let state = Arc::new(Until {
            scheduler: Arc::clone(&self.scheduler),
            body,
            test,
        });
        state.iterate(done);
    }

    /// Re-run `task` until it fails, then forward the failure.
    ///
    /// `done` can only ever receive `Failure`.
    pub fn forever<T, F>(&self, task: F, done: Callback<Infallible>)
    where
        T: Send + 'static,
        F: Fn(Callback<T>) + Send + Sync + 'static,
    {
        let state = Arc::new(Forever {
            scheduler: Arc::clone(&self.scheduler),
            task,
            _marker: PhantomData,
        });
        state.iterate(1, done);
    }
}
