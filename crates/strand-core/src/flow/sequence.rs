//! Sequential combinators: series, waterfall, seq, map_series.
//!
//! Task n+1 never starts before task n's callback fired. The first step runs
//! synchronously; every later step is posted to the scheduler line.

use std::sync::Arc;
use std::vec;

use tracing::debug;

use super::Flow;
use crate::domain::{Callback, CompletionResult, Task, Transform, call_guarded, task};
use crate::ports::Scheduler;

impl Flow {
    /// Run `tasks` one at a time, collecting their values in task order.
    ///
    /// Stops at the first failure, which is forwarded unchanged. An empty list
    /// succeeds immediately with an empty vector.
    pub fn series<T: Send + 'static>(&self, tasks: Vec<Task<T>>, done: Callback<Vec<T>>) {
        let results = Vec::with_capacity(tasks.len());
        series_step(Arc::clone(&self.scheduler), tasks.into_iter(), results, done);
    }

    /// Thread a value through `stages`: the first stage receives `None`, each
    /// later one `Some(previous value)`. The last value (or `None` for no
    /// stages) is the result.
    pub fn waterfall<T: Send + 'static>(
        &self,
        stages: Vec<Transform<Option<T>, T>>,
        done: Callback<Option<T>>,
    ) {
        let stages: Vec<Transform<Option<T>, Option<T>>> = stages
            .into_iter()
            .map(|stage| -> Transform<Option<T>, Option<T>> {
                Box::new(move |input: Option<T>, cb: Callback<Option<T>>| {
                    stage(
                        input,
                        Box::new(move |result: CompletionResult<T>| cb(result.map(Some))),
                    )
                })
            })
            .collect();
        chain_step(Arc::clone(&self.scheduler), stages.into_iter(), None, done);
    }

    /// Compose `stages` into a single transform, each consuming the previous
    /// stage's output. A failure at any stage skips the remaining ones.
    pub fn seq<T: Send + 'static>(&self, stages: Vec<Transform<T, T>>) -> Transform<T, T> {
        let scheduler = Arc::clone(&self.scheduler);
        Box::new(move |input: T, done: Callback<T>| {
            chain_step(scheduler, stages.into_iter(), input, done)
        })
    }

    /// Sequential map: `f` is applied to one item at a time, in order.
    pub fn map_series<I, O, F>(&self, items: Vec<I>, f: F, done: Callback<Vec<O>>)
    where
        I: Send + 'static,
        O: Send + 'static,
        F: Fn(I, Callback<O>) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let tasks = items
            .into_iter()
            .map(|item| {
                let f = Arc::clone(&f);
                task(move |cb| f(item, cb))
            })
            .collect();
        self.series(tasks, done);
    }
}

fn series_step<T: Send + 'static>(
    scheduler: Arc<dyn Scheduler>,
    mut remaining: vec::IntoIter<Task<T>>,
    mut results: Vec<T>,
    done: Callback<Vec<T>>,
) {
    let Some(next) = remaining.next() else {
        done(CompletionResult::Success(results));
        return;
    };

    call_guarded(
        next,
        Box::new(move |result: CompletionResult<T>| match result {
            CompletionResult::Success(value) => {
                results.push(value);
                let line = Arc::clone(&scheduler);
                line.run_soon(Box::new(move || {
                    series_step(scheduler, remaining, results, done)
                }));
            }
            CompletionResult::Failure(cause) => {
                debug!(completed = results.len(), error = %cause, "series stopped");
                done(CompletionResult::Failure(cause));
            }
        }),
    );
}

fn chain_step<T: Send + 'static>(
    scheduler: Arc<dyn Scheduler>,
    mut remaining: vec::IntoIter<Transform<T, T>>,
    input: T,
    done: Callback<T>,
) {
    let Some(stage) = remaining.next() else {
        done(CompletionResult::Success(input));
        return;
    };

    call_guarded(
        move |cb| stage(input, cb),
        Box::new(move |result: CompletionResult<T>| match result {
            CompletionResult::Success(value) => {
                let line = Arc::clone(&scheduler);
                line.run_soon(Box::new(move || chain_step(scheduler, remaining, value, done)));
            }
            CompletionResult::Failure(cause) => {
                debug!(skipped = remaining.len(), error = %cause, "chain stopped");
                done(CompletionResult::Failure(cause));
            }
        }),
    );
}
