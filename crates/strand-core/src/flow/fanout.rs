//! Fan-out combinators: parallel, each, times, map, race.
//!
//! Tasks are started through the scheduler in submission order; nothing is
//! promised about completion order. Result slots are positional.

use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use super::Flow;
use crate::domain::{Callback, CompletionResult, Latch, Task, Transform, call_guarded, task};
use crate::sync::lock;

/// Positional result collector shared by the tasks of one fan-out.
struct Gather<T> {
    slots: Mutex<GatherSlots<T>>,
    done: Latch<Vec<T>>,
}

struct GatherSlots<T> {
    values: Vec<Option<T>>,
    remaining: usize,
}

impl<T: Send + 'static> Gather<T> {
    fn new(len: usize, done: Callback<Vec<T>>) -> Self {
        Self {
            slots: Mutex::new(GatherSlots {
                values: (0..len).map(|_| None).collect(),
                remaining: len,
            }),
            done: Latch::new(done),
        }
    }

    fn is_settled(&self) -> bool {
        self.done.is_fired()
    }

    fn complete(&self, slot: usize, result: CompletionResult<T>) {
        match result {
            CompletionResult::Success(value) => {
                let finished = {
                    let mut slots = lock(&self.slots);
                    slots.values[slot] = Some(value);
                    slots.remaining -= 1;
                    (slots.remaining == 0).then(|| std::mem::take(&mut slots.values))
                };
                if let Some(values) = finished {
                    self.done
                        .fire(CompletionResult::Success(values.into_iter().flatten().collect()));
                }
            }
            CompletionResult::Failure(cause) => {
                debug!(slot, error = %cause, "fan-out failed");
                self.done.fire(CompletionResult::Failure(cause));
            }
        }
    }
}

impl Flow {
    /// Start every task; collect successes positionally.
    ///
    /// The first failure is delivered once; sibling results arriving later
    /// are ignored and tasks not yet started are skipped. An empty list
    /// succeeds immediately.
    pub fn parallel<T: Send + 'static>(&self, tasks: Vec<Task<T>>, done: Callback<Vec<T>>) {
        if tasks.is_empty() {
            done(CompletionResult::Success(Vec::new()));
            return;
        }

        let gather = Arc::new(Gather::new(tasks.len(), done));
        for (slot, task) in tasks.into_iter().enumerate() {
            let gather = Arc::clone(&gather);
            self.scheduler.run_soon(Box::new(move || {
                if gather.is_settled() {
                    trace!(slot, "fan-out already settled; task not started");
                    return;
                }
                let sink = Arc::clone(&gather);
                call_guarded(
                    task,
                    Box::new(move |result: CompletionResult<T>| sink.complete(slot, result)),
                );
            }));
        }
    }

    /// Apply the same argument to every function, in parallel.
    pub fn each<A, R>(&self, functions: Vec<Transform<A, R>>, arg: A, done: Callback<()>)
    where
        A: Clone + Send + 'static,
        R: Send + 'static,
    {
        let tasks = functions
            .into_iter()
            .map(|f| {
                let arg = arg.clone();
                task(move |cb: Callback<()>| {
                    f(
                        arg,
                        Box::new(move |result: CompletionResult<R>| cb(result.map(|_| ()))),
                    )
                })
            })
            .collect();
        self.parallel(tasks, Box::new(move |result: CompletionResult<Vec<()>>| done(result.map(|_| ()))));
    }

    /// `parallel` over `n` invocations of `f`, each receiving its index.
    pub fn times<T, F>(&self, n: usize, f: F, done: Callback<Vec<T>>)
    where
        T: Send + 'static,
        F: Fn(usize, Callback<T>) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let tasks = (0..n)
            .map(|index| {
                let f = Arc::clone(&f);
                task(move |cb| f(index, cb))
            })
            .collect();
        self.parallel(tasks, done);
    }

    /// Parallel map of `f` over `items`, results in item order.
    pub fn map<I, O, F>(&self, items: Vec<I>, f: F, done: Callback<Vec<O>>)
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
        self.parallel(tasks, done);
    }

    /// Start every task; the first one to call back decides the outcome.
    ///
    /// Losers keep running to completion, their results are discarded.
    /// An empty list succeeds immediately with `None`.
    pub fn race<T: Send + 'static>(&self, tasks: Vec<Task<T>>, done: Callback<Option<T>>) {
        if tasks.is_empty() {
            done(CompletionResult::Success(None));
            return;
        }

        let latch = Latch::new(done);
        for (index, task) in tasks.into_iter().enumerate() {
            let latch = latch.clone();
            self.scheduler.run_soon(Box::new(move || {
                call_guarded(
                    task,
                    Box::new(move |result: CompletionResult<T>| {
                        if latch.fire(result.map(Some)) {
                            trace!(index, "race won");
                        }
                    }),
                );
            }));
        }
    }
}
