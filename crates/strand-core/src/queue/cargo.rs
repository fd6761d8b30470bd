//! Cargo - バッチ単位のワーカー
//!
//! # 設計原則
//! - 1 回の dispatch で最大 `payload` 個の item をまとめて worker に渡す
//! - 同時に走るバッチは最大 `concurrency` 個
//! - 各 item の callback は高々一度だけ呼ばれる
//!
//! # 部分失敗のポリシー
//! バッチは「全 item が報告された」か「バッチ callback が呼ばれた」時点で終わる。
//! - バッチ `Failure(e)`: 未報告の item すべてに `Failure(e)` を配る
//! - バッチ `Success`: 未報告の item には `Failure(FlowError::Unreported)`
//! - 報告済みの item には二度と通知しない
//! - 終了後に届いた item の報告は捨てる

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace, warn};

use super::config::{PoolConfig, validate_limit};
use super::item::WorkItem;
use super::listeners::IdleListener;
use super::state::{PoolPhase, PoolState};
use crate::domain::{Callback, CompletionResult, FlowError, Latch, call_guarded, deliver};
use crate::ports::Scheduler;
use crate::sync::lock;

/// Callback shared by every item of one `add` call.
pub type ItemCallback<R> = Arc<dyn Fn(CompletionResult<R>) + Send + Sync + 'static>;

/// What a cargo worker receives: the batch, each item with its own callback.
pub type Batch<T, R> = Vec<WorkItem<T, Callback<R>>>;

type BatchWorker<T, R> = Box<dyn Fn(Batch<T, R>, Callback<()>) + Send + Sync + 'static>;

struct Inner<T, R> {
    scheduler: Arc<dyn Scheduler>,
    state: PoolState<WorkItem<T, ItemCallback<R>>>,
    payload: AtomicUsize,
    worker: BatchWorker<T, R>,
}

/// Bounded batch worker.
///
/// # 使用例
/// ```ignore
/// let cargo = Cargo::new(scheduler, 5, |batch: Batch<Row, ()>, done: Callback<()>| {
///     insert_rows(batch, done)
/// })?;
/// cargo.add(rows, |result| log(result), false);
/// ```
pub struct Cargo<T, R> {
    inner: Arc<Inner<T, R>>,
}

impl<T, R> Clone for Cargo<T, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, R> Cargo<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// One batch in flight at a time; `payload < 1` is rejected.
    pub fn new<F>(scheduler: Arc<dyn Scheduler>, payload: usize, worker: F) -> Result<Self, FlowError>
    where
        F: Fn(Batch<T, R>, Callback<()>) + Send + Sync + 'static,
    {
        let config = PoolConfig {
            payload,
            ..PoolConfig::default()
        };
        Self::with_config(scheduler, &config, worker)
    }

    pub fn with_config<F>(scheduler: Arc<dyn Scheduler>, config: &PoolConfig, worker: F) -> Result<Self, FlowError>
    where
        F: Fn(Batch<T, R>, Callback<()>) + Send + Sync + 'static,
    {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                scheduler,
                state: PoolState::new(config.concurrency),
                payload: AtomicUsize::new(config.payload),
                worker: Box::new(worker),
            }),
        })
    }

    /// Enqueue `items`, all reporting to `callback`.
    ///
    /// `at_top` puts the whole group in front of the pending items, in the
    /// group's own order. Always accepted.
    pub fn add<C>(&self, items: Vec<T>, callback: C, at_top: bool) -> bool
    where
        C: Fn(CompletionResult<R>) + Send + Sync + 'static,
    {
        if items.is_empty() {
            return true;
        }
        let callback: ItemCallback<R> = Arc::new(callback);
        let count = items.len();
        let group: Vec<_> = items
            .into_iter()
            .map(|payload| WorkItem::new(payload, Arc::clone(&callback)))
            .collect();
        if at_top {
            self.inner.state.push_front_all(group);
        } else {
            self.inner.state.extend_back(group);
        }
        trace!(count, at_top, pending = self.len(), "cargo items queued");
        if self.inner.state.wants_pass() {
            Inner::schedule_pass(&self.inner);
        }
        true
    }

    /// Drop every pending item without calling back. Running batches go on.
    pub fn clear(&self) {
        let dropped = self.inner.state.clear();
        debug!(dropped, "cargo cleared");
    }

    pub fn set_payload(&self, payload: usize) -> Result<(), FlowError> {
        let payload = validate_limit("payload", payload)?;
        self.inner.payload.store(payload, Ordering::SeqCst);
        Ok(())
    }

    pub fn set_concurrency(&self, concurrency: usize) -> Result<(), FlowError> {
        let concurrency = validate_limit("concurrency", concurrency)?;
        let previous = self.inner.state.set_limit(concurrency);
        if concurrency > previous {
            Inner::schedule_pass(&self.inner);
        }
        Ok(())
    }

    pub fn set_paused(&self, paused: bool) {
        if self.inner.state.set_paused(paused) == paused {
            return;
        }
        debug!(paused, pending = self.len(), "cargo pause toggled");
        if !paused {
            Inner::schedule_pass(&self.inner);
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn IdleListener>) -> bool {
        self.inner.state.listeners.add(listener)
    }

    pub fn remove_listener(&self, listener: &Arc<dyn IdleListener>) -> bool {
        self.inner.state.listeners.remove(listener)
    }

    pub fn payload(&self) -> usize {
        self.inner.payload.load(Ordering::SeqCst)
    }

    pub fn concurrency(&self) -> usize {
        self.inner.state.limit()
    }

    /// Batches in flight.
    pub fn running(&self) -> usize {
        self.inner.state.running()
    }

    pub fn len(&self) -> usize {
        self.inner.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_paused(&self) -> bool {
        self.inner.state.is_paused()
    }

    /// No batch running and nothing pending.
    pub fn is_idle(&self) -> bool {
        self.inner.state.is_idle()
    }

    pub fn phase(&self) -> PoolPhase {
        self.inner.state.phase()
    }
}

impl<T, R> Inner<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    fn schedule_pass(this: &Arc<Self>) {
        let pool = Arc::clone(this);
        this.scheduler.run_soon(Box::new(move || Self::pass(&pool)));
    }

    fn pass(this: &Arc<Self>) {
        let payload = this.payload.load(Ordering::SeqCst);
        while let Some((batch, drained)) = this.state.take_batch(payload) {
            trace!(size = batch.len(), running = this.state.running(), "dispatching batch");
            let pool = Arc::clone(this);
            this.scheduler.run_soon(Box::new(move || Self::run(pool, batch)));
            if drained {
                this.state.listeners.notify();
            }
        }
    }

    fn run(this: Arc<Self>, batch: Vec<WorkItem<T, ItemCallback<R>>>) {
        let pool = Arc::clone(&this);
        let end = Latch::<()>::new(Box::new(move |_: CompletionResult<()>| {
            pool.state.finish_one();
            if pool.state.wants_pass() {
                Self::schedule_pass(&pool);
            }
        }));

        let (payloads, slots): (Vec<T>, Vec<Option<ItemCallback<R>>>) = batch
            .into_iter()
            .map(|item| {
                let (payload, callback) = item.into_parts();
                (payload, Some(callback))
            })
            .unzip();
        let tracker = Arc::new(BatchTracker {
            slots: Mutex::new(slots),
            end,
        });

        let items: Batch<T, R> = payloads
            .into_iter()
            .enumerate()
            .map(|(index, payload)| {
                let tracker = Arc::clone(&tracker);
                let report: Callback<R> = Box::new(move |result| tracker.report(index, result));
                WorkItem::new(payload, report)
            })
            .collect();

        let finish = Arc::clone(&tracker);
        call_guarded(
            |done| (this.worker)(items, done),
            Box::new(move |result: CompletionResult<()>| finish.finish_batch(result)),
        );
    }
}

/// Per-batch bookkeeping: which items still owe a report.
struct BatchTracker<R> {
    /// `None` once the item was reported (or the batch ended).
    slots: Mutex<Vec<Option<ItemCallback<R>>>>,
    end: Latch<()>,
}

impl<R: Send + 'static> BatchTracker<R> {
    fn report(&self, index: usize, result: CompletionResult<R>) {
        let (callback, outstanding) = {
            let mut slots = lock(&self.slots);
            let callback = slots.get_mut(index).and_then(Option::take);
            (callback, slots.iter().filter(|s| s.is_some()).count())
        };
        let Some(callback) = callback else {
            trace!(index, "item reported after its batch ended; ignored");
            return;
        };
        // release the batch slot before handing the result to the caller
        if outstanding == 0 {
            self.end.fire(CompletionResult::Success(()));
        }
        deliver(|result| callback(result), result);
    }

    fn finish_batch(&self, result: CompletionResult<()>) {
        let unreported: Vec<ItemCallback<R>> = lock(&self.slots)
            .iter_mut()
            .filter_map(Option::take)
            .collect();
        if !unreported.is_empty() {
            let cause = match result {
                CompletionResult::Success(()) => FlowError::Unreported,
                CompletionResult::Failure(cause) => cause,
            };
            warn!(unreported = unreported.len(), error = %cause, "batch ended with unreported items");
            self.end.fire(CompletionResult::Success(()));
            for callback in unreported {
                deliver(|result| callback(result), CompletionResult::Failure(cause.clone()));
            }
            return;
        }
        self.end.fire(CompletionResult::Success(()));
    }
}
