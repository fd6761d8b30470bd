//! WorkQueue - 並行数制限付き FIFO ワーカーキュー
//!
//! # 設計原則
//! - dispatch は FIFO（完了順は concurrency > 1 のとき不定）
//! - running は concurrency を超えない
//! - pending が空になるたびに idle listener へ一度だけ通知
//!
//! Dispatch passes run on the scheduler line. Completions may arrive from
//! any thread; they only decrement `running` and post a new pass.

use std::sync::Arc;

use tracing::{debug, trace};

use super::config::{PoolConfig, validate_limit};
use super::item::WorkItem;
use super::listeners::IdleListener;
use super::state::{PoolPhase, PoolState};
use crate::domain::{Callback, CompletionResult, FlowError, call_guarded, deliver};
use crate::ports::Scheduler;

type Worker<T, R> = Box<dyn Fn(T, Callback<R>) + Send + Sync + 'static>;

struct Inner<T, R> {
    scheduler: Arc<dyn Scheduler>,
    state: PoolState<WorkItem<T, Callback<R>>>,
    worker: Worker<T, R>,
}

/// Bounded-concurrency FIFO queue feeding one worker function.
///
/// # 使用例
/// ```ignore
/// let queue = WorkQueue::new(scheduler, 2, |url: String, cb: Callback<usize>| fetch(url, cb))?;
/// queue.add("https://example.com".into(), Box::new(|result| println!("{result:?}")));
/// ```
///
/// Clones share the same queue.
pub struct WorkQueue<T, R> {
    inner: Arc<Inner<T, R>>,
}

impl<T, R> Clone for WorkQueue<T, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, R> WorkQueue<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// `concurrency < 1` is rejected.
    pub fn new<F>(scheduler: Arc<dyn Scheduler>, concurrency: usize, worker: F) -> Result<Self, FlowError>
    where
        F: Fn(T, Callback<R>) + Send + Sync + 'static,
    {
        let concurrency = validate_limit("concurrency", concurrency)?;
        Ok(Self {
            inner: Arc::new(Inner {
                scheduler,
                state: PoolState::new(concurrency),
                worker: Box::new(worker),
            }),
        })
    }

    /// Build from a validated [`PoolConfig`] (its `payload` is ignored).
    pub fn with_config<F>(scheduler: Arc<dyn Scheduler>, config: &PoolConfig, worker: F) -> Result<Self, FlowError>
    where
        F: Fn(T, Callback<R>) + Send + Sync + 'static,
    {
        config.validate()?;
        Self::new(scheduler, config.concurrency, worker)
    }

    /// Append `payload` to the queue. Always accepted.
    pub fn add(&self, payload: T, callback: Callback<R>) -> bool {
        self.inner.state.push_back(WorkItem::new(payload, callback));
        trace!(pending = self.len(), running = self.running(), "work item queued");
        if self.inner.state.wants_pass() {
            Inner::schedule_pass(&self.inner);
        }
        true
    }

    /// Change the limit. Raising it may start queued work on the next pass;
    /// lowering it never interrupts running work.
    pub fn set_concurrency(&self, concurrency: usize) -> Result<(), FlowError> {
        let concurrency = validate_limit("concurrency", concurrency)?;
        let previous = self.inner.state.set_limit(concurrency);
        debug!(previous, concurrency, "queue concurrency changed");
        if concurrency > previous {
            Inner::schedule_pass(&self.inner);
        }
        Ok(())
    }

    pub fn set_paused(&self, paused: bool) {
        let was = self.inner.state.set_paused(paused);
        if was == paused {
            return;
        }
        debug!(paused, pending = self.len(), "queue pause toggled");
        if !paused {
            Inner::schedule_pass(&self.inner);
        }
    }

    pub fn pause(&self) {
        self.set_paused(true);
    }

    pub fn resume(&self) {
        self.set_paused(false);
    }

    /// Register an idle listener. Returns `false` if it is already registered.
    pub fn add_listener(&self, listener: Arc<dyn IdleListener>) -> bool {
        self.inner.state.listeners.add(listener)
    }

    pub fn remove_listener(&self, listener: &Arc<dyn IdleListener>) -> bool {
        self.inner.state.listeners.remove(listener)
    }

    pub fn running(&self) -> usize {
        self.inner.state.running()
    }

    /// Pending (not yet dispatched) items.
    pub fn len(&self) -> usize {
        self.inner.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn concurrency(&self) -> usize {
        self.inner.state.limit()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.state.is_paused()
    }

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
        while let Some((item, drained)) = this.state.take_next() {
            trace!(running = this.state.running(), "dispatching work item");
            let pool = Arc::clone(this);
            this.scheduler.run_soon(Box::new(move || Self::run(pool, item)));
            if drained {
                this.state.listeners.notify();
            }
        }
    }

    fn run(this: Arc<Self>, item: WorkItem<T, Callback<R>>) {
        let (payload, callback) = item.into_parts();
        let pool = Arc::clone(&this);
        call_guarded(
            |cb| (this.worker)(payload, cb),
            Box::new(move |result: CompletionResult<R>| {
                // settle the pool first: the caller's callback may panic
                pool.state.finish_one();
                if pool.state.wants_pass() {
                    Self::schedule_pass(&pool);
                }
                deliver(callback, result);
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use rstest::rstest;

    use super::*;
    use crate::impls::{ManualScheduler, TokioScheduler};
    use crate::sync::lock;
    use crate::test_support::{Journal, capture};

    /// Worker that journals `start:n`, completes `delay_ms` later with `n * 10`
    /// and tracks the peak number of items in flight.
    fn delayed_worker(
        scheduler: &Arc<ManualScheduler>,
        journal: &Journal,
        delay_ms: u64,
        peak: &Arc<(AtomicUsize, AtomicUsize)>,
    ) -> impl Fn(u32, Callback<u32>) + Send + Sync + 'static {
        let line: Arc<dyn Scheduler> = scheduler.clone();
        let journal = journal.clone();
        let peak = Arc::clone(peak);
        move |n, cb| {
            journal.record(format!("start:{n}"));
            let now = peak.0.fetch_add(1, Ordering::SeqCst) + 1;
            peak.1.fetch_max(now, Ordering::SeqCst);
            let journal = journal.clone();
            let peak = Arc::clone(&peak);
            line.run_after_delay(
                Duration::from_millis(delay_ms),
                Box::new(move || {
                    peak.0.fetch_sub(1, Ordering::SeqCst);
                    journal.record(format!("end:{n}"));
                    cb(CompletionResult::success(n * 10));
                }),
            );
        }
    }

    fn peak_tracker() -> Arc<(AtomicUsize, AtomicUsize)> {
        Arc::new((AtomicUsize::new(0), AtomicUsize::new(0)))
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let scheduler = Arc::new(ManualScheduler::new());
        let result = WorkQueue::new(scheduler, 0, |_: (), cb: Callback<()>| cb(CompletionResult::success(())));
        assert!(matches!(result, Err(FlowError::InvalidArgument(_))));
    }

    #[test]
    fn concurrency_one_runs_strictly_one_after_another() {
        let scheduler = Arc::new(ManualScheduler::new());
        let journal = Journal::default();
        let peak = peak_tracker();
        let queue = WorkQueue::new(
            scheduler.clone(),
            1,
            delayed_worker(&scheduler, &journal, 10, &peak),
        )
        .unwrap();

        let (first, a) = capture();
        let (second, b) = capture();
        assert!(queue.add(1, first));
        assert!(queue.add(2, second));

        scheduler.run_until_idle();
        assert_eq!(journal.events(), vec!["start:1"]);
        assert_eq!(queue.running(), 1);
        assert_eq!(queue.len(), 1);

        scheduler.advance(Duration::from_millis(10));
        assert_eq!(journal.events(), vec!["start:1", "end:1", "start:2"]);
        assert_eq!(a.values(), vec![10]);

        scheduler.advance(Duration::from_millis(10));
        assert_eq!(b.values(), vec![20]);
        assert!(queue.is_idle());
        assert_eq!(peak.1.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(8)]
    fn running_never_exceeds_concurrency(#[case] concurrency: usize) {
        let scheduler = Arc::new(ManualScheduler::new());
        let journal = Journal::default();
        let peak = peak_tracker();
        let queue = WorkQueue::new(
            scheduler.clone(),
            concurrency,
            delayed_worker(&scheduler, &journal, 7, &peak),
        )
        .unwrap();

        let results = Arc::new(Mutex::new(Vec::new()));
        for n in 0..20 {
            let results = Arc::clone(&results);
            queue.add(n, Box::new(move |r| lock(&results).push(r.into_result().ok())));
        }

        while !queue.is_idle() {
            scheduler.run_until_idle();
            assert!(queue.running() <= concurrency);
            scheduler.advance(Duration::from_millis(1));
        }

        assert_eq!(lock(&results).len(), 20);
        assert_eq!(peak.1.load(Ordering::SeqCst), concurrency.min(20));
        let starts: Vec<_> = journal
            .events()
            .into_iter()
            .filter(|e| e.starts_with("start:"))
            .collect();
        let expected: Vec<_> = (0..20).map(|n| format!("start:{n}")).collect();
        assert_eq!(starts, expected);
    }

    #[test]
    fn listener_fires_once_per_drain() {
        let scheduler = Arc::new(ManualScheduler::new());
        let queue = WorkQueue::new(scheduler.clone(), 2, |n: u32, cb: Callback<u32>| {
            cb(CompletionResult::success(n))
        })
        .unwrap();
        let drains = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&drains);
        let listener: Arc<dyn IdleListener> = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(queue.add_listener(Arc::clone(&listener)));
        assert!(!queue.add_listener(Arc::clone(&listener)));

        for n in 0..5 {
            let (cb, _) = capture();
            queue.add(n, cb);
        }
        scheduler.run_until_idle();
        assert_eq!(drains.load(Ordering::SeqCst), 1);

        let (cb, _) = capture();
        queue.add(99, cb);
        scheduler.run_until_idle();
        assert_eq!(drains.load(Ordering::SeqCst), 2);

        assert!(queue.remove_listener(&listener));
        let (cb, _) = capture();
        queue.add(100, cb);
        scheduler.run_until_idle();
        assert_eq!(drains.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn paused_queue_holds_work_until_resumed() {
        let scheduler = Arc::new(ManualScheduler::new());
        let journal = Journal::default();
        let peak = peak_tracker();
        let queue = WorkQueue::new(
            scheduler.clone(),
            2,
            delayed_worker(&scheduler, &journal, 5, &peak),
        )
        .unwrap();

        queue.pause();
        for n in 0..3 {
            let (cb, _) = capture();
            queue.add(n, cb);
        }
        scheduler.advance(Duration::from_millis(50));
        assert!(journal.events().is_empty());
        assert_eq!(queue.phase(), PoolPhase::Paused);
        assert_eq!(queue.len(), 3);

        queue.resume();
        scheduler.run_until_idle();
        assert_eq!(journal.events(), vec!["start:0", "start:1"]);
        assert_eq!(queue.phase(), PoolPhase::Saturated);

        scheduler.advance(Duration::from_millis(20));
        assert!(queue.is_idle());
    }

    #[test]
    fn raising_concurrency_starts_waiting_work() {
        let scheduler = Arc::new(ManualScheduler::new());
        let journal = Journal::default();
        let peak = peak_tracker();
        let queue = WorkQueue::new(
            scheduler.clone(),
            1,
            delayed_worker(&scheduler, &journal, 10, &peak),
        )
        .unwrap();
        for n in 0..4 {
            let (cb, _) = capture();
            queue.add(n, cb);
        }
        scheduler.run_until_idle();
        assert_eq!(queue.running(), 1);

        queue.set_concurrency(3).unwrap();
        scheduler.run_until_idle();
        assert_eq!(queue.running(), 3);
        assert_eq!(queue.concurrency(), 3);

        assert!(queue.set_concurrency(0).is_err());
        assert_eq!(queue.concurrency(), 3);
    }

    #[test]
    fn panicking_worker_fails_the_item_and_frees_the_slot() {
        let scheduler = Arc::new(ManualScheduler::new());
        let queue = WorkQueue::new(scheduler.clone(), 1, |n: u32, cb: Callback<u32>| {
            if n == 0 {
                panic!("worker bug");
            }
            cb(CompletionResult::success(n));
        })
        .unwrap();

        let (first, a) = capture();
        let (second, b) = capture();
        queue.add(0, first);
        queue.add(1, second);
        scheduler.run_until_idle();

        assert!(a.causes()[0].is_panic());
        assert_eq!(b.values(), vec![1]);
        assert!(queue.is_idle());
    }

    #[test]
    fn lowering_concurrency_lets_running_work_finish() {
        let scheduler = Arc::new(ManualScheduler::new());
        let journal = Journal::default();
        let peak = peak_tracker();
        let queue = WorkQueue::new(
            scheduler.clone(),
            3,
            delayed_worker(&scheduler, &journal, 10, &peak),
        )
        .unwrap();
        let results = Arc::new(Mutex::new(Vec::new()));
        for n in 0..6 {
            let results = Arc::clone(&results);
            queue.add(n, Box::new(move |r| lock(&results).push(r.into_result().ok())));
        }
        scheduler.run_until_idle();
        assert_eq!(queue.running(), 3);

        queue.set_concurrency(1).unwrap();
        assert_eq!(queue.running(), 3);
        scheduler.advance(Duration::from_millis(10));
        assert_eq!(
            journal.events(),
            vec!["start:0", "start:1", "start:2", "end:0", "end:1", "end:2", "start:3"]
        );
        assert_eq!(lock(&results).clone(), vec![Some(0), Some(10), Some(20)]);
        assert_eq!(queue.running(), 1);

        peak.1.store(0, Ordering::SeqCst);
        while !queue.is_idle() {
            assert!(queue.running() <= 1);
            scheduler.advance(Duration::from_millis(10));
        }
        assert_eq!(peak.1.load(Ordering::SeqCst), 1);
        assert_eq!(lock(&results).len(), 6);
    }

    #[test]
    fn panicking_item_callback_does_not_stall_the_queue() {
        let scheduler = Arc::new(ManualScheduler::new());
        let queue = WorkQueue::new(scheduler.clone(), 1, |n: u32, cb: Callback<u32>| {
            cb(CompletionResult::success(n))
        })
        .unwrap();

        queue.add(0, Box::new(|_| panic!("caller bug")));
        let (second, b) = capture();
        queue.add(1, second);
        scheduler.run_until_idle();

        assert_eq!(b.values(), vec![1]);
        assert_eq!(queue.running(), 0);
        assert!(queue.is_idle());
    }

    #[test]
    fn panicking_item_callback_after_async_completion_frees_the_slot() {
        let scheduler = Arc::new(ManualScheduler::new());
        let journal = Journal::default();
        let peak = peak_tracker();
        let queue = WorkQueue::new(
            scheduler.clone(),
            1,
            delayed_worker(&scheduler, &journal, 5, &peak),
        )
        .unwrap();

        queue.add(0, Box::new(|_| panic!("caller bug")));
        let (second, b) = capture();
        queue.add(1, second);
        scheduler.advance(Duration::from_millis(10));

        assert_eq!(b.values(), vec![10]);
        assert!(queue.is_idle());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn tokio_queue_completes_everything() {
        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::current());
        let handle = tokio::runtime::Handle::current();
        let queue = WorkQueue::new(scheduler, 3, move |n: u64, cb: Callback<u64>| {
            handle.spawn(async move {
                tokio::time::sleep(Duration::from_millis(n % 5)).await;
                cb(CompletionResult::success(n * 2));
            });
        })
        .unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for n in 0..30 {
            let tx = tx.clone();
            queue.add(
                n,
                Box::new(move |result| {
                    let _ = tx.send(result.into_result().ok());
                }),
            );
        }
        drop(tx);

        let mut total = 0;
        while let Some(value) = rx.recv().await {
            total += value.unwrap_or_default();
        }
        assert_eq!(total, (0..30).map(|n| n * 2).sum::<u64>());
    }
}
