//! TokioScheduler - tokio 上の Scheduler 実装
//!
//! # 実装詳細
//! - ライン: unbounded mpsc を 1 本の tokio task が順に消費する（投入順を保証）
//! - timer: `tokio::time::sleep` する task。`AbortHandle` が cancel 手段
//! - off-line: `spawn_blocking` で実行し、continuation をラインに戻す

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::ports::{OffLineWork, Scheduler, TimerHandle, Work};
use crate::sync::lock;

/// TokioScheduler は tokio runtime 上に 1 本の論理ラインを持つ
///
/// # 使用例
/// ```ignore
/// let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::current());
/// let flow = Flow::new(scheduler);
/// ```
///
/// Dropping the scheduler closes the line once every pending timer and
/// off-line job has delivered its work.
pub struct TokioScheduler {
    line: mpsc::UnboundedSender<Work>,
    handle: Handle,
    timers: Arc<Mutex<HashMap<u64, AbortHandle>>>,
    next_timer: AtomicU64,
}

impl TokioScheduler {
    /// Start a line on the given runtime.
    pub fn new(handle: Handle) -> Self {
        let (line, mut rx) = mpsc::unbounded_channel::<Work>();
        handle.spawn(async move {
            while let Some(work) = rx.recv().await {
                if panic::catch_unwind(AssertUnwindSafe(work)).is_err() {
                    warn!("work item panicked on the scheduler line");
                }
            }
            debug!("scheduler line closed");
        });

        Self {
            line,
            handle,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_timer: AtomicU64::new(1),
        }
    }

    /// Start a line on the runtime of the current context.
    ///
    /// # Panics
    /// Panics when called outside of a tokio runtime, like `tokio::spawn`.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Number of armed timers (fired and cancelled ones are not counted).
    pub fn pending_timers(&self) -> usize {
        lock(&self.timers).len()
    }
}

impl Scheduler for TokioScheduler {
    fn run_soon(&self, work: Work) {
        if self.line.send(work).is_err() {
            warn!("scheduler line closed; work dropped");
        }
    }

    fn run_after_delay(&self, delay: Duration, work: Work) -> TimerHandle {
        let id = self.next_timer.fetch_add(1, Ordering::Relaxed);
        let line = self.line.clone();
        let timers = Arc::clone(&self.timers);

        // hold the map while spawning so the timer cannot remove itself
        // before its abort handle is registered
        let mut armed = lock(&self.timers);
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            lock(&timers).remove(&id);
            if line.send(work).is_err() {
                warn!(timer = id, "scheduler line closed; timer work dropped");
            }
        });
        armed.insert(id, join.abort_handle());

        TimerHandle::new(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Some(abort) = lock(&self.timers).remove(&handle.id()) {
            abort.abort();
            debug!(timer = handle.id(), "timer cancelled");
        }
    }

    fn run_off_line(&self, blocking: OffLineWork) {
        let line = self.line.clone();
        self.handle.spawn_blocking(move || {
            let continuation = blocking();
            if line.send(continuation).is_err() {
                warn!("scheduler line closed; off-line result dropped");
            }
        });
    }
}
