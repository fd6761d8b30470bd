//! ManualScheduler - テスト用の決定的 Scheduler
//!
//! # テスト容易性
//! - 実行は `run_until_idle()` / `advance()` を呼んだときだけ進む
//! - 時刻は仮想（`advance()` でのみ進む）
//! - off-line work はラインが空になったときに実行される
//!
//! Nothing here spawns threads, so every interleaving a test observes is
//! fully reproducible.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use tracing::trace;

use crate::ports::{OffLineWork, Scheduler, TimerHandle, Work};
use crate::sync::lock;

#[derive(Default)]
struct ManualState {
    line: VecDeque<Work>,
    off_line: VecDeque<OffLineWork>,
    /// (deadline, timer id) -> work; ordered by deadline then arming order
    timers: BTreeMap<(Duration, u64), Work>,
    now: Duration,
    next_timer: u64,
}

/// Deterministic single-threaded scheduler driven by the test itself.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        lock(&self.state).now
    }

    /// Work items waiting on the line.
    pub fn queued(&self) -> usize {
        lock(&self.state).line.len()
    }

    pub fn pending_timers(&self) -> usize {
        lock(&self.state).timers.len()
    }

    /// Run exactly one line item, if any. Returns whether one ran.
    pub fn run_one(&self) -> bool {
        let work = lock(&self.state).line.pop_front();
        match work {
            Some(work) => {
                work();
                true
            }
            None => false,
        }
    }

    /// Run line work (and then parked off-line work) until nothing is left.
    /// Timers are not fired; see [`advance`](Self::advance).
    ///
    /// Returns the number of work items executed.
    pub fn run_until_idle(&self) -> usize {
        self.run_at_most(usize::MAX)
    }

    /// Like [`run_until_idle`](Self::run_until_idle) but stops after `limit`
    /// items; used to observe loops that never end on their own.
    pub fn run_at_most(&self, limit: usize) -> usize {
        let mut executed = 0;
        while executed < limit {
            if self.run_one() {
                executed += 1;
                continue;
            }
            let blocking = lock(&self.state).off_line.pop_front();
            let Some(blocking) = blocking else {
                break;
            };
            let continuation = blocking();
            lock(&self.state).line.push_back(continuation);
            executed += 1;
        }
        executed
    }

    /// Move virtual time forward, firing due timers in deadline order.
    ///
    /// Line work is drained before and after each timer, so a timer armed by
    /// a fired timer is honoured within the same call when it falls due.
    pub fn advance(&self, by: Duration) -> usize {
        let target = lock(&self.state).now + by;
        let mut executed = self.run_until_idle();
        loop {
            let due = {
                let mut state = lock(&self.state);
                let next = state
                    .timers
                    .first_key_value()
                    .map(|(&key, _)| key)
                    .filter(|&(deadline, _)| deadline <= target);
                match next {
                    Some(key) => {
                        state.now = key.0;
                        state.timers.remove(&key)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };
            let Some(work) = due else {
                break;
            };
            lock(&self.state).line.push_back(work);
            executed += self.run_until_idle();
        }
        executed
    }
}

impl Scheduler for ManualScheduler {
    fn run_soon(&self, work: Work) {
        lock(&self.state).line.push_back(work);
    }

    fn run_after_delay(&self, delay: Duration, work: Work) -> TimerHandle {
        let mut state = lock(&self.state);
        let id = state.next_timer;
        state.next_timer += 1;
        let deadline = state.now + delay;
        state.timers.insert((deadline, id), work);
        trace!(timer = id, ?deadline, "timer armed");
        TimerHandle::new(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        lock(&self.state)
            .timers
            .retain(|&(_, id), _| id != handle.id());
    }

    fn run_off_line(&self, blocking: OffLineWork) {
        lock(&self.state).off_line.push_back(blocking);
    }
}
