//! Scheduler port - 実行基盤の抽象化
//!
//! The combinators and pools never run work themselves; they hand it to a
//! [`Scheduler`]. Anything that can provide an ordered "line" of execution,
//! one-shot timers and a place for blocking work can drive the whole crate.
//!
//! # 実装
//! - **TokioScheduler**: tokio 上の本番用
//! - **ManualScheduler**: テスト用（決定的、仮想時刻）

use std::time::Duration;

/// Zero-argument unit of work.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Blocking work run off the line; returns the continuation to run back on it.
pub type OffLineWork = Box<dyn FnOnce() -> Work + Send + 'static>;

/// Cancellation handle of a delayed work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// Scheduler は単一の論理ライン上で work を実行する
///
/// # 契約
/// - `run_soon`: 同じラインから投入された work は投入順に実行される
/// - `run_after_delay` / `cancel`: one-shot timer。発火済みの cancel は no-op
/// - `run_off_line`: ラインを止めない場所で blocking work を実行し、
///   返ってきた continuation をライン上で実行する
///
/// # Thread Safety
/// - `Send + Sync` を要求（callback はどのスレッドからでも呼ばれうる）
pub trait Scheduler: Send + Sync {
    fn run_soon(&self, work: Work);

    fn run_after_delay(&self, delay: Duration, work: Work) -> TimerHandle;

    fn cancel(&self, handle: TimerHandle);

    fn run_off_line(&self, blocking: OffLineWork);
}
