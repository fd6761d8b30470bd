//! Flow - コンビネータエンジン
//!
//! # 主要コンポーネント
//! - **sequence**: series, waterfall, seq, map_series
//! - **fanout**: parallel, each, times, map, race
//! - **loops**: whilst, do_whilst, until, forever
//! - **retry**: RetryPolicy, retry
//! - **timeout**: timeout, blocking, timeout_blocking
//!
//! # 共通の契約
//! - 最終 callback は高々一度だけ呼ばれる
//! - task が失敗したら、その呼び出しでは以降の task を開始しない
//! - 最初の失敗の cause をそのまま転送する（panic も Failure に変換）
//! - 最終 callback 自身の panic: task の callback 内から呼ばれた場合は
//!   [`call_guarded`](crate::domain::call_guarded) が捕捉し、error ログを出して
//!   破棄する。それ以外はスケジューラのラインまで伝播する
//!   （`TokioScheduler` はそこで捕捉してログを出す）
//!
//! Sequential steps and loop iterations after the first always go through
//! `Scheduler::run_soon`, so a long chain of synchronously completing tasks
//! never grows the call stack.

mod fanout;
mod loops;
mod retry;
mod sequence;
mod timeout;

use std::sync::Arc;

pub use self::retry::RetryPolicy;

use crate::ports::Scheduler;

/// Combinator set bound to one scheduler.
///
/// # 使用例
/// ```ignore
/// let flow = Flow::new(Arc::new(TokioScheduler::current()));
/// flow.series(vec![task(|cb| cb(CompletionResult::success(1)))], done);
/// ```
#[derive(Clone)]
pub struct Flow {
    scheduler: Arc<dyn Scheduler>,
}

impl Flow {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }
}
