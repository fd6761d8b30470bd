//! strand-core
//!
//! Callback-oriented control flow and bounded worker pools.
//!
//! # モジュール構成
//! - **domain**: CompletionResult, FlowError, Callback / Task / Transform, Latch
//! - **ports**: Scheduler trait（実行基盤の抽象化）
//! - **impls**: TokioScheduler（本番用）, ManualScheduler（テスト用）
//! - **flow**: コンビネータ（series, parallel, whilst, retry, timeout, ...）
//! - **queue**: WorkQueue, Cargo, PoolConfig
//! - **memoize**: 非同期関数の結果キャッシュ
//! - **bridge**: callback task と `async` の相互変換
//!
//! # 共通の契約
//! - 完了 callback は必ず高々一度だけ呼ばれる
//! - 失敗は `CompletionResult::Failure` で一度だけ伝わる（panic も含む）
//! - 実行はすべて Scheduler 経由

pub mod bridge;
pub mod domain;
pub mod flow;
pub mod impls;
pub mod memoize;
pub mod ports;
pub mod queue;

mod sync;

#[cfg(test)]
mod test_support;

pub use domain::{Callback, CompletionResult, FlowError, Task, Transform, callback, task, transform};
pub use flow::{Flow, RetryPolicy};
pub use impls::{ManualScheduler, TokioScheduler};
pub use memoize::Memoize;
pub use ports::Scheduler;
pub use queue::{Cargo, PoolConfig, WorkQueue};
