//! Impls - Scheduler の実装
//!
//! # 含まれる実装
//! - **TokioScheduler**: tokio runtime 上のライン（本番用）
//! - **ManualScheduler**: 仮想時刻で駆動する決定的なライン（テスト用）

pub mod manual;
pub mod tokio_line;

pub use self::manual::ManualScheduler;
pub use self::tokio_line::TokioScheduler;
