//! Ports - 抽象化レイヤー
//!
//! 実行基盤（event loop, timer, blocking pool）への唯一のインターフェース。
//! コアはここ以外の外部機能に依存しない。

pub mod scheduler;

pub use self::scheduler::{OffLineWork, Scheduler, TimerHandle, Work};
