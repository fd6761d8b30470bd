//! Worker pools: bounded FIFO queue and batch cargo, sharing one pool state.
//!
//! # 主要コンポーネント
//! - **WorkQueue**: item を 1 つずつ worker に渡す（最大 concurrency 個同時）
//! - **Cargo**: 最大 payload 個の item をバッチで worker に渡す
//! - **PoolConfig**: 制限値（serde で読み込み可能）
//! - **IdleListener**: pending が空になるたびに通知される observer

mod cargo;
mod config;
mod item;
mod listeners;
mod state;
mod work_queue;

pub use cargo::{Batch, Cargo, ItemCallback};
pub use config::{DEFAULT_CONCURRENCY, DEFAULT_PAYLOAD, PoolConfig};
pub use item::WorkItem;
pub use listeners::IdleListener;
pub use state::PoolPhase;
pub use work_queue::WorkQueue;
