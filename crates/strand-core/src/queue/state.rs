//! Pool state shared by the worker queue and cargo.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::Serialize;

use super::listeners::ListenerSet;
use crate::sync::lock;

/// Observable phase of a pool.
///
/// Phases:
/// - Idle: nothing pending, nothing running
/// - Dispatching: pending work and room below the limit
/// - Saturated: running == limit
/// - Paused: no dispatch regardless of pending/running
///
/// There is no terminal phase; a pool is reusable indefinitely.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolPhase {
    #[default]
    Idle,
    Dispatching,
    Saturated,
    Paused,
}

/// Pending items plus the counters read across threads.
///
/// `running` only grows inside [`take_next`](Self::take_next) /
/// [`take_batch`](Self::take_batch), under the pending lock and after the
/// limit check, so it never exceeds the limit read at that moment.
pub(crate) struct PoolState<I> {
    pending: Mutex<VecDeque<I>>,
    limit: AtomicUsize,
    running: AtomicUsize,
    paused: AtomicBool,
    pub(crate) listeners: ListenerSet,
}

impl<I> PoolState<I> {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            limit: AtomicUsize::new(limit),
            running: AtomicUsize::new(0),
            paused: AtomicBool::new(false),
            listeners: ListenerSet::default(),
        }
    }

    pub(crate) fn push_back(&self, item: I) {
        lock(&self.pending).push_back(item);
    }

    /// Insert a group at the front, keeping the group's own order.
    pub(crate) fn push_front_all(&self, items: Vec<I>) {
        let mut pending = lock(&self.pending);
        for item in items.into_iter().rev() {
            pending.push_front(item);
        }
    }

    pub(crate) fn extend_back(&self, items: impl IntoIterator<Item = I>) {
        lock(&self.pending).extend(items);
    }

    /// Drop every pending item. Returns how many were dropped.
    pub(crate) fn clear(&self) -> usize {
        let mut pending = lock(&self.pending);
        let dropped = pending.len();
        pending.clear();
        dropped
    }

    /// Pop the head item if dispatch is allowed, counting it as running.
    ///
    /// The flag is `true` when this take emptied the pending queue.
    pub(crate) fn take_next(&self) -> Option<(I, bool)> {
        let mut pending = lock(&self.pending);
        if !self.has_room() {
            return None;
        }
        let item = pending.pop_front()?;
        self.running.fetch_add(1, Ordering::SeqCst);
        Some((item, pending.is_empty()))
    }

    /// Pop up to `max` head items as one running unit.
    pub(crate) fn take_batch(&self, max: usize) -> Option<(Vec<I>, bool)> {
        let mut pending = lock(&self.pending);
        if !self.has_room() || pending.is_empty() {
            return None;
        }
        let n = max.min(pending.len());
        let batch: Vec<I> = pending.drain(..n).collect();
        self.running.fetch_add(1, Ordering::SeqCst);
        Some((batch, pending.is_empty()))
    }

    pub(crate) fn finish_one(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }

    fn has_room(&self) -> bool {
        !self.is_paused() && self.running() < self.limit()
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub(crate) fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit.load(Ordering::SeqCst)
    }

    /// Returns the previous limit.
    pub(crate) fn set_limit(&self, limit: usize) -> usize {
        self.limit.swap(limit, Ordering::SeqCst)
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Returns the previous value.
    pub(crate) fn set_paused(&self, paused: bool) -> bool {
        self.paused.swap(paused, Ordering::SeqCst)
    }

    /// Would a dispatch pass right now start anything?
    pub(crate) fn wants_pass(&self) -> bool {
        self.has_room() && self.len() > 0
    }

    pub(crate) fn is_idle(&self) -> bool {
        let pending = lock(&self.pending);
        self.running() == 0 && pending.is_empty()
    }

    pub(crate) fn phase(&self) -> PoolPhase {
        let pending = lock(&self.pending);
        let running = self.running();
        if self.is_paused() {
            PoolPhase::Paused
        } else if running >= self.limit() {
            PoolPhase::Saturated
        } else if pending.is_empty() && running == 0 {
            PoolPhase::Idle
        } else {
            PoolPhase::Dispatching
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_respects_limit_and_reports_drain() {
        let state = PoolState::new(2);
        state.extend_back([1, 2, 3]);

        assert_eq!(state.take_next(), Some((1, false)));
        assert_eq!(state.take_next(), Some((2, false)));
        assert_eq!(state.take_next(), None);
        assert_eq!(state.phase(), PoolPhase::Saturated);

        state.finish_one();
        assert_eq!(state.take_next(), Some((3, true)));
        assert_eq!(state.running(), 2);
    }

    #[test]
    fn paused_state_takes_nothing() {
        let state = PoolState::new(4);
        state.push_back("a");
        state.set_paused(true);
        assert_eq!(state.take_next(), None);
        assert_eq!(state.phase(), PoolPhase::Paused);
        assert!(!state.wants_pass());

        state.set_paused(false);
        assert!(state.wants_pass());
        assert_eq!(state.take_next(), Some(("a", true)));
    }

    #[test]
    fn batches_are_capped_and_front_insert_keeps_group_order() {
        let state = PoolState::new(1);
        state.extend_back([3, 4, 5, 6]);
        state.push_front_all(vec![1, 2]);

        assert_eq!(state.take_batch(5), Some((vec![1, 2, 3, 4, 5], false)));
        assert_eq!(state.take_batch(5), None);
        state.finish_one();
        assert_eq!(state.take_batch(5), Some((vec![6], true)));
        state.finish_one();
        assert!(state.is_idle());
        assert_eq!(state.phase(), PoolPhase::Idle);
        assert_eq!(serde_json::to_value(state.phase()).unwrap(), serde_json::json!("idle"));
    }

    #[test]
    fn clear_drops_pending_only() {
        let state = PoolState::new(1);
        state.extend_back(["a", "b", "c"]);
        let _ = state.take_next();
        assert_eq!(state.clear(), 2);
        assert_eq!(state.len(), 0);
        assert_eq!(state.running(), 1);
        assert!(!state.is_idle());
    }
}
