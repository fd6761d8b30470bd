//! Small helpers around `std::sync`.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a panicking task poisoned it.
///
/// Combinator and pool state stays consistent across a panic (every update
/// is a single push/pop/take), so the poison flag carries no information here.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
