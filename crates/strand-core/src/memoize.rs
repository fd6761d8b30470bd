//! Memoize - 非同期関数の結果キャッシュ
//!
//! # 設計原則
//! - 成功した結果だけをキャッシュする（失敗は毎回 f を呼び直す）
//! - `get` は副作用なし
//!
//! # 制限
//! 同じキーへの同時 miss は重複排除しない。どちらも `f` を呼び、後に成功した
//! 方の値がキャッシュに残る。

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::domain::{Callback, CompletionResult, call_guarded};
use crate::sync::lock;

type Lookup<K, V> = Box<dyn Fn(K, Callback<V>) + Send + Sync + 'static>;

struct Inner<K, V> {
    f: Lookup<K, V>,
    cache: Mutex<HashMap<K, V>>,
}

/// Keyed asynchronous function wrapper with a success cache.
///
/// Clones share the same cache.
pub struct Memoize<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for Memoize<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Memoize<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(K, Callback<V>) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                f: Box::new(f),
                cache: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Deliver the value for `key`, calling the wrapped function on a miss.
    ///
    /// A hit calls back synchronously.
    pub fn apply(&self, key: K, callback: Callback<V>) {
        let cached = lock(&self.inner.cache).get(&key).cloned();
        if let Some(value) = cached {
            trace!("memoize hit");
            callback(CompletionResult::Success(value));
            return;
        }

        trace!("memoize miss");
        let inner = Arc::clone(&self.inner);
        let stored_key = key.clone();
        call_guarded(
            |cb| (self.inner.f)(key, cb),
            Box::new(move |result: CompletionResult<V>| {
                if let CompletionResult::Success(value) = &result {
                    lock(&inner.cache).insert(stored_key, value.clone());
                }
                callback(result);
            }),
        );
    }

    pub fn get(&self, key: &K) -> Option<V> {
        lock(&self.inner.cache).get(key).cloned()
    }

    /// Drop the cached value for `key`. Returns whether one was present.
    pub fn unset(&self, key: &K) -> bool {
        lock(&self.inner.cache).remove(key).is_some()
    }

    pub fn clear(&self) {
        lock(&self.inner.cache).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.cache).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner.cache).is_empty()
    }
}
