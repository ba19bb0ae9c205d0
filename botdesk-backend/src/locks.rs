//! Keyed mutual exclusion.
//!
//! Writers touching the same conversation queue
//! on a per-key mutex; unrelated keys never contend. Entries are dropped as
//! soon as nobody holds or waits on them, so the map stays proportional to
//! in-flight work.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::hash::Hash;
use std::sync::Arc;

pub struct KeyedLocks<K: Eq + Hash + Clone> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Run `f` while holding the lock for `key`
    pub fn with<R>(&self, key: K, f: impl FnOnce() -> R) -> R {
        let lock = self.locks.entry(key.clone()).or_default().clone();
        let result = {
            let _guard = lock.lock();
            f()
        };
        drop(lock);
        // Only the map's own reference left: nobody is waiting on this key.
        self.locks.remove_if(&key, |_, l| Arc::strong_count(l) == 1);
        result
    }

    /// Number of keys currently tracked
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}
