//! Per-external-id mutual exclusion
//!
//! Rows carrying the same external id must not run their check-then-insert
//! sequence at the same time. Each key gets its own async mutex on first use;
//! the entry is removed again once nobody holds or waits on it.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lock table keyed by external id
pub struct KeyLocks<K>
where
    K: Eq + Hash + Clone,
{
    entries: DashMap<K, Arc<Mutex<()>>>,
}

impl<K> KeyLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: K) -> KeyGuard<'_, K> {
        // Clone the Arc out so the shard lock is released before awaiting
        let mutex = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = mutex.lock_owned().await;

        KeyGuard {
            locks: self,
            key: Some(key),
            guard: Some(guard),
        }
    }

    /// Keys currently held or awaited
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K> Default for KeyLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Held lock on one key; released on drop
pub struct KeyGuard<'a, K>
where
    K: Eq + Hash + Clone,
{
    locks: &'a KeyLocks<K>,
    key: Option<K>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K> Drop for KeyGuard<'_, K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        // Release first so the strong count reflects only the table and waiters
        drop(self.guard.take());

        if let Some(key) = self.key.take() {
            self.locks
                .entries
                .remove_if(&key, |_, mutex| Arc::strong_count(mutex) == 1);
        }
    }
}
