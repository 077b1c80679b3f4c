//! Per-key async locks
//!
//! Read-modify-write sequences on one account, or on one user's contacts,
//! hold the key's lock for their whole duration. Two-key operations take the
//! locks in ascending key order so that opposite transfers between the same
//! pair of accounts cannot deadlock.
//!
//! A key's slot lives only while someone holds or waits for it; the last
//! guard to go removes it, so keys that never exist cannot pile up.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slots<K> = Arc<DashMap<K, Arc<Mutex<()>>>>;

/// Table of async mutexes keyed by `K`
pub struct KeyedLocks<K>
where
    K: Eq + Hash,
{
    locks: Slots<K>,
}

/// Guard for one key; releases the lock and drops an idle slot
pub struct KeyGuard<K>
where
    K: Eq + Hash,
{
    key: K,
    locks: Slots<K>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K> Drop for KeyGuard<K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.guard.take();
        // Only the table's own reference left: nobody holds or waits.
        self.locks.remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}

/// Guards for a pair of keys; holds one guard when both keys are equal
pub struct PairGuard<K>
where
    K: Eq + Hash,
{
    _first: KeyGuard<K>,
    _second: Option<KeyGuard<K>>,
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Ord + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Ord + Clone,
{
    pub fn new() -> Self {
        Self { locks: Arc::new(DashMap::new()) }
    }

    fn slot(&self, key: &K) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Lock a single key
    pub async fn lock(&self, key: &K) -> KeyGuard<K> {
        let guard = self.slot(key).lock_owned().await;

        KeyGuard {
            key: key.clone(),
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    /// Lock two keys in ascending order
    pub async fn lock_pair(&self, a: &K, b: &K) -> PairGuard<K> {
        if a == b {
            return PairGuard { _first: self.lock(a).await, _second: None };
        }

        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let first = self.lock(low).await;
        let second = self.lock(high).await;

        PairGuard { _first: first, _second: Some(second) }
    }

    /// Number of keys currently held or waited on
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
