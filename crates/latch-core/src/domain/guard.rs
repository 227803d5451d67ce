//! Keyed async mutexes
//!
//! Serializes work per key (a lock id, an owner) without a global lock.
//! Guards for several keys are always taken in ascending key order, so two
//! tasks that need overlapping key sets cannot deadlock.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Guards held for a set of keys; released together on drop
#[derive(Debug)]
pub struct MultiKeyGuard {
    guards: Vec<OwnedMutexGuard<()>>,
}

impl MultiKeyGuard {
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

#[derive(Debug)]
pub struct KeyedMutex<K: Eq + Hash> {
    slots: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash> Default for KeyedMutex<K> {
    fn default() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }
}

impl<K> KeyedMutex<K>
where
    K: Eq + Hash + Ord + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &K) -> Arc<Mutex<()>> {
        self.slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        self.slot(key).lock_owned().await
    }

    /// Wait for exclusive access to every key in `keys`
    pub async fn lock_all(&self, keys: &[K]) -> MultiKeyGuard {
        let mut ordered = keys.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for key in &ordered {
            guards.push(self.lock(key).await);
        }
        MultiKeyGuard { guards }
    }

    /// Drop the slot for `key` if nobody holds or awaits it
    pub fn forget(&self, key: &K) {
        self.slots
            .remove_if(key, |_, slot| Arc::strong_count(slot) == 1);
    }

    /// Number of keys with a live slot
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
