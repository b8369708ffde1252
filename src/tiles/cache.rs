//! Bounded recency cache for decoded tiles.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Result, TileError};

/// Entries plus their recency order.
///
/// Every key in `values` appears exactly once in `order`, under the stamp
/// stored next to its value. Higher stamps are more recent.
struct Entries<K, V> {
    values: HashMap<K, (V, u64)>,
    order: BTreeMap<u64, K>,
    next_stamp: u64,
}

impl<K: Eq + Hash + Clone, V> Entries<K, V> {
    fn new() -> Self {
        Self {
            values: HashMap::new(),
            order: BTreeMap::new(),
            next_stamp: 0,
        }
    }

    fn stamp(&mut self) -> u64 {
        self.next_stamp += 1;
        self.next_stamp
    }

    /// Mark `key` most recently used and return its value.
    fn touch(&mut self, key: &K) -> Option<&V> {
        if !self.values.contains_key(key) {
            return None;
        }
        let stamp = self.stamp();
        let (value, old) = self.values.get_mut(key)?;
        self.order.remove(&*old);
        *old = stamp;
        self.order.insert(stamp, key.clone());
        Some(&*value)
    }

    /// Drop least recently used entries until at most `target` remain.
    fn evict_to(&mut self, target: usize) -> usize {
        let mut evicted = 0;
        while self.values.len() > target {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            self.values.remove(&key);
            evicted += 1;
        }
        evicted
    }
}

/// Thread-safe bounded cache with least-recently-used eviction.
///
/// Eviction only happens on insertion: once the cache holds
/// `tolerated_size` entries it is shrunk back to `target_size`, oldest first.
/// Reads never remove entries. Clones share the same storage.
pub struct RecencyCache<K, V> {
    entries: Arc<Mutex<Entries<K, V>>>,
    target_size: usize,
    tolerated_size: usize,
}

impl<K, V> Clone for RecencyCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            target_size: self.target_size,
            tolerated_size: self.tolerated_size,
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> RecencyCache<K, V> {
    /// Create a new cache.
    ///
    /// `tolerated_size` is the size that triggers eviction, `target_size` the
    /// size eviction shrinks to.
    pub fn new(target_size: usize, tolerated_size: usize) -> Result<Self> {
        if target_size == 0 {
            return Err(TileError::InvalidConfig(
                "cache target size must be at least 1".to_string(),
            ));
        }
        if tolerated_size < target_size {
            return Err(TileError::InvalidConfig(format!(
                "cache tolerated size {tolerated_size} is below target size {target_size}"
            )));
        }

        Ok(Self {
            entries: Arc::new(Mutex::new(Entries::new())),
            target_size,
            tolerated_size,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Entries<K, V>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a cached value and mark it most recently used.
    pub fn get_with_update(&self, key: &K) -> Option<V> {
        self.lock().touch(key).cloned()
    }

    /// Check for a key and mark it most recently used.
    pub fn contains_with_update(&self, key: &K) -> bool {
        self.lock().touch(key).is_some()
    }

    /// Insert a value unless the key is already cached.
    ///
    /// Returns `false` (and leaves the existing entry and its recency alone)
    /// when the key is present.
    pub fn insert_without_update(&self, key: K, value: V) -> bool {
        let mut entries = self.lock();
        if entries.values.contains_key(&key) {
            return false;
        }

        let stamp = entries.stamp();
        entries.order.insert(stamp, key.clone());
        entries.values.insert(key, (value, stamp));

        if entries.values.len() >= self.tolerated_size {
            let evicted = entries.evict_to(self.target_size);
            tracing::debug!("Evicted {evicted} tiles, {} remain", entries.values.len());
        }
        true
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.lock().values.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().values.is_empty()
    }

    /// Size eviction shrinks to.
    pub const fn target_size(&self) -> usize {
        self.target_size
    }

    /// Size that triggers eviction.
    pub const fn tolerated_size(&self) -> usize {
        self.tolerated_size
    }

    /// Keys from least to most recently used.
    #[cfg(test)]
    fn keys_by_recency(&self) -> Vec<K> {
        self.lock().order.values().cloned().collect()
    }
}
