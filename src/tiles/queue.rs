//! Deduplicating queue of tiles waiting to be fetched.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Queued and claimed keys.
///
/// A key is in at most one of `queued` and `claimed`. Every queued key
/// appears once in `order` under its stamp; the highest stamp is served first.
struct State<K, P> {
    queued: HashMap<K, (P, u64)>,
    order: BTreeMap<u64, K>,
    claimed: HashSet<K>,
    next_stamp: u64,
}

impl<K: Eq + Hash + Clone, P> State<K, P> {
    fn stamp(&mut self) -> u64 {
        self.next_stamp += 1;
        self.next_stamp
    }

    /// Move a queued key to the front. Returns `false` if it is not queued.
    fn bump(&mut self, key: &K) -> bool {
        if !self.queued.contains_key(key) {
            return false;
        }
        let stamp = self.stamp();
        if let Some((_, old)) = self.queued.get_mut(key) {
            self.order.remove(&*old);
            *old = stamp;
            self.order.insert(stamp, key.clone());
        }
        true
    }
}

/// Pending tile requests with most-recent-first service order.
///
/// Each key is either absent, queued with a payload, or claimed by a worker
/// that is fetching it. Claiming is atomic with removal from the queue, so
/// two workers can never fetch the same key at once.
pub struct LoadingQueue<K, P> {
    state: Mutex<State<K, P>>,
}

impl<K: Eq + Hash + Clone, P> Default for LoadingQueue<K, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone, P> LoadingQueue<K, P> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                queued: HashMap::new(),
                order: BTreeMap::new(),
                claimed: HashSet::new(),
                next_stamp: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<K, P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a key at the front of the service order.
    ///
    /// An already queued key keeps a single entry, takes the new payload and
    /// moves to the front. A claimed key is left alone and `false` is
    /// returned.
    pub fn insert_into_loading_queue(&self, key: K, payload: P) -> bool {
        let mut state = self.lock();
        if state.claimed.contains(&key) {
            return false;
        }

        if state.bump(&key) {
            if let Some((slot, _)) = state.queued.get_mut(&key) {
                *slot = payload;
            }
            return true;
        }

        let stamp = state.stamp();
        state.order.insert(stamp, key.clone());
        state.queued.insert(key, (payload, stamp));
        true
    }

    /// Whether a key is queued or being fetched.
    ///
    /// A queued key is moved to the front of the service order.
    pub fn thread_runs_or_is_in_queue(&self, key: &K) -> bool {
        let mut state = self.lock();
        state.bump(key) || state.claimed.contains(key)
    }

    /// Pop the most recently queued key and mark it claimed.
    pub fn remove_first_and_start_loading(&self) -> Option<(K, P)> {
        let mut state = self.lock();
        let (_, key) = state.order.pop_last()?;
        let (payload, _) = state.queued.remove(&key)?;
        state.claimed.insert(key.clone());
        Some((key, payload))
    }

    /// Release the claim taken by [`remove_first_and_start_loading`](Self::remove_first_and_start_loading).
    pub fn complete_loading(&self, key: &K) {
        self.lock().claimed.remove(key);
    }

    /// Drop every queued key. Claimed keys are unaffected.
    pub fn clear_loading_queue(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.queued.len();
        state.queued.clear();
        state.order.clear();
        dropped
    }

    /// Number of queued (unclaimed) keys.
    pub fn len(&self) -> usize {
        self.lock().queued.len()
    }

    /// Check if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().queued.is_empty()
    }

    /// Number of keys currently being fetched.
    pub fn claimed_len(&self) -> usize {
        self.lock().claimed.len()
    }
}
