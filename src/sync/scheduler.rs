use parking_lot::{Condvar, MutexGuard};
use std::{borrow::Borrow, collections::HashSet, hash::Hash, sync::Arc};

use super::cache::State;
use crate::common::concurrent::thread_pool::RefreshPool;

/// The keys whose background refresh is currently running.
///
/// A key is present from the moment its refresh is admitted until the refresh
/// finished, successfully or not.
pub(crate) struct InFlight<K> {
    keys: HashSet<Arc<K>>,
}

impl<K> Default for InFlight<K> {
    fn default() -> Self {
        Self {
            keys: HashSet::default(),
        }
    }
}

impl<K> InFlight<K>
where
    K: Hash + Eq,
{
    pub(crate) fn contains<Q>(&self, key: &Q) -> bool
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.keys.contains(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Launches background refreshes with per-key de-duplication and a bound on
/// the number of refreshes running at the same time.
///
/// The in-flight set lives in the cache `State`, so it is guarded by the same
/// mutex as the entry store. The condition variable is signalled whenever a
/// refresh leaves the set, which wakes up both callers waiting for a free slot
/// and callers of `join`.
pub(crate) struct RefreshScheduler {
    slot_freed: Condvar,
    pool: RefreshPool,
}

impl RefreshScheduler {
    /// # Panics
    ///
    /// Panics if `max_threads` is zero.
    pub(crate) fn new(max_threads: usize) -> Self {
        Self {
            slot_freed: Condvar::new(),
            pool: RefreshPool::new(max_threads),
        }
    }

    pub(crate) fn max_threads(&self) -> usize {
        self.pool.num_threads()
    }

    /// Starts `task` as the refresh of `key` unless one is already running.
    ///
    /// Blocks while `max_threads` refreshes are in flight. The state lock is
    /// released during the wait, so the key is checked again after every wake
    /// up. Returns `false` when an existing refresh will take care of the key,
    /// or when the key got a value while waiting.
    ///
    /// The task must call `finish` for the key when it is done.
    pub(crate) fn try_start<K, V, F>(
        &self,
        state: &mut MutexGuard<'_, State<K, V>>,
        key: &Arc<K>,
        task: F,
    ) -> bool
    where
        K: Hash + Eq,
        F: FnOnce() + Send + 'static,
    {
        if state.in_flight.contains(key) {
            return false;
        }
        let max_threads = self.max_threads();
        while state.in_flight.len() >= max_threads {
            log::trace!("All {max_threads} refresh slots are taken; waiting for one to free up");
            self.slot_freed.wait(state);
            if state.in_flight.contains(key) || state.store.contains_key(&**key) {
                return false;
            }
        }

        state.in_flight.keys.insert(Arc::clone(key));
        self.pool.execute(task);
        true
    }

    /// Takes the key out of the in-flight set and wakes up the waiters.
    pub(crate) fn finish<K, V>(&self, state: &mut State<K, V>, key: &K)
    where
        K: Hash + Eq,
    {
        state.in_flight.keys.remove(key);
        self.slot_freed.notify_all();
    }

    /// Blocks until no refresh is in flight, including refreshes started while
    /// waiting.
    pub(crate) fn join<K, V>(&self, state: &mut MutexGuard<'_, State<K, V>>)
    where
        K: Hash + Eq,
    {
        while !state.in_flight.is_empty() {
            self.slot_freed.wait(state);
        }
    }
}
