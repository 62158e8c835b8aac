use super::{
    builder::CacheBuilder,
    scheduler::{InFlight, RefreshScheduler},
    stats_counter::StatsCounter,
};
use crate::{
    common::store::EntryStore,
    extrapolate::{Average, Extrapolation, Extrapolator},
    notification::{
        notifier::{panic_message, FailureNotifier},
        FailureListener, RefreshFailure,
    },
    persist,
    stats::CacheStats,
    PersistError,
};

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    borrow::Borrow,
    fmt,
    hash::Hash,
    panic::{catch_unwind, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::Arc,
};

pub(crate) type Loader<K, V, E> = Arc<dyn Fn(&K) -> Result<V, E> + Send + Sync + 'static>;

/// Everything that has to change together: the entries, the keys being
/// refreshed, and the number of fetches since the last save.
pub(crate) struct State<K, V> {
    pub(crate) store: EntryStore<K, V>,
    pub(crate) in_flight: InFlight<K>,
    pub(crate) updates: usize,
}

impl<K, V> State<K, V>
where
    K: Hash + Eq,
{
    pub(crate) fn new(max_entries: Option<usize>) -> Self {
        Self {
            store: EntryStore::new(max_entries),
            in_flight: InFlight::default(),
            updates: 0,
        }
    }
}

/// A thread-safe memoizing cache that persists its entries to a file and can
/// answer misses with an extrapolated value while the real one is fetched in the
/// background.
///
/// The cache wraps a function (the _loader_) that maps a key, usually the tuple
/// of the function's arguments, to a value. [`invoke`](#method.invoke) calls the
/// loader only for keys that are not cached yet.
///
/// # Foreground and background mode
///
/// - In foreground mode (extrapolation disabled, or `max_threads` set to `0`),
///   a miss calls the loader on the calling thread. Errors from the loader are
///   returned to the caller.
/// - In background mode, a miss returns the value of the extrapolator right
///   away, computed from the values currently cached, and a worker thread
///   calls the loader. At most one refresh runs per key, and at most
///   `max_threads` run at the same time. A caller only blocks when all worker
///   slots are taken.
///
/// # Persistence
///
/// The entries are loaded from the storage path when the cache is built, and
/// saved back after every `write_behind_count` successful fetches. A load or
/// save failure never fails the cache: it is logged through the `log` crate and
/// the cache keeps working in memory. A failed save is retried after the next
/// fetch.
///
/// # Eviction
///
/// Entries are evicted in insertion order, oldest first. Reads do not affect the
/// order. The cache may hold up to nine entries more than `max_entries`; on the
/// tenth, all of the overflow is evicted at once.
///
/// # Examples
///
/// ```rust
/// use pmemo::sync::Cache;
/// use std::convert::Infallible;
///
/// let dir = tempfile::tempdir().unwrap();
///
/// let cache = Cache::background("divide", |n: &u64| Ok::<_, Infallible>(n / 11))
///     .storage_path(dir.path())
///     .build();
///
/// // Nothing is known yet, so the default (0) is extrapolated.
/// assert_eq!(cache.invoke(55).unwrap(), 0);
///
/// // Wait for the background refresh.
/// cache.join();
/// assert_eq!(cache.invoke(55).unwrap(), 5);
///
/// // A new key gets the mean of the known values until it is fetched.
/// assert_eq!(cache.invoke(66).unwrap(), 5);
/// cache.join();
/// assert_eq!(cache.invoke(66).unwrap(), 6);
/// ```
pub struct Cache<K, V, E> {
    inner: Arc<Inner<K, V, E>>,
}

impl<K, V, E> Clone for Cache<K, V, E> {
    /// Makes a clone of this shared cache.
    ///
    /// This operation is cheap as it only creates thread-safe reference counted
    /// pointers to the shared internal data structures.
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, E> fmt::Debug for Cache<K, V, E>
where
    K: Hash + Eq,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Cache")
            .field("name", &self.inner.name)
            .field("storage_path", &self.inner.storage_path)
            .field("entry_count", &state.store.len())
            .field("in_flight", &state.in_flight.len())
            .finish()
    }
}

impl<K, V, E> Cache<K, V, E>
where
    K: Hash + Eq + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    E: fmt::Debug + Send + Sync + 'static,
{
    /// Returns a [`CacheBuilder`][builder-struct] for a cache of the function
    /// `name`. Extrapolation is disabled until configured on the builder.
    ///
    /// The name identifies the function in log messages, and in the snapshot
    /// file name when the storage path is a directory.
    ///
    /// [builder-struct]: ./struct.CacheBuilder.html
    pub fn builder(
        name: impl Into<String>,
        loader: impl Fn(&K) -> Result<V, E> + Send + Sync + 'static,
    ) -> CacheBuilder<K, V, E> {
        CacheBuilder::new(name.into(), Arc::new(loader))
    }

    /// Returns a builder for a cache that always fetches on the calling thread.
    pub fn foreground(
        name: impl Into<String>,
        loader: impl Fn(&K) -> Result<V, E> + Send + Sync + 'static,
    ) -> CacheBuilder<K, V, E> {
        Self::builder(name, loader).extrapolation(Extrapolation::Disabled)
    }

    /// Returns a builder for a cache that fetches in the background and answers
    /// misses with the mean of the cached values, or `V::default()` when the
    /// cache is empty.
    pub fn background(
        name: impl Into<String>,
        loader: impl Fn(&K) -> Result<V, E> + Send + Sync + 'static,
    ) -> CacheBuilder<K, V, E>
    where
        V: Average + Default,
    {
        Self::builder(name, loader).extrapolation(Extrapolation::average(V::default()))
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn with_everything(
        name: String,
        storage_path: PathBuf,
        loader: Loader<K, V, E>,
        extrapolation: Extrapolation<V>,
        max_entries: usize,
        write_behind_count: usize,
        max_threads: usize,
        failure_listener: Option<FailureListener<K, E>>,
    ) -> Self {
        let (extrapolator, scheduler) = match extrapolation {
            Extrapolation::Enabled(f) if max_threads > 0 => {
                (Some(f), Some(RefreshScheduler::new(max_threads)))
            }
            _ => (None, None),
        };
        let notifier = failure_listener.map(|l| FailureNotifier::new(l, name.clone()));

        Self {
            inner: Arc::new(Inner {
                storage_path: persist::resolve_path(&storage_path, &name),
                name,
                loader,
                extrapolator,
                max_entries,
                write_behind_count,
                state: Mutex::new(State::new(Some(max_entries))),
                scheduler,
                notifier,
                stats: StatsCounter::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the file the snapshot is loaded from and saved to.
    pub fn storage_path(&self) -> &Path {
        &self.inner.storage_path
    }

    pub fn max_entries(&self) -> usize {
        self.inner.max_entries
    }

    pub fn write_behind_count(&self) -> usize {
        self.inner.write_behind_count
    }

    /// Returns the maximum number of concurrent background refreshes, or `0` in
    /// foreground mode.
    pub fn max_threads(&self) -> usize {
        self.inner
            .scheduler
            .as_ref()
            .map_or(0, RefreshScheduler::max_threads)
    }

    /// Returns `true` if misses are answered by extrapolation.
    pub fn is_background(&self) -> bool {
        self.inner.scheduler.is_some()
    }

    /// Returns the value for the key, calling the wrapped function on a miss.
    ///
    /// - On a hit, returns the cached value.
    /// - On a miss in foreground mode, calls the function, caches the value and
    ///   returns it. An error from the function is returned as is and nothing is
    ///   cached.
    /// - On a miss in background mode, makes sure a refresh of the key is in
    ///   flight and returns the extrapolated value. This never returns an error.
    pub fn invoke(&self, key: K) -> Result<V, E> {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if let Some(value) = state.store.get(&key) {
            inner.stats.record_hit();
            return Ok(value.clone());
        }
        inner.stats.record_miss();

        let (Some(scheduler), Some(extrapolate)) = (&inner.scheduler, &inner.extrapolator) else {
            drop(state);
            let value = (inner.loader)(&key)?;
            let mut state = inner.state.lock();
            inner.record_fetch(&mut state, Arc::new(key), value.clone());
            return Ok(value);
        };

        let key = Arc::new(key);
        let task_inner = Arc::clone(inner);
        let task_key = Arc::clone(&key);
        if scheduler.try_start(&mut state, &key, move || task_inner.refresh(task_key)) {
            inner.stats.record_refresh_started();
            log::trace!("[{}] Started a background refresh", inner.name);
        } else if let Some(value) = state.store.get(&*key) {
            // Fetched while this call was waiting for a refresh slot.
            return Ok(value.clone());
        }

        let values: Vec<V> = state.store.values().cloned().collect();
        drop(state);
        inner.stats.record_extrapolation();
        Ok(extrapolate(values.as_slice()))
    }

    /// Returns a clone of the cached value for the key, without calling the
    /// wrapped function.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.state.lock().store.get(key).cloned()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.state.lock().store.contains_key(key)
    }

    /// Sets the value for the key. Overwriting keeps the key's position in the
    /// eviction order.
    ///
    /// Unlike a fetch, this does not count toward the write-behind threshold.
    pub fn insert(&self, key: K, value: V) {
        let evicted = self.inner.state.lock().store.put(key, value);
        self.inner.stats.record_evictions(evicted);
    }

    /// Discards the cached value for the key and returns it.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.state.lock().store.remove(key)
    }

    /// Discards all cached values. The snapshot on disk is left untouched.
    pub fn clear(&self) {
        self.inner.state.lock().store.clear();
    }

    pub fn entry_count(&self) -> usize {
        self.inner.state.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().store.is_empty()
    }

    /// Returns the number of background refreshes currently running.
    pub fn in_flight_count(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }

    /// Blocks until all background refreshes have finished, including the ones
    /// started while waiting. Returns immediately in foreground mode.
    pub fn join(&self) {
        if let Some(scheduler) = &self.inner.scheduler {
            let mut state = self.inner.state.lock();
            scheduler.join(&mut state);
        }
    }

    /// Merges the snapshot on disk into the cache and returns the number of
    /// loaded entries. Loaded values overwrite cached ones.
    ///
    /// A missing or malformed snapshot is logged and loads nothing.
    pub fn load(&self) -> usize {
        match self.try_load() {
            Ok(count) => count,
            Err(e) if e.is_not_found() => {
                log::debug!(
                    "[{}] No snapshot at {} yet",
                    self.inner.name,
                    self.inner.storage_path.display()
                );
                0
            }
            Err(e) => {
                log::warn!(
                    "[{}] Ignoring the snapshot at {}: {e}",
                    self.inner.name,
                    self.inner.storage_path.display()
                );
                0
            }
        }
    }

    /// Like [`load`](#method.load), but returns the failure to the caller.
    pub fn try_load(&self) -> Result<usize, PersistError> {
        let inner = &self.inner;
        let entries: Vec<(K, V)> = persist::load(&inner.storage_path, &inner.name)?;
        let count = entries.len();

        let mut state = inner.state.lock();
        let evicted: usize = entries
            .into_iter()
            .map(|(k, v)| state.store.put(k, v))
            .sum();
        inner.stats.record_evictions(evicted);
        drop(state);

        log::debug!(
            "[{}] Loaded {count} entries from {}",
            inner.name,
            inner.storage_path.display()
        );
        Ok(count)
    }

    /// Writes all cached entries to the storage path. Returns `false` if the
    /// snapshot could not be written; the failure is logged.
    pub fn save(&self) -> bool {
        match self.try_save() {
            Ok(()) => true,
            Err(e) => {
                log::warn!(
                    "[{}] Could not save the snapshot to {}: {e}",
                    self.inner.name,
                    self.inner.storage_path.display()
                );
                false
            }
        }
    }

    /// Like [`save`](#method.save), but returns the failure to the caller.
    pub fn try_save(&self) -> Result<(), PersistError> {
        let mut state = self.inner.state.lock();
        self.inner.save_locked(&mut state)
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot()
    }
}

pub(crate) struct Inner<K, V, E> {
    name: String,
    storage_path: PathBuf,
    loader: Loader<K, V, E>,
    extrapolator: Option<Extrapolator<V>>,
    max_entries: usize,
    write_behind_count: usize,
    state: Mutex<State<K, V>>,
    scheduler: Option<RefreshScheduler>,
    notifier: Option<FailureNotifier<K, E>>,
    stats: StatsCounter,
}

impl<K, V, E> Inner<K, V, E>
where
    K: Hash + Eq + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    E: fmt::Debug + Send + Sync + 'static,
{
    /// Stores a freshly fetched value, then saves the snapshot if this was the
    /// `write_behind_count`-th fetch since the last save.
    fn record_fetch(&self, state: &mut State<K, V>, key: Arc<K>, value: V) {
        let evicted = state.store.put_shared(key, value);
        if evicted > 0 {
            self.stats.record_evictions(evicted);
            log::debug!("[{}] Evicted the {evicted} oldest entries", self.name);
        }

        state.updates += 1;
        if state.updates >= self.write_behind_count {
            if let Err(e) = self.save_locked(state) {
                // The counter was not reset, so the next fetch tries again.
                log::warn!(
                    "[{}] Could not save the snapshot to {}: {e}",
                    self.name,
                    self.storage_path.display()
                );
            }
        }
    }

    fn save_locked(&self, state: &mut State<K, V>) -> Result<(), PersistError> {
        match persist::save(&self.storage_path, &self.name, state.store.iter()) {
            Ok(()) => {
                state.updates = 0;
                self.stats.record_save();
                log::debug!(
                    "[{}] Saved {} entries to {}",
                    self.name,
                    state.store.len(),
                    self.storage_path.display()
                );
                Ok(())
            }
            Err(e) => {
                self.stats.record_save_failure();
                Err(e)
            }
        }
    }

    /// Body of a background refresh.
    fn refresh(&self, key: Arc<K>) {
        let _in_flight = InFlightGuard { inner: self, key: &key };

        let failure = match catch_unwind(AssertUnwindSafe(|| (self.loader)(&key))) {
            Ok(Ok(value)) => {
                let mut state = self.state.lock();
                self.record_fetch(&mut state, Arc::clone(&key), value);
                return;
            }
            Ok(Err(e)) => RefreshFailure::Failed(Arc::new(e)),
            Err(payload) => RefreshFailure::Panicked(panic_message(&*payload).map(Into::into)),
        };

        self.stats.record_refresh_failure();
        log::error!("[{}] Background refresh failed: {failure}", self.name);
        if let Some(notifier) = &self.notifier {
            notifier.notify(Arc::clone(&key), failure);
        }
    }
}

/// Takes the key out of the in-flight set when the refresh is over, however it
/// ended.
struct InFlightGuard<'a, K, V, E>
where
    K: Hash + Eq,
{
    inner: &'a Inner<K, V, E>,
    key: &'a K,
}

impl<'a, K, V, E> Drop for InFlightGuard<'a, K, V, E>
where
    K: Hash + Eq,
{
    fn drop(&mut self) {
        if let Some(scheduler) = &self.inner.scheduler {
            let mut state = self.inner.state.lock();
            scheduler.finish(&mut state, self.key);
        }
    }
}
