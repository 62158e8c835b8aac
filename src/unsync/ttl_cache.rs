use crate::common::{
    builder_utils,
    store::EntryStore,
    time::{self, Clock, Instant},
};

use std::{borrow::Borrow, fmt, hash::Hash, sync::Arc, time::Duration};

struct Stamped<V> {
    value: V,
    stored_at: Instant,
}

/// A memoizing cache whose entries expire after a fixed time to live.
///
/// `TtlCache` is _not_ thread-safe and never touches the disk. Expiry is lazy:
/// every [`invoke`](#method.invoke) checks the oldest entry only, and removes it
/// if it is older than the time to live.
///
/// # Limitation
///
/// Since at most one entry expires per call, a burst of entries that went stale
/// between two calls is drained one call at a time. Until then, `invoke` may
/// return the value of an entry that is already past its time to live, as long
/// as it is not the oldest one.
///
/// # Examples
///
/// ```rust
/// use pmemo::unsync::TtlCache;
/// use std::time::Duration;
///
/// let mut cache = TtlCache::new(Duration::from_secs(60), |name: &String| name.len());
///
/// assert_eq!(cache.invoke("pmemo".to_string()), 5);
/// assert_eq!(cache.get(&"pmemo".to_string()), Some(&5));
/// ```
pub struct TtlCache<K, V> {
    time_to_live: Duration,
    loader: Box<dyn FnMut(&K) -> V>,
    store: EntryStore<K, Stamped<V>>,
    clock: Clock,
}

impl<K, V> fmt::Debug for TtlCache<K, V>
where
    K: Hash + Eq,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("time_to_live", &self.time_to_live)
            .field("entry_count", &self.store.len())
            .finish()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Creates a cache of `loader` whose entries live for `time_to_live`.
    ///
    /// # Panics
    ///
    /// Panics if `time_to_live` is longer than 1000 years.
    pub fn new(time_to_live: Duration, loader: impl FnMut(&K) -> V + 'static) -> Self {
        Self::with_clock(time_to_live, Box::new(loader), Clock::new())
    }

    pub(crate) fn with_clock(
        time_to_live: Duration,
        loader: Box<dyn FnMut(&K) -> V>,
        clock: Clock,
    ) -> Self {
        builder_utils::ensure_time_to_live_or_panic(time_to_live);
        Self {
            time_to_live,
            loader,
            store: EntryStore::new(None),
            clock,
        }
    }

    pub fn time_to_live(&self) -> Duration {
        self.time_to_live
    }

    /// Returns the value for the key, calling the wrapped function if it is
    /// not cached.
    pub fn invoke(&mut self, key: K) -> V {
        let now = self.clock.now();
        self.evict_oldest_if_expired(now);

        if let Some(entry) = self.store.get(&key) {
            return entry.value.clone();
        }

        let value = (self.loader)(&key);
        self.store.put(
            key,
            Stamped {
                value: value.clone(),
                stored_at: now,
            },
        );
        value
    }

    /// Returns the cached value for the key without calling the wrapped
    /// function or expiring anything.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.store.get(key).map(|entry| &entry.value)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.store.contains_key(key)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.store.remove(key).map(|entry| entry.value)
    }

    pub fn clear(&mut self) {
        self.store.clear();
    }

    pub fn entry_count(&self) -> usize {
        self.store.len()
    }

    fn evict_oldest_if_expired(&mut self, now: Instant) {
        let expired = self
            .store
            .oldest()
            .map_or(false, |(_, entry)| {
                time::has_expired(entry.stored_at, now, self.time_to_live)
            });
        if expired {
            self.store.evict(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TtlCache;
    use crate::common::time::Clock;

    use std::{cell::RefCell, rc::Rc, time::Duration};

    const TTL: Duration = Duration::from_secs(10);

    fn counting_cache(clock: Clock) -> (TtlCache<u32, String>, Rc<RefCell<Vec<u32>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let calls1 = Rc::clone(&calls);
        let cache = TtlCache::with_clock(
            TTL,
            Box::new(move |key: &u32| {
                calls1.borrow_mut().push(*key);
                format!("value-{key}")
            }),
            clock,
        );
        (cache, calls)
    }

    #[test]
    fn memoizes_until_expired() {
        let (clock, mock) = Clock::mock();
        let (mut cache, calls) = counting_cache(clock);
        assert_eq!(cache.time_to_live(), TTL);

        assert_eq!(cache.invoke(1), "value-1");
        mock.increment(TTL);
        // Exactly the time to live is not expired yet.
        assert_eq!(cache.invoke(1), "value-1");
        assert_eq!(*calls.borrow(), vec![1]);

        mock.increment(Duration::from_secs(1));
        assert_eq!(cache.invoke(1), "value-1");
        assert_eq!(*calls.borrow(), vec![1, 1]);
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn expires_only_the_oldest_entry_per_call() {
        let (clock, mock) = Clock::mock();
        let (mut cache, calls) = counting_cache(clock);

        cache.invoke(1);
        cache.invoke(2);
        cache.invoke(3);
        mock.increment(TTL * 2);

        // The call expires key 1 only; key 3 is stale but still served.
        assert_eq!(cache.invoke(3), "value-3");
        assert!(!cache.contains_key(&1));
        assert!(cache.contains_key(&2));
        assert_eq!(*calls.borrow(), vec![1, 2, 3]);

        // The next call expires key 2.
        cache.invoke(3);
        assert!(!cache.contains_key(&2));
        assert_eq!(cache.entry_count(), 1);

        // Then key 3 itself goes, and is fetched again in the same call.
        assert_eq!(cache.invoke(3), "value-3");
        assert_eq!(*calls.borrow(), vec![1, 2, 3, 3]);
    }

    #[test]
    fn manual_operations() {
        let (clock, _mock) = Clock::mock();
        let (mut cache, calls) = counting_cache(clock);

        cache.invoke(7);
        assert_eq!(cache.get(&7).map(String::as_str), Some("value-7"));
        assert_eq!(cache.remove(&7), Some("value-7".to_string()));
        assert_eq!(cache.get(&7), None);

        cache.invoke(8);
        cache.invoke(9);
        cache.clear();
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(calls.borrow().len(), 3);
        assert!(format!("{cache:?}").contains("entry_count: 0"));
    }

    #[test]
    #[should_panic(expected = "time_to_live is longer than 1000 years")]
    fn too_long_ttl() {
        let thousand_years_secs: u64 = 1000 * 365 * 24 * 3600;
        TtlCache::new(
            Duration::from_secs(thousand_years_secs + 1),
            |key: &u32| *key,
        );
    }
}
