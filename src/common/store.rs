use std::{
    borrow::Borrow,
    collections::{BTreeMap, HashMap},
    hash::Hash,
    sync::Arc,
};

/// Once the store holds this many entries above its `max_entries`, all of the
/// overflow is evicted in a single batch.
pub(crate) const EVICTION_SLACK: usize = 10;

struct Slot<V> {
    value: V,
    rank: u64,
}

/// An insertion-ordered key-value store.
///
/// The write order of the keys doubles as the eviction order: the entry with the
/// smallest rank is the first one to go. Reads never change the order, and
/// overwriting the value of an existing key keeps its original rank.
pub(crate) struct EntryStore<K, V> {
    max_entries: Option<usize>,
    map: HashMap<Arc<K>, Slot<V>>,
    write_order: BTreeMap<u64, Arc<K>>,
    next_rank: u64,
}

impl<K, V> EntryStore<K, V>
where
    K: Hash + Eq,
{
    pub(crate) fn new(max_entries: Option<usize>) -> Self {
        Self {
            max_entries,
            map: HashMap::default(),
            write_order: BTreeMap::default(),
            next_rank: 0,
        }
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key).map(|slot| &slot.value)
    }

    pub(crate) fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Inserts or overwrites the value for the key, then evicts the oldest
    /// entries if the overflow reached `EVICTION_SLACK`.
    ///
    /// Returns the number of evicted entries.
    pub(crate) fn put(&mut self, key: K, value: V) -> usize {
        self.put_shared(Arc::new(key), value)
    }

    pub(crate) fn put_shared(&mut self, key: Arc<K>, value: V) -> usize {
        if let Some(slot) = self.map.get_mut(&key) {
            slot.value = value;
        } else {
            let rank = self.next_rank;
            self.next_rank += 1;
            self.write_order.insert(rank, Arc::clone(&key));
            self.map.insert(key, Slot { value, rank });
        }
        self.evict_overflow()
    }

    pub(crate) fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = self.map.remove(key)?;
        self.write_order.remove(&slot.rank);
        Some(slot.value)
    }

    /// Removes the `count` oldest entries and returns how many were actually
    /// removed. A key that has already left the map is skipped.
    pub(crate) fn evict(&mut self, count: usize) -> usize {
        let mut evicted = 0;
        for _ in 0..count {
            let Some((_rank, key)) = self.write_order.pop_first() else {
                break;
            };
            if self.map.remove(&key).is_some() {
                evicted += 1;
            }
        }
        evicted
    }

    fn evict_overflow(&mut self) -> usize {
        let Some(max) = self.max_entries else {
            return 0;
        };
        let overflow = self.map.len().saturating_sub(max);
        if overflow >= EVICTION_SLACK {
            self.evict(overflow)
        } else {
            0
        }
    }

    /// Returns the entry with the smallest insertion rank.
    pub(crate) fn oldest(&self) -> Option<(&K, &V)> {
        let (_rank, key) = self.write_order.first_key_value()?;
        self.map.get(key).map(|slot| (&**key, &slot.value))
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.map.clear();
        self.write_order.clear();
    }

    /// Iterates the entries from the oldest to the newest.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.write_order
            .values()
            .filter_map(|key| self.map.get(key).map(|slot| (&**key, &slot.value)))
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }
}
