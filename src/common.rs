pub(crate) mod builder_utils;
pub(crate) mod concurrent;
pub(crate) mod error;
pub(crate) mod store;
pub(crate) mod time;

/// Default upper bound of the number of entries (before the eviction slack).
pub(crate) const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Default number of successful fetches between two saves of the snapshot.
pub(crate) const DEFAULT_WRITE_BEHIND_COUNT: usize = 10;

/// Default number of background refreshes that may run at the same time.
pub(crate) const DEFAULT_MAX_THREADS: usize = 10;
