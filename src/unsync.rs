//! Provides a non thread-safe memoizing cache with time-to-live expiry.

mod ttl_cache;

pub use ttl_cache::TtlCache;
