//! Provides the thread-safe, persistent memoizing cache.

mod builder;
mod cache;
mod scheduler;
mod stats_counter;

pub use {builder::CacheBuilder, cache::Cache};
