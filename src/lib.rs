#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! Pmemo is a persistent memoizing cache for Rust.
//!
//! A cache wraps a function and remembers its results, keyed by the function's
//! arguments. The remembered results are saved to a file and loaded back the
//! next time a cache for the same function is built, so an expensive
//! computation survives restarts of the program.
//!
//! Pmemo provides two caches:
//!
//! - A thread-safe [`sync::Cache`][sync-cache-struct], which persists its
//!   entries and can either fetch missing values on the calling thread
//!   (_foreground mode_) or answer misses right away with a value extrapolated
//!   from the cached ones while worker threads fetch the real values
//!   (_background mode_).
//! - A not thread-safe, memory only [`unsync::TtlCache`][unsync-cache-struct],
//!   whose entries expire after a fixed time to live.
//!
//! [sync-cache-struct]: ./sync/struct.Cache.html
//! [unsync-cache-struct]: ./unsync/struct.TtlCache.html
//!
//! # Examples
//!
//! ```rust
//! use pmemo::sync::Cache;
//! use std::convert::Infallible;
//!
//! let dir = tempfile::tempdir().unwrap();
//!
//! let slow_triple = |(a, b): &(i64, String)| -> Result<(i64, String), Infallible> {
//!     // Pretend this takes a long time.
//!     Ok((a * 3, b.repeat(2)))
//! };
//!
//! let cache = Cache::foreground("somecall", slow_triple)
//!     .storage_path(dir.path())
//!     .write_behind_count(1)
//!     .build();
//! assert_eq!(
//!     cache.invoke((9434, "xo".to_string())).unwrap(),
//!     (28302, "xoxo".to_string())
//! );
//!
//! // A new cache for the same function finds the saved result.
//! let cache = Cache::foreground("somecall", slow_triple)
//!     .storage_path(dir.path())
//!     .build();
//! assert!(cache.contains_key(&(9434, "xo".to_string())));
//! ```
//!
//! # Persistence failures
//!
//! Reading or writing the snapshot file never makes the cache unusable. The
//! failures are logged with the [`log`][log-crate] crate, and the explicit
//! [`try_load`][try-load-method] and [`try_save`][try-save-method] methods
//! return them as a [`PersistError`](./enum.PersistError.html).
//!
//! [log-crate]: https://docs.rs/log
//! [try-load-method]: ./sync/struct.Cache.html#method.try_load
//! [try-save-method]: ./sync/struct.Cache.html#method.try_save

pub mod notification;
pub mod stats;
pub mod sync;
pub mod unsync;

pub(crate) mod common;
pub(crate) mod extrapolate;
pub(crate) mod persist;

pub use common::error::PersistError;
pub use extrapolate::{Average, Extrapolation, Extrapolator};
