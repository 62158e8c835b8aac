use super::{cache::Loader, Cache};
use crate::{
    common::{
        builder_utils, DEFAULT_MAX_ENTRIES, DEFAULT_MAX_THREADS, DEFAULT_WRITE_BEHIND_COUNT,
    },
    notification::{FailureListener, RefreshFailure},
    Extrapolation,
};

use serde::{de::DeserializeOwned, Serialize};
use std::{fmt, hash::Hash, path::PathBuf, sync::Arc};

/// Builds a [`Cache`][cache-struct] with various configuration knobs.
///
/// Create one with [`Cache::builder`][builder-method],
/// [`Cache::foreground`][foreground-method] or
/// [`Cache::background`][background-method].
///
/// [cache-struct]: ./struct.Cache.html
/// [builder-method]: ./struct.Cache.html#method.builder
/// [foreground-method]: ./struct.Cache.html#method.foreground
/// [background-method]: ./struct.Cache.html#method.background
///
/// # Examples
///
/// ```rust
/// use pmemo::{sync::Cache, Extrapolation};
///
/// let dir = tempfile::tempdir().unwrap();
///
/// let cache = Cache::builder("lookup", |id: &(u32, u32)| -> Result<f64, String> {
///         Ok(f64::from(id.0) / f64::from(id.1.max(1)))
///     })
///     // Save to `<dir>/memoize_lookup`.
///     .storage_path(dir.path())
///     // Answer misses with the last value while fetching in the background.
///     .extrapolation(Extrapolation::with(|values: &[f64]| {
///         values.last().copied().unwrap_or(f64::NAN)
///     }))
///     // Keep about 1,000 entries.
///     .max_entries(1_000)
///     // Save after every 100 fetches.
///     .write_behind_count(100)
///     // Run up to 4 fetches at a time.
///     .max_threads(4)
///     .failure_listener(|_key, failure| eprintln!("refresh failed: {failure}"))
///     .build();
///
/// assert_eq!(cache.max_threads(), 4);
/// assert_eq!(cache.storage_path(), dir.path().join("memoize_lookup"));
/// ```
pub struct CacheBuilder<K, V, E> {
    name: String,
    loader: Loader<K, V, E>,
    storage_path: Option<PathBuf>,
    extrapolation: Extrapolation<V>,
    max_entries: usize,
    write_behind_count: usize,
    max_threads: usize,
    failure_listener: Option<FailureListener<K, E>>,
    load_on_build: bool,
}

impl<K, V, E> CacheBuilder<K, V, E>
where
    K: Hash + Eq + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    E: fmt::Debug + Send + Sync + 'static,
{
    pub(crate) fn new(name: String, loader: Loader<K, V, E>) -> Self {
        Self {
            name,
            loader,
            storage_path: None,
            extrapolation: Extrapolation::Disabled,
            max_entries: DEFAULT_MAX_ENTRIES,
            write_behind_count: DEFAULT_WRITE_BEHIND_COUNT,
            max_threads: DEFAULT_MAX_THREADS,
            failure_listener: None,
            load_on_build: true,
        }
    }

    /// Builds a `Cache<K, V, E>` and loads the snapshot from its storage path,
    /// unless disabled by `load_on_build(false)`.
    ///
    /// # Panics
    ///
    /// Panics if the function name is empty or contains a path separator.
    pub fn build(self) -> Cache<K, V, E> {
        builder_utils::ensure_function_name_or_panic(&self.name);
        let storage_path = self.storage_path.unwrap_or_else(std::env::temp_dir);
        let cache = Cache::with_everything(
            self.name,
            storage_path,
            self.loader,
            self.extrapolation,
            self.max_entries,
            self.write_behind_count,
            self.max_threads,
            self.failure_listener,
        );
        if self.load_on_build {
            cache.load();
        }
        cache
    }

    /// Sets where the snapshot is stored.
    ///
    /// If the path is an existing directory, the snapshot is stored in the
    /// file `memoize_<name>` inside it. Defaults to the system's temporary
    /// directory.
    pub fn storage_path(self, path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: Some(path.into()),
            ..self
        }
    }

    /// Sets how misses are answered. `Extrapolation::Disabled` makes every
    /// miss fetch on the calling thread.
    pub fn extrapolation(self, extrapolation: Extrapolation<V>) -> Self {
        Self {
            extrapolation,
            ..self
        }
    }

    /// Sets the number of entries above which the oldest ones are evicted.
    pub fn max_entries(self, max_entries: usize) -> Self {
        Self {
            max_entries,
            ..self
        }
    }

    /// Sets the number of successful fetches between two saves of the
    /// snapshot. `0` saves after every fetch.
    pub fn write_behind_count(self, count: usize) -> Self {
        Self {
            write_behind_count: count,
            ..self
        }
    }

    /// Sets the maximum number of background refreshes running at the same
    /// time. `0` disables background refreshes.
    pub fn max_threads(self, max_threads: usize) -> Self {
        Self {
            max_threads,
            ..self
        }
    }

    /// Sets a listener that is called when a background refresh fails.
    ///
    /// Failures are always logged; the listener is an additional hook. A
    /// listener that panics is disabled and never called again.
    pub fn failure_listener(
        self,
        listener: impl Fn(Arc<K>, RefreshFailure<E>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            failure_listener: Some(Arc::new(listener)),
            ..self
        }
    }

    /// Sets whether `build` loads the existing snapshot. Defaults to `true`.
    pub fn load_on_build(self, load: bool) -> Self {
        Self {
            load_on_build: load,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::sync::Cache;
    use crate::Extrapolation;

    use std::{convert::Infallible, path::PathBuf};

    fn double(n: &u32) -> Result<u32, Infallible> {
        Ok(n * 2)
    }

    #[test]
    fn build_cache() {
        let dir = tempfile::tempdir().unwrap();

        let cache = Cache::builder("double", double)
            .storage_path(dir.path())
            .build();
        assert_eq!(cache.name(), "double");
        assert_eq!(cache.max_entries(), 10_000);
        assert_eq!(cache.write_behind_count(), 10);
        assert!(!cache.is_background());
        assert_eq!(cache.storage_path(), dir.path().join("memoize_double"));

        let file = dir.path().join("double.snapshot");
        let cache = Cache::builder("double", double)
            .storage_path(&file)
            .extrapolation(Extrapolation::average(0))
            .max_entries(50)
            .write_behind_count(0)
            .max_threads(3)
            .build();
        assert_eq!(cache.max_entries(), 50);
        assert_eq!(cache.write_behind_count(), 0);
        assert_eq!(cache.max_threads(), 3);
        assert!(cache.is_background());
        assert_eq!(cache.storage_path(), file);
    }

    #[test]
    fn default_storage_is_temp_dir() {
        let cache = Cache::background("pmemo_builder_default", double)
            .load_on_build(false)
            .build();
        assert_eq!(cache.max_threads(), 10);
        assert_eq!(
            cache.storage_path(),
            std::env::temp_dir().join("memoize_pmemo_builder_default")
        );
    }

    #[test]
    fn load_on_build_can_be_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("snapshot");

        let cache = Cache::foreground("double", double)
            .storage_path(&path)
            .build();
        cache.insert(1, 100);
        assert!(cache.save());

        let cache = Cache::foreground("double", double)
            .storage_path(&path)
            .load_on_build(false)
            .build();
        assert!(cache.is_empty());

        let cache = Cache::foreground("double", double)
            .storage_path(&path)
            .build();
        assert_eq!(cache.get(&1), Some(100));
    }

    #[test]
    #[should_panic(expected = "function name must not be empty")]
    fn build_cache_empty_name() {
        Cache::foreground("", double).build();
    }

    #[test]
    #[should_panic(expected = "function name must not contain a path separator")]
    fn build_cache_name_with_separator() {
        Cache::foreground("../escape", double).build();
    }
}
