use scheduled_thread_pool::ScheduledThreadPool;

const THREAD_NAME_TEMPLATE: &str = "pmemo-refresh-{}";

/// Worker threads running background refreshes.
///
/// Admission is controlled by the caller (see `sync::scheduler`), so the pool is
/// sized to the in-flight limit and a submitted job never sits in the queue
/// waiting for a thread.
pub(crate) struct RefreshPool {
    pool: ScheduledThreadPool,
    num_threads: usize,
}

impl RefreshPool {
    /// # Panics
    ///
    /// Panics if `num_threads` is zero.
    pub(crate) fn new(num_threads: usize) -> Self {
        assert!(num_threads > 0, "a refresh pool needs at least one thread");
        Self {
            pool: ScheduledThreadPool::with_name(THREAD_NAME_TEMPLATE, num_threads),
            num_threads,
        }
    }

    pub(crate) fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.execute(job);
    }

    pub(crate) fn num_threads(&self) -> usize {
        self.num_threads
    }
}
