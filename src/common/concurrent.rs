pub(crate) mod thread_pool;
