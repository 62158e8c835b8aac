use std::{
    any::Any,
    borrow::Cow,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::notification::{FailureListener, RefreshFailure};

pub(crate) struct FailureNotifier<K, E> {
    listener: FailureListener<K, E>,
    is_enabled: AtomicBool,
    cache_name: String,
}

impl<K, E> FailureNotifier<K, E> {
    pub(crate) fn new(listener: FailureListener<K, E>, cache_name: String) -> Self {
        Self {
            listener,
            is_enabled: AtomicBool::new(true),
            cache_name,
        }
    }

    pub(crate) fn notify(&self, key: Arc<K>, failure: RefreshFailure<E>) {
        use std::panic::{catch_unwind, AssertUnwindSafe};

        if !self.is_enabled.load(Ordering::Acquire) {
            return;
        }

        let listener_clo = || (self.listener)(key, failure);

        // Safety: It is safe to assert unwind safety here because we will not
        // call the listener again if it has been panicked.
        let result = catch_unwind(AssertUnwindSafe(listener_clo));
        if let Err(payload) = result {
            self.is_enabled.store(false, Ordering::Release);
            let cn = &self.cache_name;
            match panic_message(&*payload) {
                Some(m) => {
                    log::error!("[{cn}] Disabled the failure listener because it panicked at '{m}'")
                }
                None => log::error!("[{cn}] Disabled the failure listener because it panicked"),
            }
        }
    }
}

/// Extracts the message of a panic payload when it is a `&str` or a `String`.
pub(crate) fn panic_message<'a>(
    payload: &'a (dyn Any + Send + 'static),
) -> Option<Cow<'a, str>> {
    (payload.downcast_ref::<&str>().map(|s| (*s).into()))
        .or_else(|| payload.downcast_ref::<String>().map(|s| s.as_str().into()))
}
