//! Reporting of background refresh failures.

pub(crate) mod notifier;

use std::{fmt, sync::Arc};

/// A listener called when a background refresh of the given key failed.
pub type FailureListener<K, E> = Arc<dyn Fn(Arc<K>, RefreshFailure<E>) + Send + Sync + 'static>;

/// Describes why a background refresh did not produce a value.
///
/// A failed refresh leaves the key out of the in-flight set, so the next
/// `invoke` for the key starts a new attempt.
#[derive(Debug)]
pub enum RefreshFailure<E> {
    /// The wrapped function returned an error.
    Failed(Arc<E>),
    /// The wrapped function panicked. Holds the panic message when it was a
    /// string.
    Panicked(Option<String>),
}

impl<E> RefreshFailure<E> {
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }
}

impl<E> Clone for RefreshFailure<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Failed(e) => Self::Failed(Arc::clone(e)),
            Self::Panicked(m) => Self::Panicked(m.clone()),
        }
    }
}

impl<E: fmt::Debug> fmt::Display for RefreshFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "the function returned an error: {e:?}"),
            Self::Panicked(Some(m)) => write!(f, "the function panicked at '{m}'"),
            Self::Panicked(None) => f.write_str("the function panicked"),
        }
    }
}
