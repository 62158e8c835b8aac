use num_traits::{NumCast, ToPrimitive};
use std::{fmt, sync::Arc};

/// A function computing a placeholder value out of the values currently held by
/// a cache. The values are given from the oldest to the newest entry.
pub type Extrapolator<V> = Arc<dyn Fn(&[V]) -> V + Send + Sync + 'static>;

/// Tells a [`sync::Cache`][cache-struct] what to return on a miss.
///
/// With `Enabled`, a miss returns the extrapolated value right away and the real
/// value is fetched by a background worker. With `Disabled`, a miss fetches the
/// value on the calling thread.
///
/// [cache-struct]: ./sync/struct.Cache.html
pub enum Extrapolation<V> {
    Disabled,
    Enabled(Extrapolator<V>),
}

impl<V> Extrapolation<V> {
    /// Extrapolates with the given closure.
    pub fn with(extrapolate: impl Fn(&[V]) -> V + Send + Sync + 'static) -> Self {
        Self::Enabled(Arc::new(extrapolate))
    }

    /// Extrapolates with the arithmetic mean of the cached values, or `default`
    /// when the cache is empty.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pmemo::Extrapolation;
    ///
    /// let extrapolation = Extrapolation::average(0u32);
    /// assert_eq!(extrapolation.extrapolate(&[2, 4, 6]), Some(4));
    /// assert_eq!(extrapolation.extrapolate(&[]), Some(0));
    /// ```
    pub fn average(default: V) -> Self
    where
        V: Average + Clone + Send + Sync + 'static,
    {
        Self::with(move |values| V::average(values).unwrap_or_else(|| default.clone()))
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    /// Runs the extrapolator, if any.
    pub fn extrapolate(&self, values: &[V]) -> Option<V> {
        match self {
            Self::Disabled => None,
            Self::Enabled(f) => Some(f(values)),
        }
    }
}

impl<V> Clone for Extrapolation<V> {
    fn clone(&self) -> Self {
        match self {
            Self::Disabled => Self::Disabled,
            Self::Enabled(f) => Self::Enabled(Arc::clone(f)),
        }
    }
}

impl<V> Default for Extrapolation<V> {
    fn default() -> Self {
        Self::Disabled
    }
}

impl<V> fmt::Debug for Extrapolation<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::Enabled(_) => f.write_str("Enabled(..)"),
        }
    }
}

/// Types whose values can be averaged by [`Extrapolation::average`].
///
/// Implemented for the primitive numeric types. Integers are summed in a
/// 128-bit accumulator and the mean is truncated toward zero. Floats are
/// averaged in `f64`.
pub trait Average: Sized {
    /// Returns `None` for an empty slice.
    fn average(values: &[Self]) -> Option<Self>;
}

fn float_mean<T>(values: &[T]) -> Option<f64>
where
    T: ToPrimitive,
{
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().map(ToPrimitive::to_f64).sum::<Option<f64>>()?;
    Some(sum / values.len() as f64)
}

macro_rules! impl_average_int {
    ($wide:ty => $($t:ty),* $(,)?) => {
        $(
            impl Average for $t {
                fn average(values: &[Self]) -> Option<Self> {
                    if values.is_empty() {
                        return None;
                    }
                    let sum = values
                        .iter()
                        .try_fold(0, |acc: $wide, &v| acc.checked_add(v as $wide));
                    match sum {
                        // The mean of in-range values is in range.
                        Some(sum) => <$t as NumCast>::from(sum / values.len() as $wide),
                        // Only 128-bit values can overflow the accumulator.
                        None => float_mean(values).map(|m| {
                            <$t as NumCast>::from(m).unwrap_or(if m < 0.0 {
                                <$t>::MIN
                            } else {
                                <$t>::MAX
                            })
                        }),
                    }
                }
            }
        )*
    };
}

macro_rules! impl_average_float {
    ($($t:ty),* $(,)?) => {
        $(
            impl Average for $t {
                fn average(values: &[Self]) -> Option<Self> {
                    float_mean(values).and_then(<$t as NumCast>::from)
                }
            }
        )*
    };
}

impl_average_int!(i128 => i8, i16, i32, i64, i128, isize);
impl_average_int!(u128 => u8, u16, u32, u64, u128, usize);
impl_average_float!(f32, f64);
