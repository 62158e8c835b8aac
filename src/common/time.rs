use std::time::Duration;

pub(crate) type Clock = quanta::Clock;
pub(crate) type Instant = quanta::Instant;

/// Returns `true` when strictly more than `time_to_live` has passed between
/// `stored_at` and `now`. A `now` earlier than `stored_at` counts as no time.
pub(crate) fn has_expired(stored_at: Instant, now: Instant, time_to_live: Duration) -> bool {
    now.saturating_duration_since(stored_at) > time_to_live
}
