use std::time::Duration;

const YEAR_SECONDS: u64 = 365 * 24 * 3600;

pub(crate) fn ensure_time_to_live_or_panic(time_to_live: Duration) {
    let max_duration = Duration::from_secs(1_000 * YEAR_SECONDS);
    assert!(
        time_to_live <= max_duration,
        "time_to_live is longer than 1000 years"
    );
}

// The name becomes part of the snapshot file name when the storage path is a
// directory.
pub(crate) fn ensure_function_name_or_panic(name: &str) {
    assert!(!name.is_empty(), "function name must not be empty");
    assert!(
        !name.contains(['/', '\\']),
        "function name must not contain a path separator"
    );
}
