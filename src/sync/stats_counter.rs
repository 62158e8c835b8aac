use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

use crate::stats::CacheStats;

#[derive(Default)]
pub(crate) struct StatsCounter {
    hit_count: CachePadded<AtomicU64>,
    miss_count: CachePadded<AtomicU64>,
    extrapolation_count: AtomicU64,
    refresh_count: AtomicU64,
    refresh_failure_count: AtomicU64,
    save_count: AtomicU64,
    save_failure_count: AtomicU64,
    eviction_count: AtomicU64,
}

impl StatsCounter {
    pub(crate) fn record_hit(&self) {
        saturating_add(&self.hit_count, 1);
    }

    pub(crate) fn record_miss(&self) {
        saturating_add(&self.miss_count, 1);
    }

    pub(crate) fn record_extrapolation(&self) {
        saturating_add(&self.extrapolation_count, 1);
    }

    pub(crate) fn record_refresh_started(&self) {
        saturating_add(&self.refresh_count, 1);
    }

    pub(crate) fn record_refresh_failure(&self) {
        saturating_add(&self.refresh_failure_count, 1);
    }

    pub(crate) fn record_save(&self) {
        saturating_add(&self.save_count, 1);
    }

    pub(crate) fn record_save_failure(&self) {
        saturating_add(&self.save_failure_count, 1);
    }

    pub(crate) fn record_evictions(&self, count: usize) {
        saturating_add(&self.eviction_count, count as u64);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        fn load(c: &AtomicU64) -> u64 {
            c.load(Ordering::Acquire)
        }

        let mut stats = CacheStats::default();
        stats
            .set_req_counts(load(&self.hit_count), load(&self.miss_count))
            .set_refresh_counts(
                load(&self.extrapolation_count),
                load(&self.refresh_count),
                load(&self.refresh_failure_count),
            )
            .set_persist_counts(
                load(&self.save_count),
                load(&self.save_failure_count),
                load(&self.eviction_count),
            );
        stats
    }
}

fn saturating_add(counter: &AtomicU64, value: u64) {
    let mut v0 = counter.load(Ordering::Acquire);
    loop {
        let v1 = v0.saturating_add(value);
        match counter.compare_exchange_weak(v0, v1, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => break,
            Err(v) => v0 = v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{saturating_add, StatsCounter};
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn saturates() {
        let counter = AtomicU64::new(u64::MAX - 1);
        saturating_add(&counter, 5);
        assert_eq!(counter.load(Ordering::Acquire), u64::MAX);
    }

    #[test]
    fn snapshot_reflects_records() {
        let counter = StatsCounter::default();
        counter.record_hit();
        counter.record_hit();
        counter.record_miss();
        counter.record_extrapolation();
        counter.record_refresh_started();
        counter.record_evictions(10);
        counter.record_save_failure();

        let stats = counter.snapshot();
        assert_eq!(stats.hit_count(), 2);
        assert_eq!(stats.miss_count(), 1);
        assert_eq!(stats.extrapolation_count(), 1);
        assert_eq!(stats.refresh_count(), 1);
        assert_eq!(stats.refresh_failure_count(), 0);
        assert_eq!(stats.save_count(), 0);
        assert_eq!(stats.save_failure_count(), 1);
        assert_eq!(stats.eviction_count(), 10);
    }
}
