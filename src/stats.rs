/// Cache statistics.
///
/// Returned by [`sync::Cache::stats`][stats-method] as a point-in-time copy of
/// the counters.
///
/// [stats-method]: ./sync/struct.Cache.html#method.stats
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    hit_count: u64,
    miss_count: u64,
    extrapolation_count: u64,
    refresh_count: u64,
    refresh_failure_count: u64,
    save_count: u64,
    save_failure_count: u64,
    eviction_count: u64,
}

impl CacheStats {
    pub(crate) fn set_req_counts(&mut self, hit_count: u64, miss_count: u64) -> &mut Self {
        self.hit_count = hit_count;
        self.miss_count = miss_count;
        self
    }

    pub(crate) fn set_refresh_counts(
        &mut self,
        extrapolation_count: u64,
        refresh_count: u64,
        refresh_failure_count: u64,
    ) -> &mut Self {
        self.extrapolation_count = extrapolation_count;
        self.refresh_count = refresh_count;
        self.refresh_failure_count = refresh_failure_count;
        self
    }

    pub(crate) fn set_persist_counts(
        &mut self,
        save_count: u64,
        save_failure_count: u64,
        eviction_count: u64,
    ) -> &mut Self {
        self.save_count = save_count;
        self.save_failure_count = save_failure_count;
        self.eviction_count = eviction_count;
        self
    }

    pub fn request_count(&self) -> u64 {
        self.hit_count.saturating_add(self.miss_count)
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }

    pub fn hit_rate(&self) -> f64 {
        let req_count = self.request_count();
        if req_count == 0 {
            1.0
        } else {
            self.hit_count as f64 / req_count as f64
        }
    }

    pub fn miss_count(&self) -> u64 {
        self.miss_count
    }

    /// Number of misses answered with an extrapolated value.
    pub fn extrapolation_count(&self) -> u64 {
        self.extrapolation_count
    }

    /// Number of background refreshes started.
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count
    }

    /// Number of background refreshes that returned an error or panicked.
    pub fn refresh_failure_count(&self) -> u64 {
        self.refresh_failure_count
    }

    pub fn save_count(&self) -> u64 {
        self.save_count
    }

    pub fn save_failure_count(&self) -> u64 {
        self.save_failure_count
    }

    pub fn eviction_count(&self) -> u64 {
        self.eviction_count
    }
}

#[cfg(test)]
mod tests {
    use super::CacheStats;

    #[test]
    fn rates() {
        let mut stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 1.0);

        stats.set_req_counts(3, 1);
        assert_eq!(stats.request_count(), 4);
        assert_eq!(stats.hit_rate(), 0.75);

        stats.set_req_counts(u64::MAX, 1);
        assert_eq!(stats.request_count(), u64::MAX);
    }
}
