//! Resource monitor configuration.

#[derive(Debug, Clone)]
pub struct ResourceMonitorConfig {
    pub poll_interval: std::time::Duration,
    /// RSS bytes at or above which a cache trim is triggered.
    pub soft_memory_threshold_bytes: u64,
    /// RSS bytes at or above which admission is rejected (`service_unavailable`).
    pub hard_memory_threshold_bytes: u64,
    /// Fraction of `fast_tier_max_entries`/`fast_tier_max_bytes` to trim down to
    /// on a soft-threshold breach.
    pub trim_target_fraction: f64,
}

impl Default for ResourceMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: std::time::Duration::from_secs(15),
            soft_memory_threshold_bytes: 1024 * 1024 * 1024,
            hard_memory_threshold_bytes: 2 * 1024 * 1024 * 1024,
            trim_target_fraction: 0.7,
        }
    }
}

impl ResourceMonitorConfig {
    #[must_use]
    pub fn with_soft_memory_threshold_bytes(mut self, n: u64) -> Self {
        self.soft_memory_threshold_bytes = n;
        self
    }

    #[must_use]
    pub fn with_hard_memory_threshold_bytes(mut self, n: u64) -> Self {
        self.hard_memory_threshold_bytes = n;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, d: std::time::Duration) -> Self {
        self.poll_interval = d;
        self
    }
}
