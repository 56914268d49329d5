//! Cache tier configuration.

/// Eviction strategy selectable at construction; concrete strategies are tagged
/// variants rather than a type hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    #[default]
    Lru,
    Ttl,
    Hybrid,
    /// `score = freq * recency / size`; evict the lowest score.
    Smart,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub fast_tier_enabled: bool,
    pub fast_tier_max_entries: usize,
    pub fast_tier_max_bytes: u64,
    pub fast_tier_ttl: std::time::Duration,
    pub durable_tier_enabled: bool,
    pub durable_tier_ttl: std::time::Duration,
    pub durable_tier_timeout: std::time::Duration,
    pub eviction_policy: EvictionPolicy,
    /// TTL applied when a durable-tier hit is promoted into the fast tier;
    /// intentionally shorter than `fast_tier_ttl` so a promoted entry expires
    /// from the fast tier before the source-of-truth durable entry would.
    pub promotion_ttl: std::time::Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fast_tier_enabled: true,
            fast_tier_max_entries: 10_000,
            fast_tier_max_bytes: 256 * 1024 * 1024,
            fast_tier_ttl: std::time::Duration::from_secs(3600),
            durable_tier_enabled: false,
            durable_tier_ttl: std::time::Duration::from_secs(86_400),
            durable_tier_timeout: std::time::Duration::from_millis(500),
            eviction_policy: EvictionPolicy::Lru,
            promotion_ttl: std::time::Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn with_fast_tier_max_entries(mut self, n: usize) -> Self {
        self.fast_tier_max_entries = n;
        self
    }

    #[must_use]
    pub fn with_fast_tier_max_bytes(mut self, n: u64) -> Self {
        self.fast_tier_max_bytes = n;
        self
    }

    #[must_use]
    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    #[must_use]
    pub fn with_durable_tier_enabled(mut self, enabled: bool) -> Self {
        self.durable_tier_enabled = enabled;
        self
    }
}
