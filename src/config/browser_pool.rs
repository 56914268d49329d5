//! Browser pool configuration.
//!
//! Extends the pool's original `min_pool_size`/`max_pool_size`/`keepalive_interval`/
//! `idle_timeout`/`headless` fields with the recycling and fairness knobs the
//! fairness-queue rewrite needs.

#[derive(Debug, Clone)]
pub struct BrowserPoolConfig {
    pub min_pool_size: usize,
    pub max_pool_size: usize,
    pub keepalive_interval: std::time::Duration,
    pub idle_timeout: std::time::Duration,
    pub headless: bool,
    /// Consecutive `release(.., error)` calls before a browser is recycled.
    pub failure_threshold: u32,
    pub max_age: std::time::Duration,
    pub max_requests: u64,
    /// Grace period given to in-flight handles after `shutdown()` before they
    /// are forcibly released.
    pub shutdown_grace_period: std::time::Duration,
}

impl Default for BrowserPoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: 1,
            max_pool_size: 5,
            keepalive_interval: std::time::Duration::from_secs(30),
            idle_timeout: std::time::Duration::from_secs(300),
            headless: true,
            failure_threshold: 3,
            max_age: std::time::Duration::from_secs(30 * 60),
            max_requests: 500,
            shutdown_grace_period: std::time::Duration::from_secs(10),
        }
    }
}

impl BrowserPoolConfig {
    #[must_use]
    pub fn with_max_pool_size(mut self, n: usize) -> Self {
        self.max_pool_size = n;
        self
    }

    #[must_use]
    pub fn with_min_pool_size(mut self, n: usize) -> Self {
        self.min_pool_size = n;
        self
    }

    #[must_use]
    pub fn with_failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n;
        self
    }

    #[must_use]
    pub fn with_max_age(mut self, d: std::time::Duration) -> Self {
        self.max_age = d;
        self
    }

    #[must_use]
    pub fn with_max_requests(mut self, n: u64) -> Self {
        self.max_requests = n;
        self
    }

    #[must_use]
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }
}
