//! Layered, builder-pattern configuration for every engine component.
//!
//! Follows the same `with_x(mut self, ...) -> Self` builder idiom and
//! `#[serde(skip)]`-on-non-serializable-fields convention as the crate this was
//! distilled from (see its original `CrawlConfig`), generalized into one
//! top-level `EngineConfig` composing a sub-config per component instead of one
//! flat struct covering a single crawl run.

mod browser_pool;
mod cache;
mod rate_limiter;
mod resource_monitor;
mod task_manager;
mod types;

pub use browser_pool::BrowserPoolConfig;
pub use cache::{CacheConfig, EvictionPolicy};
pub use rate_limiter::RateLimiterConfig;
pub use resource_monitor::ResourceMonitorConfig;
pub use task_manager::TaskManagerConfig;
pub use types::{OutputFormat, Priority};

/// Top-level configuration composing every component's sub-config.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub rate_limiter: RateLimiterConfig,
    pub cache: CacheConfig,
    pub browser_pool: BrowserPoolConfig,
    pub task_manager: TaskManagerConfig,
    pub resource_monitor: ResourceMonitorConfig,
    /// Per-task deadline for the browser-acquire step.
    pub browser_wait_timeout: std::time::Duration,
    /// Per-task deadline for navigation + extraction.
    pub page_timeout: std::time::Duration,
    /// Per-task deadline for the LLM call.
    pub llm_timeout: std::time::Duration,
    /// Upper bound on how long a cancelled task may keep running before the
    /// worker observes the cancellation flag.
    pub max_cancellation_latency: std::time::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rate_limiter: RateLimiterConfig::default(),
            cache: CacheConfig::default(),
            browser_pool: BrowserPoolConfig::default(),
            task_manager: TaskManagerConfig::default(),
            resource_monitor: ResourceMonitorConfig::default(),
            browser_wait_timeout: std::time::Duration::from_secs(10),
            page_timeout: std::time::Duration::from_secs(30),
            llm_timeout: std::time::Duration::from_secs(20),
            max_cancellation_latency: std::time::Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_rate_limiter(mut self, config: RateLimiterConfig) -> Self {
        self.rate_limiter = config;
        self
    }

    #[must_use]
    pub fn with_cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    #[must_use]
    pub fn with_browser_pool(mut self, config: BrowserPoolConfig) -> Self {
        self.browser_pool = config;
        self
    }

    #[must_use]
    pub fn with_task_manager(mut self, config: TaskManagerConfig) -> Self {
        self.task_manager = config;
        self
    }

    #[must_use]
    pub fn with_resource_monitor(mut self, config: ResourceMonitorConfig) -> Self {
        self.resource_monitor = config;
        self
    }

    #[must_use]
    pub fn with_browser_wait_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.browser_wait_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_page_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_llm_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.llm_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_cancellation_latency(mut self, latency: std::time::Duration) -> Self {
        self.max_cancellation_latency = latency;
        self
    }
}
