//! Resource monitor: periodic and on-demand memory back-pressure, cache
//! trimming, and browser-pool staleness scanning.
//!
//! Grounds: the `AtomicBool` back-pressure flag plus a periodic `tokio::spawn`
//! loop follows the same shape `browser_pool`'s `health_check_loop` uses for
//! its own out-of-band maintenance; `sample()`'s graceful degradation to `0`
//! on non-Linux means a missing `/proc/self/statm` never prevents startup.

mod memory;

pub use memory::sample_rss_bytes;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::browser_pool::BrowserPool;
use crate::cache::MultiTierCache;
use crate::config::ResourceMonitorConfig;

/// Outcome of the most recent trim/cleanup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// No threshold was breached; nothing was done.
    NotNeeded,
    /// The cache was trimmed toward `trim_target_fraction`.
    CacheTrimmed,
    /// The hard threshold was breached; back-pressure is active.
    BackPressureActive,
}

/// Point-in-time resource report.
#[derive(Debug, Clone)]
pub struct ResourceReport {
    pub current_rss_bytes: u64,
    pub peak_rss_bytes: u64,
    /// Positive: memory is trending up since the previous sample.
    pub trend_bytes: i64,
    pub last_cleanup: CleanupOutcome,
    pub back_pressure: bool,
}

/// Background memory/resource watchdog. Share behind an `Arc` and call
/// [`ResourceMonitor::start`] once; [`ResourceMonitor::check_now`] drives an
/// on-demand pass (e.g. before task admission).
pub struct ResourceMonitor {
    config: ResourceMonitorConfig,
    cache: Arc<MultiTierCache>,
    browser_pool: Arc<BrowserPool>,
    last_rss: AtomicU64,
    peak_rss: AtomicU64,
    back_pressure: AtomicBool,
    last_outcome: parking_lot::Mutex<CleanupOutcome>,
}

impl ResourceMonitor {
    #[must_use]
    pub fn new(
        config: ResourceMonitorConfig,
        cache: Arc<MultiTierCache>,
        browser_pool: Arc<BrowserPool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            cache,
            browser_pool,
            last_rss: AtomicU64::new(0),
            peak_rss: AtomicU64::new(0),
            back_pressure: AtomicBool::new(false),
            last_outcome: parking_lot::Mutex::new(CleanupOutcome::NotNeeded),
        })
    }

    /// Start the periodic background pass. Callers invoke this exactly once.
    pub fn start(self: &Arc<Self>) {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.config.poll_interval);
            loop {
                interval.tick().await;
                monitor.check_now().await;
            }
        });
    }

    /// Whether admission should be rejected with `service_unavailable`
    ///. Checked by the Scraping Service before
    /// step 1 of the request flow.
    #[must_use]
    pub fn back_pressure(&self) -> bool {
        self.back_pressure.load(Ordering::Acquire)
    }

    /// Run one sample-and-react pass on demand; also invoked periodically by
    /// [`Self::start`].
    pub async fn check_now(&self) -> ResourceReport {
        let current = memory::sample_rss_bytes();
        let previous = self.last_rss.swap(current, Ordering::AcqRel);
        self.peak_rss.fetch_max(current, Ordering::AcqRel);

        let outcome = if current >= self.config.hard_memory_threshold_bytes && current > 0 {
            self.back_pressure.store(true, Ordering::Release);
            self.cache.trim(self.config.trim_target_fraction);
            self.trim_allocator();
            CleanupOutcome::BackPressureActive
        } else if current >= self.config.soft_memory_threshold_bytes && current > 0 {
            self.back_pressure.store(false, Ordering::Release);
            let removed = self.cache.trim(self.config.trim_target_fraction);
            debug!(removed, "resource monitor trimmed fast cache tier");
            self.trim_allocator();
            CleanupOutcome::CacheTrimmed
        } else {
            self.back_pressure.store(false, Ordering::Release);
            CleanupOutcome::NotNeeded
        };

        self.browser_pool.run_health_pass_now().await;

        *self.last_outcome.lock() = outcome;
        if outcome == CleanupOutcome::BackPressureActive {
            info!(current, hard_threshold = self.config.hard_memory_threshold_bytes, "resource monitor back-pressure engaged");
        }

        #[allow(clippy::cast_possible_wrap)]
        ResourceReport {
            current_rss_bytes: current,
            peak_rss_bytes: self.peak_rss.load(Ordering::Acquire),
            trend_bytes: current as i64 - previous as i64,
            last_cleanup: outcome,
            back_pressure: self.back_pressure(),
        }
    }

    #[must_use]
    pub fn report(&self) -> ResourceReport {
        #[allow(clippy::cast_possible_wrap)]
        ResourceReport {
            current_rss_bytes: self.last_rss.load(Ordering::Acquire),
            peak_rss_bytes: self.peak_rss.load(Ordering::Acquire),
            trend_bytes: 0,
            last_cleanup: *self.last_outcome.lock(),
            back_pressure: self.back_pressure(),
        }
    }

    #[cfg(feature = "mm-trim")]
    fn trim_allocator(&self) {
        #[cfg(target_os = "linux")]
        unsafe {
            libc::malloc_trim(0);
        }
    }

    #[cfg(not(feature = "mm-trim"))]
    fn trim_allocator(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrowserPoolConfig, CacheConfig};

    fn monitor(config: ResourceMonitorConfig) -> Arc<ResourceMonitor> {
        let cache = Arc::new(MultiTierCache::without_durable_tier(CacheConfig::default()));
        let pool = BrowserPool::new(BrowserPoolConfig::default());
        ResourceMonitor::new(config, cache, pool)
    }

    #[tokio::test]
    async fn below_both_thresholds_reports_not_needed() {
        let monitor = monitor(ResourceMonitorConfig {
            soft_memory_threshold_bytes: u64::MAX,
            hard_memory_threshold_bytes: u64::MAX,
            ..ResourceMonitorConfig::default()
        });
        let report = monitor.check_now().await;
        assert_eq!(report.last_cleanup, CleanupOutcome::NotNeeded);
        assert!(!report.back_pressure);
    }

    #[tokio::test]
    async fn hard_threshold_of_zero_immediately_engages_back_pressure() {
        let monitor = monitor(ResourceMonitorConfig {
            soft_memory_threshold_bytes: 0,
            hard_memory_threshold_bytes: 0,
            ..ResourceMonitorConfig::default()
        });
        let report = monitor.check_now().await;
        if report.current_rss_bytes > 0 {
            assert_eq!(report.last_cleanup, CleanupOutcome::BackPressureActive);
            assert!(monitor.back_pressure());
        }
    }

    #[tokio::test]
    async fn recovering_below_soft_threshold_clears_back_pressure() {
        let monitor = monitor(ResourceMonitorConfig {
            soft_memory_threshold_bytes: 0,
            hard_memory_threshold_bytes: 0,
            ..ResourceMonitorConfig::default()
        });
        monitor.check_now().await;

        let cleared = Arc::new(ResourceMonitor {
            config: ResourceMonitorConfig {
                soft_memory_threshold_bytes: u64::MAX,
                hard_memory_threshold_bytes: u64::MAX,
                ..ResourceMonitorConfig::default()
            },
            cache: Arc::clone(&monitor.cache),
            browser_pool: Arc::clone(&monitor.browser_pool),
            last_rss: AtomicU64::new(0),
            peak_rss: AtomicU64::new(0),
            back_pressure: AtomicBool::new(true),
            last_outcome: parking_lot::Mutex::new(CleanupOutcome::BackPressureActive),
        });
        let report = cleared.check_now().await;
        assert!(!report.back_pressure);
    }
}
