//! Rate limiter configuration.

/// Defaults are a recorded product decision (DESIGN.md) — the source spec
/// leaves the exact numbers open.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
    pub burst_capacity: u32,
    /// `abuse_score` added per denied request.
    pub abuse_score_deny_step: f64,
    /// `abuse_score` added per non-denial abuse signal (bad UA, identical-request burst).
    pub abuse_score_signal_step: f64,
    /// `abuse_score` decay per second via `on_response_ok`.
    pub abuse_score_decay_per_sec: f64,
    /// Threshold at or above which admission is denied regardless of counters.
    pub abuse_score_cooldown_threshold: f64,
    pub abuse_score_cooldown: std::time::Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            per_minute: 100,
            per_hour: 2_000,
            per_day: 20_000,
            burst_capacity: 20,
            abuse_score_deny_step: 1.0,
            abuse_score_signal_step: 0.5,
            abuse_score_decay_per_sec: 0.1,
            abuse_score_cooldown_threshold: 8.0,
            abuse_score_cooldown: std::time::Duration::from_secs(60),
        }
    }
}

impl RateLimiterConfig {
    #[must_use]
    pub fn with_per_minute(mut self, n: u32) -> Self {
        self.per_minute = n;
        self
    }

    #[must_use]
    pub fn with_per_hour(mut self, n: u32) -> Self {
        self.per_hour = n;
        self
    }

    #[must_use]
    pub fn with_per_day(mut self, n: u32) -> Self {
        self.per_day = n;
        self
    }

    #[must_use]
    pub fn with_burst_capacity(mut self, n: u32) -> Self {
        self.burst_capacity = n;
        self
    }
}
