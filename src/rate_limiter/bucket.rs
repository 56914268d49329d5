//! Per-client bucket: three fixed/rolling windows, a burst token bucket, and an
//! abuse score, all behind a single mutex.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::EndpointProfile;
use crate::config::RateLimiterConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    PerMinute,
    PerHour,
    PerDay,
    Burst,
    AbuseCooldown,
}

#[derive(Debug, Clone, Copy)]
pub enum Decision {
    Admit,
    Deny {
        retry_after: Duration,
        reason: DenyReason,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct RateBucketSnapshot {
    pub minute_count: u32,
    pub hour_count: u32,
    pub day_count: u32,
    pub abuse_score: f64,
}

/// A single fixed window: resets its count once `period` has elapsed since
/// `window_start`. Simple and sufficient for the boundary contract: the Nth
/// request in a window of N is admitted, the N+1th is denied.
struct Window {
    count: u32,
    window_start: Instant,
    period: Duration,
}

impl Window {
    fn new(now: Instant, period: Duration) -> Self {
        Self {
            count: 0,
            window_start: now,
            period,
        }
    }

    fn reset_if_elapsed(&mut self, now: Instant) {
        if now.duration_since(self.window_start) >= self.period {
            self.count = 0;
            self.window_start = now;
        }
    }

    fn remaining_until_reset(&self, now: Instant) -> Duration {
        self.period
            .saturating_sub(now.duration_since(self.window_start))
    }
}

struct Burst {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Burst {
    fn new(now: Instant, capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            tokens: f64::from(capacity),
            capacity: f64::from(capacity),
            refill_per_sec,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    fn try_take(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_until_one_token(&self) -> Duration {
        if self.refill_per_sec <= 0.0 {
            return Duration::from_secs(1);
        }
        let needed = (1.0 - self.tokens).max(0.0);
        Duration::from_secs_f64(needed / self.refill_per_sec)
    }
}

struct Inner {
    minute: Window,
    hour: Window,
    day: Window,
    burst: Burst,
    abuse_score: f64,
    last_decay: Instant,
    cooldown_until: Option<Instant>,
}

pub struct RateBucket {
    inner: Mutex<Inner>,
}

impl RateBucket {
    pub fn new(base_time: Instant) -> Self {
        Self {
            inner: Mutex::new(Inner {
                minute: Window::new(base_time, Duration::from_secs(60)),
                hour: Window::new(base_time, Duration::from_secs(3600)),
                day: Window::new(base_time, Duration::from_secs(86_400)),
                burst: Burst::new(base_time, 20, 1.0),
                abuse_score: 0.0,
                last_decay: base_time,
                cooldown_until: None,
            }),
        }
    }

    pub fn check(&self, config: &RateLimiterConfig, profile: &EndpointProfile) -> Decision {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(until) = inner.cooldown_until {
            if now < until {
                return Decision::Deny {
                    retry_after: until.saturating_duration_since(now),
                    reason: DenyReason::AbuseCooldown,
                };
            }
            inner.cooldown_until = None;
        }

        inner.minute.reset_if_elapsed(now);
        inner.hour.reset_if_elapsed(now);
        inner.day.reset_if_elapsed(now);

        // Reconfigure windows/burst if the profile's limits changed since the
        // previous check (profiles may be registered after the bucket is created).
        inner.minute.period = Duration::from_secs(60);
        inner.hour.period = Duration::from_secs(3600);
        inner.day.period = Duration::from_secs(86_400);
        inner.burst.capacity = f64::from(profile.burst_capacity);
        inner.burst.refill_per_sec = f64::from(profile.per_minute) / 60.0;

        let (limit_hit, reason) = if inner.minute.count >= profile.per_minute {
            (true, DenyReason::PerMinute)
        } else if inner.hour.count >= profile.per_hour {
            (true, DenyReason::PerHour)
        } else if inner.day.count >= profile.per_day {
            (true, DenyReason::PerDay)
        } else if !inner.burst.try_take(now) {
            (true, DenyReason::Burst)
        } else {
            (false, DenyReason::Burst)
        };

        if limit_hit {
            let retry_after = match reason {
                DenyReason::PerMinute => inner.minute.remaining_until_reset(now),
                DenyReason::PerHour => inner.hour.remaining_until_reset(now),
                DenyReason::PerDay => inner.day.remaining_until_reset(now),
                DenyReason::Burst => inner.burst.time_until_one_token(),
                DenyReason::AbuseCooldown => Duration::ZERO,
            };
            Self::add_abuse_score_locked(
                &mut inner,
                config.abuse_score_deny_step,
                config.abuse_score_cooldown_threshold,
                config.abuse_score_cooldown,
            );
            return Decision::Deny { retry_after, reason };
        }

        inner.minute.count += 1;
        inner.hour.count += 1;
        inner.day.count += 1;
        Decision::Admit
    }

    pub fn add_abuse_signal(&self, step: f64, cooldown_threshold: f64, cooldown: Duration) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Self::add_abuse_score_locked(&mut inner, step, cooldown_threshold, cooldown);
    }

    fn add_abuse_score_locked(inner: &mut Inner, step: f64, cooldown_threshold: f64, cooldown: Duration) {
        inner.abuse_score = (inner.abuse_score + step).min(10.0);
        if inner.abuse_score >= cooldown_threshold && inner.cooldown_until.is_none() {
            inner.cooldown_until = Some(Instant::now() + cooldown);
        }
    }

    pub fn decay(&self, rate_per_sec: f64) {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let elapsed = now.duration_since(inner.last_decay).as_secs_f64();
        inner.abuse_score = (inner.abuse_score - elapsed * rate_per_sec).max(0.0);
        inner.last_decay = now;
    }

    pub fn snapshot(&self) -> RateBucketSnapshot {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        RateBucketSnapshot {
            minute_count: inner.minute.count,
            hour_count: inner.hour.count,
            day_count: inner.day.count,
            abuse_score: inner.abuse_score,
        }
    }
}
