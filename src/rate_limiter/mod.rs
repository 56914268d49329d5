//! Per-client admission control: sliding windows, a burst bucket, and abuse scoring.
//!
//! Grounds: the sharded `DashMap<String, _>` keyed by client, one guarded
//! bucket per key, follows the same domain-keyed `DashMap<String, Arc<_>>`
//! sharding shape used elsewhere in this codebase's request throttling, here
//! with per-client state instead of per-domain. Each bucket tracks four
//! independent window counters plus a decaying abuse score, which doesn't fit
//! a single packed atomic, so the per-bucket state is a
//! `std::sync::Mutex`-guarded struct instead.

mod bucket;

pub use bucket::{Decision, DenyReason, RateBucketSnapshot};

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

use crate::config::RateLimiterConfig;
use bucket::RateBucket;

/// Per-endpoint override of the default limits; falls back to the client's
/// default bucket when no profile is registered for an endpoint.
#[derive(Debug, Clone)]
pub struct EndpointProfile {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
    pub burst_capacity: u32,
}

impl From<&RateLimiterConfig> for EndpointProfile {
    fn from(config: &RateLimiterConfig) -> Self {
        Self {
            per_minute: config.per_minute,
            per_hour: config.per_hour,
            per_day: config.per_day,
            burst_capacity: config.burst_capacity,
        }
    }
}

/// Admission-control gate in front of the Scraping Service.
pub struct RateLimiter {
    config: RateLimiterConfig,
    buckets: DashMap<String, Arc<RateBucket>>,
    profiles: DashMap<String, EndpointProfile>,
    base_time: Instant,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
            profiles: DashMap::new(),
            base_time: Instant::now(),
        }
    }

    /// Register a stricter (or looser) limit profile for a specific endpoint.
    pub fn set_endpoint_profile(&self, endpoint: impl Into<String>, profile: EndpointProfile) {
        self.profiles.insert(endpoint.into(), profile);
    }

    fn profile_for(&self, endpoint: &str) -> EndpointProfile {
        self.profiles
            .get(endpoint)
            .map(|p| p.clone())
            .unwrap_or_else(|| EndpointProfile::from(&self.config))
    }

    fn bucket_for(&self, client_id: &str) -> Arc<RateBucket> {
        self.buckets
            .entry(client_id.to_string())
            .or_insert_with(|| Arc::new(RateBucket::new(self.base_time)))
            .clone()
    }

    /// Admission check. All four counters (minute/hour/day/burst) must be
    /// below their limits or the request is denied with the most imminent reset.
    pub fn check(&self, client_id: &str, endpoint: &str) -> Decision {
        let bucket = self.bucket_for(client_id);
        let profile = self.profile_for(endpoint);
        bucket.check(&self.config, &profile)
    }

    /// Record an abuse signal (bad/missing user-agent, identical-request burst)
    /// that raises `abuse_score` without counting as a denial.
    pub fn record_abuse_signal(&self, client_id: &str) {
        self.bucket_for(client_id).add_abuse_signal(
            self.config.abuse_score_signal_step,
            self.config.abuse_score_cooldown_threshold,
            self.config.abuse_score_cooldown,
        );
    }

    /// Decay `abuse_score` toward zero after a successful response.
    pub fn on_response_ok(&self, client_id: &str) {
        self.bucket_for(client_id)
            .decay(self.config.abuse_score_decay_per_sec);
    }

    /// Snapshot of a client's current bucket state, for `stats()`.
    #[must_use]
    pub fn snapshot(&self, client_id: &str) -> Option<RateBucketSnapshot> {
        self.buckets.get(client_id).map(|b| b.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(per_minute: u32) -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            per_minute,
            per_hour: per_minute * 100,
            per_day: per_minute * 1000,
            burst_capacity: per_minute,
            ..RateLimiterConfig::default()
        })
    }

    #[test]
    fn admits_up_to_the_limit_then_denies() {
        let limiter = limiter(2);
        assert!(matches!(limiter.check("c1", "scrape"), Decision::Admit));
        assert!(matches!(limiter.check("c1", "scrape"), Decision::Admit));
        match limiter.check("c1", "scrape") {
            Decision::Deny { retry_after, .. } => assert!(retry_after > std::time::Duration::ZERO),
            Decision::Admit => panic!("expected deny at the boundary"),
        }
    }

    #[test]
    fn denial_increments_abuse_score() {
        let limiter = limiter(1);
        let _ = limiter.check("c1", "scrape");
        let _ = limiter.check("c1", "scrape"); // denied
        let snapshot = limiter.snapshot("c1").unwrap();
        assert!(snapshot.abuse_score > 0.0);
    }

    #[test]
    fn cooldown_denies_regardless_of_counters() {
        let limiter = limiter(1000);
        for _ in 0..20 {
            limiter.record_abuse_signal("c1");
        }
        match limiter.check("c1", "scrape") {
            Decision::Deny { reason, .. } => assert_eq!(reason, DenyReason::AbuseCooldown),
            Decision::Admit => panic!("expected cooldown deny"),
        }
    }

    #[test]
    fn on_response_ok_decays_abuse_score() {
        let limiter = limiter(1);
        let _ = limiter.check("c1", "scrape");
        let _ = limiter.check("c1", "scrape"); // denied, raises abuse_score
        let before = limiter.snapshot("c1").unwrap().abuse_score;
        std::thread::sleep(std::time::Duration::from_millis(50));
        limiter.on_response_ok("c1");
        let after = limiter.snapshot("c1").unwrap().abuse_score;
        assert!(after <= before);
    }

    #[test]
    fn endpoint_profile_overrides_defaults() {
        let limiter = limiter(1000);
        limiter.set_endpoint_profile(
            "scrape",
            EndpointProfile {
                per_minute: 1,
                per_hour: 1000,
                per_day: 10000,
                burst_capacity: 1,
            },
        );
        assert!(matches!(limiter.check("c1", "scrape"), Decision::Admit));
        assert!(matches!(limiter.check("c1", "scrape"), Decision::Deny { .. }));
        // A different endpoint on the same client still uses the default profile.
        assert!(matches!(limiter.check("c1", "other"), Decision::Admit));
    }
}
