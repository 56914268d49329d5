//! Multi-tier cache: fast in-process tier plus an optional durable out-of-process
//! tier, wired together write-through with per-tier TTLs.
//!
//! `fast_tier::FastTier` and `durable_tier::DurableStore` are each
//! self-contained; this module is the orchestration layer: probe fast, fall
//! back to durable, promote on hit, plus the write-through `put`. Glob-style
//! invalidation reuses `FastTier::invalidate_prefix` for the common `prefix*`
//! case and falls back to a full scan for arbitrary globs.

mod durable_tier;
mod fast_tier;

pub use durable_tier::{DurableStore, DurableStoreError, NullDurableStore, RedisDurableStore, TestDurableStore};
pub use fast_tier::FastTier;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::config::CacheConfig;
use crate::fingerprint::{decode, encode, CodecError};

/// Aggregate hit/miss/op counters backing `stats()`.
#[derive(Debug, Default)]
struct Counters {
    fast_hits: AtomicU64,
    durable_hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub fast_tier_entries: usize,
    pub fast_tier_bytes: u64,
    pub fast_hits: u64,
    pub durable_hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub hit_rate: f64,
}

/// Orchestrates the fast and durable tiers behind a single get/put/invalidate
/// surface. Values passed in and returned are already-decoded bytes; encoding
/// into a [`crate::fingerprint::codec`] frame happens once per `put` and is
/// shared across both tiers.
pub struct MultiTierCache {
    config: CacheConfig,
    fast: FastTier,
    durable: Arc<dyn DurableStore>,
    counters: Counters,
}

impl MultiTierCache {
    #[must_use]
    pub fn new(config: CacheConfig, durable: Arc<dyn DurableStore>) -> Self {
        let fast = FastTier::new(&config);
        Self {
            config,
            fast,
            durable,
            counters: Counters::default(),
        }
    }

    /// Build a cache with the durable tier disabled (`NullDurableStore`).
    #[must_use]
    pub fn without_durable_tier(config: CacheConfig) -> Self {
        Self::new(config, Arc::new(NullDurableStore))
    }

    /// Probe the fast tier; on miss, probe the durable tier and promote a hit
    /// back into the fast tier with [`CacheConfig::promotion_ttl`]. Returns the
    /// decoded value, or `None` if absent from both tiers.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        if self.config.fast_tier_enabled {
            if let Some(frame) = self.fast.get(key) {
                self.counters.fast_hits.fetch_add(1, Ordering::Relaxed);
                return decode_or_evict(&self.fast, key, &frame);
            }
        }

        if !self.config.durable_tier_enabled {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        match self.durable.get(key).await {
            Ok(Some(frame)) => {
                self.counters.durable_hits.fetch_add(1, Ordering::Relaxed);
                let decoded = decode(&frame).ok();
                if decoded.is_some() && self.config.fast_tier_enabled {
                    self.fast
                        .put(key.to_string(), frame, self.config.promotion_ttl);
                }
                decoded
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                warn!(key, error = %e, "durable cache tier failure, treating as miss");
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Write-through: encode once, write to both tiers with their own TTLs. A
    /// durable-tier failure is logged and does not fail the fast-tier write.
    pub async fn put(&self, key: &str, value: &[u8]) -> Result<(), CodecError> {
        let frame = encode(value)?;
        self.counters.puts.fetch_add(1, Ordering::Relaxed);

        if self.config.fast_tier_enabled {
            self.fast
                .put(key.to_string(), frame.clone(), self.config.fast_tier_ttl);
        }

        if self.config.durable_tier_enabled {
            if let Err(e) = self
                .durable
                .set(key, frame, self.config.durable_tier_ttl)
                .await
            {
                warn!(key, error = %e, "durable cache tier write failed");
            }
        }

        Ok(())
    }

    /// Remove an exact key from both tiers.
    pub async fn invalidate(&self, key: &str) {
        self.fast.invalidate_prefix(key);
        if self.config.durable_tier_enabled {
            if let Err(e) = self.durable.del(key).await {
                warn!(key, error = %e, "durable cache tier delete failed");
            }
        }
    }

    /// Remove every fast-tier key matching a glob `pattern` (`*` and `?`
    /// wildcards). The durable tier has no native glob scan; callers that need
    /// cross-tier invalidation by pattern should also delete known exact keys.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        if let Some(prefix) = pattern.strip_suffix('*') {
            if !prefix.contains(['*', '?']) {
                return self.fast.invalidate_prefix(prefix);
            }
        }
        self.fast.invalidate_matching(|key| glob_match(pattern, key))
    }

    /// Evict the coldest fast-tier entries down to `fraction` of capacity.
    /// Invoked by the Resource Monitor on a soft memory-threshold breach
    ///; a no-op on the durable tier, which is expected to manage its
    /// own eviction (e.g. Redis `maxmemory-policy`).
    pub fn trim(&self, fraction: f64) -> usize {
        self.fast.trim_to_fraction(fraction)
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let fast_hits = self.counters.fast_hits.load(Ordering::Relaxed);
        let durable_hits = self.counters.durable_hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let total = fast_hits + durable_hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            (fast_hits + durable_hits) as f64 / total as f64
        };
        CacheStats {
            fast_tier_entries: self.fast.len(),
            fast_tier_bytes: self.fast.current_bytes(),
            fast_hits,
            durable_hits,
            misses,
            puts: self.counters.puts.load(Ordering::Relaxed),
            hit_rate,
        }
    }
}

fn decode_or_evict(fast: &FastTier, key: &str, frame: &[u8]) -> Option<Vec<u8>> {
    match decode(frame) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "corrupt cache frame, evicting");
            fast.invalidate_prefix(key);
            None
        }
    }
}

/// Minimal `*`/`?` glob matcher sufficient for cache-key patterns; no bracket
/// classes or escaping, matching the limited pattern language `invalidate_cache`
/// exposes externally.
fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => inner(&p[1..], t) || (!t.is_empty() && inner(p, &t[1..])),
            (Some(b'?'), Some(_)) => inner(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc == tc => inner(&p[1..], &t[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cache() -> MultiTierCache {
        MultiTierCache::new(
            CacheConfig {
                durable_tier_enabled: true,
                ..CacheConfig::default()
            },
            Arc::new(TestDurableStore::new()),
        )
    }

    #[tokio::test]
    async fn put_then_get_round_trips_through_fast_tier() {
        let cache = cache();
        cache.put("k1", b"hello").await.unwrap();
        assert_eq!(cache.get("k1").await, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn durable_hit_is_promoted_into_fast_tier() {
        let cache = cache();
        let frame = encode(b"from durable").unwrap();
        cache.durable.set("k2", frame, Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.get("k2").await, Some(b"from durable".to_vec()));
        assert_eq!(cache.fast.get("k2").is_some(), true);
    }

    #[tokio::test]
    async fn miss_on_both_tiers_returns_none() {
        let cache = cache();
        assert_eq!(cache.get("missing").await, None);
    }

    #[tokio::test]
    async fn invalidate_then_get_is_none() {
        let cache = cache();
        cache.put("k3", b"x").await.unwrap();
        cache.invalidate("k3").await;
        assert_eq!(cache.get("k3").await, None);
    }

    #[tokio::test]
    async fn glob_pattern_invalidates_matching_keys() {
        let cache = cache();
        cache.put("url:a:1", b"x").await.unwrap();
        cache.put("url:a:2", b"x").await.unwrap();
        cache.put("url:b:1", b"x").await.unwrap();

        let removed = cache.invalidate_pattern("url:a:*");
        assert_eq!(removed, 2);
        assert_eq!(cache.fast.get("url:b:1").is_some(), true);
    }

    #[tokio::test]
    async fn second_put_overwrites_first_never_observes_stale_value() {
        let cache = cache();
        cache.put("k4", b"v1").await.unwrap();
        cache.put("k4", b"v2").await.unwrap();
        assert_eq!(cache.get("k4").await, Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn stats_report_hits_and_misses() {
        let cache = cache();
        cache.put("k5", b"x").await.unwrap();
        let _ = cache.get("k5").await;
        let _ = cache.get("nope").await;
        let stats = cache.stats();
        assert_eq!(stats.fast_hits, 1);
        assert_eq!(stats.misses, 1);
        assert!(stats.hit_rate > 0.0 && stats.hit_rate < 1.0);
    }
}
