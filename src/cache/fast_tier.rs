//! In-process fast tier: a bounded, TTL-aware LRU of compressed frames.

use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::config::{CacheConfig, EvictionPolicy};

struct Entry {
    frame: Vec<u8>,
    stored_at: Instant,
    ttl: Duration,
    hits: u64,
}

impl Entry {
    fn expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }
}

/// Single-process cache tier. Entries carry their own TTL so a promoted
/// durable-tier hit can use [`CacheConfig::promotion_ttl`] while a directly
/// stored entry uses `fast_tier_ttl`.
pub struct FastTier {
    entries: Mutex<LruCache<String, Entry>>,
    policy: EvictionPolicy,
    max_bytes: u64,
    current_bytes: Mutex<u64>,
}

impl FastTier {
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = std::num::NonZeroUsize::new(config.fast_tier_max_entries.max(1))
            .unwrap_or(std::num::NonZeroUsize::new(1).expect("1 is nonzero"));
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            policy: config.eviction_policy,
            max_bytes: config.fast_tier_max_bytes,
            current_bytes: Mutex::new(0),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock();
        let expired = entries.peek(key).is_some_and(Entry::expired);
        if expired {
            if let Some(removed) = entries.pop(key) {
                *self.current_bytes.lock() -= removed.frame.len() as u64;
            }
            return None;
        }
        let entry = entries.get_mut(key)?;
        entry.hits += 1;
        Some(entry.frame.clone())
    }

    pub fn put(&self, key: String, frame: Vec<u8>, ttl: Duration) {
        let size = frame.len() as u64;
        let mut entries = self.entries.lock();
        let mut bytes = self.current_bytes.lock();

        if let Some(old) = entries.peek(&key) {
            *bytes -= old.frame.len() as u64;
        }

        while *bytes + size > self.max_bytes {
            let Some((_, evicted)) = self.evict_one(&mut entries) else {
                break;
            };
            *bytes -= evicted.frame.len() as u64;
        }

        // `push`, not `put`: `put` silently drops any entry the underlying
        // `LruCache` evicts to stay under its entry-count capacity, which would
        // leak that entry's bytes out of `current_bytes` forever and eventually
        // force the byte-budget loop above to evict live entries far below
        // `max_bytes`. `push` returns the evicted entry so its bytes can be
        // subtracted — except when the returned key is `key` itself, which
        // means `push` just reports back the same old entry already accounted
        // for by the `peek` above, not a second, distinct capacity eviction.
        let inserted_key = key.clone();
        if let Some((evicted_key, evicted)) = entries.push(
            key,
            Entry {
                frame,
                stored_at: Instant::now(),
                ttl,
                hits: 0,
            },
        ) {
            if evicted_key != inserted_key {
                *bytes -= evicted.frame.len() as u64;
            }
        }
        *bytes += size;
    }

    /// Remove every key whose normalized form matches `prefix` (a plain string
    /// prefix, not a glob — callers invalidate by URL/fingerprint prefix).
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.lock();
        let to_remove: Vec<String> = entries
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        let mut bytes = self.current_bytes.lock();
        for key in &to_remove {
            if let Some(removed) = entries.pop(key) {
                *bytes -= removed.frame.len() as u64;
            }
        }
        to_remove.len()
    }

    /// Remove every key for which `predicate` returns true. Used for glob-style
    /// invalidation patterns the plain-prefix fast path in
    /// [`crate::cache::MultiTierCache::invalidate_pattern`] can't handle.
    pub fn invalidate_matching(&self, predicate: impl Fn(&str) -> bool) -> usize {
        let mut entries = self.entries.lock();
        let to_remove: Vec<String> = entries
            .iter()
            .filter(|(k, _)| predicate(k))
            .map(|(k, _)| k.clone())
            .collect();
        let mut bytes = self.current_bytes.lock();
        for key in &to_remove {
            if let Some(removed) = entries.pop(key) {
                *bytes -= removed.frame.len() as u64;
            }
        }
        to_remove.len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        *self.current_bytes.lock() = 0;
    }

    /// Evict the coldest entries (per `pick_victim`) until at most
    /// `fraction` of capacity remains occupied, by entry count. Used by the
    /// Resource Monitor on a soft memory-threshold breach.
    pub fn trim_to_fraction(&self, fraction: f64) -> usize {
        let mut entries = self.entries.lock();
        let cap = entries.cap().get();
        #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let target = ((cap as f64) * fraction.clamp(0.0, 1.0)) as usize;

        let mut bytes = self.current_bytes.lock();
        let mut evicted = 0usize;
        while entries.len() > target {
            let Some((_, removed)) = self.evict_one(&mut entries) else {
                break;
            };
            *bytes -= removed.frame.len() as u64;
            evicted += 1;
        }
        evicted
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn current_bytes(&self) -> u64 {
        *self.current_bytes.lock()
    }

    /// Evict according to the configured policy. `Lru` and `Ttl` both defer to
    /// the underlying `LruCache`'s recency order (the crate doesn't expose a
    /// separate TTL-ordered structure); `Hybrid` prefers an expired entry if
    /// one exists before falling back to LRU order; `Smart` scores
    /// `hits / (age_secs * size)` and evicts the lowest.
    fn evict_one(
        &self,
        entries: &mut LruCache<String, Entry>,
    ) -> Option<(String, Entry)> {
        match self.policy {
            EvictionPolicy::Lru | EvictionPolicy::Ttl => entries.pop_lru(),
            EvictionPolicy::Hybrid => {
                let expired_key = entries
                    .iter()
                    .find(|(_, e)| e.expired())
                    .map(|(k, _)| k.clone());
                if let Some(key) = expired_key {
                    entries.pop(&key).map(|e| (key, e))
                } else {
                    entries.pop_lru()
                }
            }
            EvictionPolicy::Smart => {
                let worst_key = entries
                    .iter()
                    .min_by(|(_, a), (_, b)| {
                        smart_score(a).total_cmp(&smart_score(b))
                    })
                    .map(|(k, _)| k.clone())?;
                entries.pop(&worst_key).map(|e| (worst_key, e))
            }
        }
    }
}

fn smart_score(entry: &Entry) -> f64 {
    let age_secs = entry.stored_at.elapsed().as_secs_f64().max(1.0);
    let size = entry.frame.len().max(1) as f64;
    (entry.hits as f64 + 1.0) / (age_secs * size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CacheConfig {
        CacheConfig {
            fast_tier_max_entries: 10,
            fast_tier_max_bytes: 1024,
            ..CacheConfig::default()
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let tier = FastTier::new(&config());
        tier.put("k1".into(), b"hello".to_vec(), Duration::from_secs(60));
        assert_eq!(tier.get("k1"), Some(b"hello".to_vec()));
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let tier = FastTier::new(&config());
        tier.put("k1".into(), b"hello".to_vec(), Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(tier.get("k1"), None);
        assert!(tier.is_empty());
    }

    #[test]
    fn evicts_when_byte_budget_exceeded() {
        let mut config = config();
        config.fast_tier_max_bytes = 10;
        let tier = FastTier::new(&config);
        tier.put("a".into(), vec![0u8; 6], Duration::from_secs(60));
        tier.put("b".into(), vec![0u8; 6], Duration::from_secs(60));
        assert!(tier.current_bytes() <= 10);
        assert!(tier.len() <= 1);
    }

    #[test]
    fn entry_count_eviction_does_not_leak_bytes() {
        let mut config = config();
        config.fast_tier_max_entries = 2;
        config.fast_tier_max_bytes = 1_000_000;
        let tier = FastTier::new(&config);
        tier.put("a".into(), vec![0u8; 100], Duration::from_secs(60));
        tier.put("b".into(), vec![0u8; 100], Duration::from_secs(60));
        // Capacity is 2 entries; this push evicts "a" by LRU order, and its
        // bytes must come off current_bytes rather than leaking.
        tier.put("c".into(), vec![0u8; 100], Duration::from_secs(60));
        assert_eq!(tier.len(), 2);
        assert_eq!(tier.current_bytes(), 200);
        assert_eq!(tier.get("a"), None);
    }

    #[test]
    fn overwriting_existing_key_does_not_double_count_bytes() {
        let tier = FastTier::new(&config());
        tier.put("k1".into(), vec![0u8; 100], Duration::from_secs(60));
        tier.put("k1".into(), vec![0u8; 50], Duration::from_secs(60));
        assert_eq!(tier.current_bytes(), 50);
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn invalidate_prefix_removes_matching_keys_only() {
        let tier = FastTier::new(&config());
        tier.put("url:a:1".into(), b"x".to_vec(), Duration::from_secs(60));
        tier.put("url:a:2".into(), b"x".to_vec(), Duration::from_secs(60));
        tier.put("url:b:1".into(), b"x".to_vec(), Duration::from_secs(60));
        let removed = tier.invalidate_prefix("url:a:");
        assert_eq!(removed, 2);
        assert!(tier.get("url:b:1").is_some());
    }
}
