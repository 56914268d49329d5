//! LLM client: a cached, deadline-bound request/response wrapper around a
//! pluggable provider, with graceful degradation when the provider is down.
//!
//! Grounds: the cache-before-call, timeout-wrapped-call shape mirrors
//! `crate::cache::MultiTierCache::get`/`put` composed with `tokio::time::timeout`,
//! the same pattern the browser pool uses for its own deadline handling
//! (`browser_pool::acquire`'s `timeout_at`).

mod provider;

pub use provider::{LlmError, LlmProvider, NullLlmProvider};

use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::cache::MultiTierCache;

/// Successful LLM outcome. `cached` distinguishes a cache hit from a fresh
/// provider call for metadata/telemetry purposes.
#[derive(Debug, Clone)]
pub struct LlmResult {
    pub text: String,
    pub cached: bool,
}

/// Client wiring a provider through the multi-tier cache. Stateless beyond its
/// two collaborators; safe to share behind an `Arc`.
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
    cache: Arc<MultiTierCache>,
    response_ttl: Duration,
}

impl LlmClient {
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, cache: Arc<MultiTierCache>, response_ttl: Duration) -> Self {
        Self {
            provider,
            cache,
            response_ttl,
        }
    }

    /// `process(content, instructions, model, deadline)`: probe the
    /// cache under a secondary key derived from `(content, instructions,
    /// model)`, and on miss issue the provider call bound by `deadline`,
    /// caching a success with `response_ttl`.
    pub async fn process(
        &self,
        content: &str,
        instructions: Option<&str>,
        model: &str,
        deadline: Instant,
    ) -> Result<LlmResult, LlmError> {
        let key = secondary_key(content, instructions, model);

        if let Some(cached) = self.cache.get(&key).await {
            if let Ok(text) = String::from_utf8(cached) {
                debug!(key, "llm response cache hit");
                return Ok(LlmResult { text, cached: true });
            }
        }

        let timeout = deadline.saturating_duration_since(Instant::now());
        if timeout.is_zero() {
            return Err(LlmError::Timeout);
        }

        let text = match tokio::time::timeout(
            timeout,
            self.provider.complete(content, instructions, model),
        )
        .await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(LlmError::Timeout),
        };

        if let Err(e) = self.cache.put(&key, text.as_bytes()).await {
            warn!(key, error = %e, "failed to cache llm response frame");
        }

        Ok(LlmResult { text, cached: false })
    }
}

fn secondary_key(content: &str, instructions: Option<&str>, model: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"llm\0");
    hasher.update(content.as_bytes());
    hasher.update(b"\0");
    hasher.update(instructions.unwrap_or_default().as_bytes());
    hasher.update(b"\0");
    hasher.update(model.as_bytes());
    format!("llm:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        reply: String,
    }

    #[async_trait::async_trait]
    impl LlmProvider for CountingProvider {
        async fn complete(
            &self,
            _content: &str,
            _instructions: Option<&str>,
            _model: &str,
        ) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    fn client(provider: Arc<dyn LlmProvider>) -> LlmClient {
        let cache = Arc::new(MultiTierCache::without_durable_tier(CacheConfig::default()));
        LlmClient::new(provider, cache, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn second_identical_call_is_served_from_cache() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            reply: "structured output".into(),
        });
        let client = client(provider.clone());
        let deadline = Instant::now() + Duration::from_secs(5);

        let first = client.process("page", Some("summarize"), "model-a", deadline).await.unwrap();
        assert!(!first.cached);
        let second = client.process("page", Some("summarize"), "model-a", deadline).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.text, first.text);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unavailable_provider_surfaces_as_llm_error() {
        let client = client(Arc::new(NullLlmProvider));
        let deadline = Instant::now() + Duration::from_secs(5);
        let err = client.process("page", None, "model-a", deadline).await.unwrap_err();
        assert!(matches!(err, LlmError::Unavailable));
    }

    #[tokio::test]
    async fn already_passed_deadline_times_out_without_calling_provider() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            reply: "x".into(),
        });
        let client = client(provider.clone());
        let deadline = Instant::now() - Duration::from_millis(1);
        let err = client.process("page", None, "model-a", deadline).await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
