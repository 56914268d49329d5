//! Crate-wide stable error taxonomy.
//!
//! Every component raises its own `thiserror` enum (see each module's `error` type)
//! and maps it onto [`ErrorKind`] at the point where it crosses into the
//! [`crate::scraping_service::ScrapingService`] orchestration layer. The Task Manager
//! persists only the [`ErrorKind`] identifier and a short message — never a
//! provider-specific error string.

use std::fmt;

/// Stable, language-independent error identifiers surfaced on a failed task.
///
/// The `Display` impl produces exactly the identifier strings used as the
/// persisted/serialized error code, so these must not be renamed without a
/// migration plan for any durable task store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Admission denied by the rate limiter.
    RateLimited,
    /// URL failed scheme/host/SSRF validation.
    InvalidUrl,
    /// Browser acquire timed out.
    PoolExhausted,
    /// Browser navigation failed (after the single transient retry).
    NavigationError,
    /// Content extraction/conversion failed.
    ExtractionError,
    /// LLM provider unavailable; task completed without LLM.
    LlmUnavailable,
    /// LLM call exceeded its deadline; task completed without LLM.
    LlmTimeout,
    /// Durable cache tier failed; treated as a miss.
    CacheError,
    /// Cache frame failed to decode.
    CorruptFrame,
    /// `cancel()` was observed by the worker.
    Cancelled,
    /// Resource Monitor back-pressure flag was set.
    ServiceUnavailable,
    /// Task was non-terminal across a process restart.
    Interrupted,
}

impl ErrorKind {
    /// The stable identifier string for this kind, as persisted on a task.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::InvalidUrl => "invalid_url",
            Self::PoolExhausted => "pool_exhausted",
            Self::NavigationError => "navigation_error",
            Self::ExtractionError => "extraction_error",
            Self::LlmUnavailable => "llm_unavailable",
            Self::LlmTimeout => "llm_timeout",
            Self::CacheError => "cache_error",
            Self::CorruptFrame => "corrupt_frame",
            Self::Cancelled => "cancelled",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Interrupted => "interrupted",
        }
    }

    /// Whether this kind recovers silently (cache, LLM degradation) rather than
    /// failing the task outright.
    #[must_use]
    pub const fn recovers_silently(self) -> bool {
        matches!(
            self,
            Self::LlmUnavailable | Self::LlmTimeout | Self::CacheError | Self::CorruptFrame
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task-facing error: a stable [`ErrorKind`] plus a short human-readable message.
///
/// This is the only error shape that crosses the Scraping Service boundary upward;
/// provider-specific error strings stop at the component that produced them.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
