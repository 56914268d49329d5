//! Headless-browser scraping engine: admission control, fingerprinted caching,
//! a pooled browser fleet, optional LLM post-processing, and a task registry
//! that clients poll or cancel.
//!
//! The crate is a library, not a server: embedding applications own the
//! listener, the wire protocol, and the `EngineConfig` construction. See
//! [`ScrapingCore`] for the entry point.

pub mod browser_pool;
pub mod browser_profile;
pub mod browser_setup;
pub mod cache;
pub mod config;
pub mod content_saver;
pub mod error;
pub mod fingerprint;
pub mod llm_client;
pub mod rate_limiter;
pub mod resource_monitor;
pub mod scraping_service;
pub mod task_manager;
pub mod utils;

pub use browser_pool::{AcquireError, BrowserPool, PoolHandle, PoolStats, ReleaseOutcome};
pub use browser_profile::{
    cleanup_stale_lock, cleanup_stale_profiles, create_unique_profile,
    create_unique_profile_with_prefix, is_singleton_lock_stale, BrowserProfile,
};
pub use browser_setup::{
    apply_stealth_measures, download_managed_browser, find_browser_executable, launch_browser,
};
pub use cache::{
    CacheStats, DurableStore, DurableStoreError, FastTier, MultiTierCache, NullDurableStore,
    RedisDurableStore, TestDurableStore,
};
pub use config::{
    BrowserPoolConfig, CacheConfig, EngineConfig, EvictionPolicy, OutputFormat, Priority,
    RateLimiterConfig, ResourceMonitorConfig, TaskManagerConfig,
};
pub use error::{EngineError, ErrorKind};
pub use fingerprint::{decode, encode, fingerprint, normalize_url, Algorithm, CodecError, FingerprintError, FingerprintInput};
pub use llm_client::{LlmClient, LlmError, LlmProvider, LlmResult, NullLlmProvider};
pub use rate_limiter::{Decision, DenyReason, RateBucketSnapshot, RateLimiter};
pub use resource_monitor::{CleanupOutcome, ResourceMonitor, ResourceReport};
pub use scraping_service::{
    Annotation, BrowserHandleOps, BrowserSource, ContentExtractor, DefaultExtractor, EngineStats,
    ExtractionError, HookError, LiveBrowserHandle, NavigationError, PostProcessHook,
    ScrapingCore, ScrapingService, UrlValidationError, validate_url,
};
pub use task_manager::{
    Page, SqliteTaskStore, TaskError, TaskErrorInfo, TaskFilter, TaskManager, TaskMetadata,
    TaskRecord, TaskResult, TaskSort, TaskSpec, TaskStatus, TaskStore, TaskStoreError,
    TestTaskStore,
};
