//! Scraping Service: orchestrates admission, caching, browser acquisition,
//! extraction, optional LLM processing, and the optional post-process hook
//! into the nine-step request flow.
//!
//! Grounds: step ordering and the "any exception in steps 4-8 releases the
//! browser with `error` and fails the task" contract follow the
//! `crawl_engine::core` crawl-loop shape (acquire page, navigate, extract,
//! on any error tear the page down) generalized from a single crawl queue
//! item to one Task Manager-tracked task.

mod browser_ops;
mod extractor;
mod hook;
mod url_guard;

pub use browser_ops::{fake, BrowserHandleOps, BrowserSource, LiveBrowserHandle, NavigationError};
pub use extractor::{ContentExtractor, DefaultExtractor, ExtractionError};
pub use hook::{Annotation, HookError, PostProcessHook};
pub use url_guard::{validate as validate_url, UrlValidationError};

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::browser_pool::ReleaseOutcome;
use crate::cache::{CacheStats, MultiTierCache};
use crate::config::EngineConfig;
use crate::error::ErrorKind;
use crate::fingerprint::{fingerprint, FingerprintInput};
use crate::llm_client::LlmClient;
use crate::rate_limiter::{Decision, RateLimiter};
use crate::resource_monitor::{ResourceMonitor, ResourceReport};
use crate::task_manager::{Page, TaskErrorInfo, TaskFilter, TaskManager, TaskRecord, TaskResult, TaskSort, TaskSpec};

/// Model identifier passed to the LLM provider when a task doesn't name one.
/// No per-task model override exists yet; see `DESIGN.md`.
const DEFAULT_LLM_MODEL: &str = "default";

/// Combined `{ tasks, pool, cache, memory }` snapshot.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub open_tasks: usize,
    pub pool: crate::browser_pool::PoolStats,
    pub cache: CacheStats,
    pub memory: ResourceReport,
}

/// Inbound contract the deliberately-out-of-scope HTTP surface is expected to
/// wire up.
#[async_trait]
pub trait ScrapingCore {
    fn submit(self: &Arc<Self>, spec: TaskSpec, client_id: &str) -> Uuid;
    fn query(&self, task_id: Uuid) -> Option<TaskRecord>;
    async fn cancel(&self, task_id: Uuid) -> bool;
    async fn stats(&self) -> EngineStats;
    fn invalidate_cache(&self, pattern: Option<&str>) -> usize;
}

/// The orchestrator. Generic over `S: BrowserSource` so production code runs
/// it over the real [`crate::browser_pool::BrowserPool`] while tests run it
/// over [`fake::FakeBrowserSource`].
pub struct ScrapingService<S: BrowserSource> {
    config: EngineConfig,
    rate_limiter: Arc<RateLimiter>,
    cache: Arc<MultiTierCache>,
    browser_source: S,
    llm_client: Arc<LlmClient>,
    task_manager: Arc<TaskManager>,
    resource_monitor: Arc<ResourceMonitor>,
    extractor: Arc<dyn ContentExtractor>,
    post_process_hook: Option<Arc<dyn PostProcessHook>>,
}

impl<S: BrowserSource + Send + Sync + 'static> ScrapingService<S> {
    #[must_use]
    pub fn new(
        config: EngineConfig,
        rate_limiter: Arc<RateLimiter>,
        cache: Arc<MultiTierCache>,
        browser_source: S,
        llm_client: Arc<LlmClient>,
        task_manager: Arc<TaskManager>,
        resource_monitor: Arc<ResourceMonitor>,
        extractor: Arc<dyn ContentExtractor>,
        post_process_hook: Option<Arc<dyn PostProcessHook>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            rate_limiter,
            cache,
            browser_source,
            llm_client,
            task_manager,
            resource_monitor,
            extractor,
            post_process_hook,
        })
    }

    /// Admit and enqueue a task; returns immediately.
    /// The nine-step flow runs on a spawned task.
    #[must_use]
    pub fn submit(self: &Arc<Self>, spec: TaskSpec, client_id: &str) -> Uuid {
        let id = self.task_manager.create(spec.clone());
        let service = Arc::clone(self);
        let client_id = client_id.to_string();
        tokio::spawn(async move {
            service.run(id, spec, &client_id).await;
        });
        id
    }

    async fn run(&self, id: Uuid, spec: TaskSpec, client_id: &str) {
        if self.resource_monitor.back_pressure() {
            self.fail(id, ErrorKind::ServiceUnavailable, "resource monitor back-pressure engaged", None)
                .await;
            return;
        }

        // Step 1: admit.
        match self.rate_limiter.check(client_id, "scrape") {
            Decision::Admit => {}
            Decision::Deny { retry_after, .. } => {
                self.fail(id, ErrorKind::RateLimited, "rate limit exceeded", Some(retry_after))
                    .await;
                return;
            }
        }

        if self.task_manager.transition(id, crate::task_manager::TaskStatus::Initializing).is_err() {
            return;
        }

        // Step 2: validate URL.
        if let Err(e) = url_guard::validate(&spec.url, false) {
            self.rate_limiter.record_abuse_signal(client_id);
            self.fail(id, e.kind(), e.to_string(), None).await;
            return;
        }

        let key = fingerprint(&FingerprintInput {
            url: &spec.url,
            output_format: spec.output_format,
            use_llm: spec.use_llm,
            custom_instructions: spec.custom_instructions.as_deref(),
        })
        .ok();

        // Step 3: cache lookup.
        if spec.use_cache {
            if let Some(key) = &key {
                if let Some(cached) = self.cache.get(key).await {
                    if let Ok(content) = String::from_utf8(cached) {
                        let _ = self.task_manager.update_metadata(id, |m| m.cache_hit = true);
                        let _ = self.task_manager.update_progress(id, 100, "served from cache");
                        let _ = self
                            .task_manager
                            .complete(
                                id,
                                TaskResult {
                                    content,
                                    output_format: spec.output_format,
                                },
                            )
                            .await;
                        self.rate_limiter.on_response_ok(client_id);
                        return;
                    }
                }
            }
        }

        if self.is_cancelled_checkpoint(id).await {
            return;
        }

        // Step 4: acquire browser.
        if self.task_manager.transition(id, crate::task_manager::TaskStatus::AcquiringBrowser).is_err() {
            return;
        }
        let deadline = Instant::now() + self.config.browser_wait_timeout;
        let mut handle = match self.browser_source.acquire(spec.priority, deadline).await {
            Ok(handle) => handle,
            Err(_) => {
                self.fail(id, ErrorKind::PoolExhausted, "timed out waiting for a browser", None)
                    .await;
                return;
            }
        };

        // Step 5: navigate and extract.
        if self.task_manager.transition(id, crate::task_manager::TaskStatus::Extracting).is_err() {
            self.browser_source.release(handle, ReleaseOutcome::Error).await;
            return;
        }
        let _ = self.task_manager.update_progress(id, 25, "navigating");

        let navigate_result = match handle.navigate(&spec.url, self.config.page_timeout).await {
            Ok(()) => Ok(()),
            // One retry on a transient failure.
            Err(_) => handle.navigate(&spec.url, self.config.page_timeout).await,
        };
        if let Err(e) = navigate_result {
            self.browser_source.release(handle, ReleaseOutcome::Error).await;
            self.fail(id, e.kind(), e.to_string(), None).await;
            return;
        }

        let html = match handle.content().await {
            Ok(html) => html,
            Err(e) => {
                self.browser_source.release(handle, ReleaseOutcome::Error).await;
                self.fail(id, e.kind(), e.to_string(), None).await;
                return;
            }
        };

        let mut content = match self.extractor.extract(&html, spec.output_format) {
            Ok(content) => content,
            Err(e) => {
                self.browser_source.release(handle, ReleaseOutcome::Error).await;
                self.fail(id, e.kind(), e.to_string(), None).await;
                return;
            }
        };

        if self.is_cancelled_checkpoint_releasing(id, &mut handle).await {
            return;
        }

        // Step 6: optional LLM processing.
        if spec.use_llm {
            if self.task_manager.transition(id, crate::task_manager::TaskStatus::ProcessingLlm).is_err() {
                self.browser_source.release(handle, ReleaseOutcome::Error).await;
                return;
            }
            let _ = self.task_manager.update_progress(id, 60, "processing with llm");

            let deadline = Instant::now() + self.config.llm_timeout;
            match self
                .llm_client
                .process(&content, spec.custom_instructions.as_deref(), DEFAULT_LLM_MODEL, deadline)
                .await
            {
                Ok(result) => content = result.text,
                Err(e) => {
                    warn!(task_id = %id, error = %e, "llm processing degraded, continuing without it");
                    let _ = self.task_manager.update_metadata(id, |m| m.llm_skipped = true);
                }
            }
        }

        if self.is_cancelled_checkpoint_releasing(id, &mut handle).await {
            return;
        }

        // Step 7: optional post-process hook, through an internal no-op
        // transition even when no hook is configured.
        if self.task_manager.transition(id, crate::task_manager::TaskStatus::PostProcessing).is_err() {
            self.browser_source.release(handle, ReleaseOutcome::Error).await;
            return;
        }
        let _ = self.task_manager.update_progress(id, 90, "post-processing");

        if let Some(hook) = &self.post_process_hook {
            let metadata = self.task_manager.get(id).map(|r| r.metadata).unwrap_or_default();
            if let Err(e) = hook.run(&content, &metadata).await {
                warn!(task_id = %id, error = %e, "post-process hook failed, skipping");
                let _ = self.task_manager.update_metadata(id, |m| m.post_process_skipped = true);
            }
        } else {
            let _ = self.task_manager.update_metadata(id, |m| m.post_process_skipped = true);
        }

        // Step 8: cache store.
        if spec.use_cache {
            if let Some(key) = &key {
                if let Err(e) = self.cache.put(key, content.as_bytes()).await {
                    warn!(task_id = %id, error = %e, "failed to cache task result");
                }
            }
        }

        // Step 9: complete.
        let browser_id = handle.ping().await.then(|| "ok".to_string());
        let _ = self.task_manager.update_metadata(id, |m| {
            m.content_length = Some(content.len());
            m.word_count = Some(content.split_whitespace().count());
            m.browser_id = browser_id;
        });
        let _ = self
            .task_manager
            .complete(
                id,
                TaskResult {
                    content,
                    output_format: spec.output_format,
                },
            )
            .await;
        self.browser_source.release(handle, ReleaseOutcome::Ok).await;
        self.rate_limiter.on_response_ok(client_id);
        info!(task_id = %id, "task completed");
    }

    /// Cancellation checkpoint with no browser handle yet acquired.
    async fn is_cancelled_checkpoint(&self, id: Uuid) -> bool {
        if !self.task_manager.is_cancelled(id) {
            return false;
        }
        let _ = self.task_manager.cancel(id).await;
        true
    }

    /// Cancellation checkpoint while holding `handle`; forcibly tears the
    /// browser down.
    async fn is_cancelled_checkpoint_releasing(&self, id: Uuid, handle: &mut S::Handle) -> bool {
        if !self.task_manager.is_cancelled(id) {
            return false;
        }
        handle.close().await;
        let _ = self.task_manager.cancel(id).await;
        true
    }

    async fn fail(&self, id: Uuid, kind: ErrorKind, message: impl Into<String>, retry_after: Option<Duration>) {
        let mut info = TaskErrorInfo::new(kind, message);
        if let Some(retry_after) = retry_after {
            info = info.with_retry_after(retry_after);
        }
        let _ = self.task_manager.fail(id, info).await;
    }
}

#[async_trait]
impl<S: BrowserSource + Send + Sync + 'static> ScrapingCore for ScrapingService<S> {
    fn submit(self: &Arc<Self>, spec: TaskSpec, client_id: &str) -> Uuid {
        ScrapingService::submit(self, spec, client_id)
    }

    fn query(&self, task_id: Uuid) -> Option<TaskRecord> {
        self.task_manager.get(task_id).ok()
    }

    async fn cancel(&self, task_id: Uuid) -> bool {
        self.task_manager.cancel(task_id).await.is_ok()
    }

    async fn stats(&self) -> EngineStats {
        let page: Page<TaskRecord> = self.task_manager.list(&TaskFilter::default(), TaskSort::CreatedAtDesc, 0);
        EngineStats {
            open_tasks: page.total,
            pool: self.pool_stats().await,
            cache: self.cache.stats(),
            memory: self.resource_monitor.report(),
        }
    }

    fn invalidate_cache(&self, pattern: Option<&str>) -> usize {
        self.cache.invalidate_pattern(pattern.unwrap_or("*"))
    }
}

impl<S: BrowserSource + Send + Sync + 'static> ScrapingService<S> {
    async fn pool_stats(&self) -> crate::browser_pool::PoolStats {
        self.browser_source.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser_pool::BrowserPool;
    use crate::config::{BrowserPoolConfig, CacheConfig, OutputFormat, Priority, RateLimiterConfig};
    use crate::llm_client::NullLlmProvider;
    use crate::task_manager::{TaskStatus, TaskStore, TestTaskStore};
    use fake::FakeBrowserSource;
    use std::sync::atomic::Ordering;

    fn spec(url: &str) -> TaskSpec {
        TaskSpec {
            url: url.to_string(),
            output_format: OutputFormat::RawText,
            use_llm: false,
            use_cache: true,
            custom_instructions: None,
            priority: Priority::Normal,
        }
    }

    fn service(browser: FakeBrowserSource) -> Arc<ScrapingService<FakeBrowserSource>> {
        let config = EngineConfig::default();
        let rate_limiter = Arc::new(RateLimiter::new(RateLimiterConfig::default()));
        let cache = Arc::new(MultiTierCache::without_durable_tier(CacheConfig::default()));
        let llm_client = Arc::new(LlmClient::new(Arc::new(NullLlmProvider), Arc::clone(&cache), Duration::from_secs(60)));
        let task_manager = Arc::new(TaskManager::new(
            crate::config::TaskManagerConfig::default(),
            Arc::new(TestTaskStore::new()),
        ));
        let resource_monitor = ResourceMonitor::new(
            crate::config::ResourceMonitorConfig {
                soft_memory_threshold_bytes: u64::MAX,
                hard_memory_threshold_bytes: u64::MAX,
                ..crate::config::ResourceMonitorConfig::default()
            },
            Arc::clone(&cache),
            BrowserPool::new(BrowserPoolConfig::default()),
        );

        ScrapingService::new(
            config,
            rate_limiter,
            cache,
            browser,
            llm_client,
            task_manager,
            resource_monitor,
            Arc::new(DefaultExtractor),
            None,
        )
    }

    async fn wait_terminal(service: &ScrapingService<FakeBrowserSource>, id: Uuid) -> TaskRecord {
        for _ in 0..200 {
            let record = service.task_manager.get(id).unwrap();
            if record.status.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {id} never reached a terminal state");
    }

    #[tokio::test]
    async fn happy_path_cache_miss_then_hit() {
        let service = service(FakeBrowserSource::new("<p>Hello world</p>"));
        let id = service.submit(spec("https://example.com/a"), "client-1");
        let record = wait_terminal(&service, id).await;
        assert_eq!(record.status, TaskStatus::Completed);
        assert!(!record.metadata.cache_hit);
        assert_eq!(record.result.unwrap().content, "Hello world");

        let id2 = service.submit(spec("https://example.com/a"), "client-1");
        let record2 = wait_terminal(&service, id2).await;
        assert_eq!(record2.status, TaskStatus::Completed);
        assert!(record2.metadata.cache_hit);
    }

    #[tokio::test]
    async fn ssrf_blocked_url_fails_without_acquiring_a_browser() {
        let service = service(FakeBrowserSource::new("<p>unused</p>"));
        let id = service.submit(spec("http://169.254.169.254/latest/meta-data/"), "client-1");
        let record = wait_terminal(&service, id).await;
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.unwrap().kind, ErrorKind::InvalidUrl);
        assert_eq!(service.browser_source.acquisitions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pool_exhaustion_fails_with_pool_exhausted() {
        let mut browser = FakeBrowserSource::new("<p>x</p>");
        browser.fail_acquire = true;
        let service = service(browser);
        let id = service.submit(spec("https://example.com/a"), "client-1");
        let record = wait_terminal(&service, id).await;
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.unwrap().kind, ErrorKind::PoolExhausted);
    }

    #[tokio::test]
    async fn llm_degradation_completes_with_llm_skipped() {
        let service = service(FakeBrowserSource::new("<p>Body text</p>"));
        let mut task = spec("https://example.com/a");
        task.use_llm = true;
        let id = service.submit(task, "client-1");
        let record = wait_terminal(&service, id).await;
        assert_eq!(record.status, TaskStatus::Completed);
        assert!(record.metadata.llm_skipped);
        assert_eq!(record.result.unwrap().content, "Body text");
    }

    #[tokio::test]
    async fn rate_limited_client_fails_without_touching_the_browser() {
        let config = EngineConfig::default().with_rate_limiter(RateLimiterConfig {
            per_minute: 1,
            per_hour: 1000,
            per_day: 10000,
            burst_capacity: 1,
            ..RateLimiterConfig::default()
        });
        let cache = Arc::new(MultiTierCache::without_durable_tier(CacheConfig::default()));
        let llm_client = Arc::new(LlmClient::new(Arc::new(NullLlmProvider), Arc::clone(&cache), Duration::from_secs(60)));
        let task_manager = Arc::new(TaskManager::new(
            crate::config::TaskManagerConfig::default(),
            Arc::new(TestTaskStore::new()),
        ));
        let resource_monitor = ResourceMonitor::new(
            crate::config::ResourceMonitorConfig {
                soft_memory_threshold_bytes: u64::MAX,
                hard_memory_threshold_bytes: u64::MAX,
                ..crate::config::ResourceMonitorConfig::default()
            },
            Arc::clone(&cache),
            BrowserPool::new(BrowserPoolConfig::default()),
        );
        let service = ScrapingService::new(
            config,
            Arc::new(RateLimiter::new(RateLimiterConfig {
                per_minute: 1,
                per_hour: 1000,
                per_day: 10000,
                burst_capacity: 1,
                ..RateLimiterConfig::default()
            })),
            cache,
            FakeBrowserSource::new("<p>x</p>"),
            llm_client,
            task_manager,
            resource_monitor,
            Arc::new(DefaultExtractor),
            None,
        );

        let _first = service.submit(spec("https://example.com/a"), "flood-client");
        let second = service.submit(spec("https://example.com/b"), "flood-client");
        let record = wait_terminal(&service, second).await;
        assert_eq!(record.status, TaskStatus::Failed);
        let error = record.error.unwrap();
        assert_eq!(error.kind, ErrorKind::RateLimited);
        assert!(error.retry_after.is_some());
    }

    #[tokio::test]
    async fn cancel_during_llm_reaches_cancelled_without_further_progress() {
        let cache = Arc::new(MultiTierCache::without_durable_tier(CacheConfig::default()));

        struct SlowProvider;
        #[async_trait::async_trait]
        impl crate::llm_client::LlmProvider for SlowProvider {
            async fn complete(
                &self,
                _content: &str,
                _instructions: Option<&str>,
                _model: &str,
            ) -> Result<String, crate::llm_client::LlmError> {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok("too slow".to_string())
            }
        }

        let llm_client = Arc::new(LlmClient::new(Arc::new(SlowProvider), Arc::clone(&cache), Duration::from_secs(60)));
        let task_manager = Arc::new(TaskManager::new(
            crate::config::TaskManagerConfig::default(),
            Arc::new(TestTaskStore::new()),
        ));
        let resource_monitor = ResourceMonitor::new(
            crate::config::ResourceMonitorConfig {
                soft_memory_threshold_bytes: u64::MAX,
                hard_memory_threshold_bytes: u64::MAX,
                ..crate::config::ResourceMonitorConfig::default()
            },
            Arc::clone(&cache),
            BrowserPool::new(BrowserPoolConfig::default()),
        );
        let service = ScrapingService::new(
            EngineConfig::default().with_llm_timeout(Duration::from_secs(10)),
            Arc::new(RateLimiter::new(RateLimiterConfig::default())),
            cache,
            FakeBrowserSource::new("<p>content</p>"),
            llm_client,
            task_manager,
            resource_monitor,
            Arc::new(DefaultExtractor),
            None,
        );

        let mut task = spec("https://example.com/a");
        task.use_llm = true;
        task.use_cache = false;
        let id = service.submit(task, "client-1");

        for _ in 0..200 {
            if service.task_manager.get(id).unwrap().status == TaskStatus::ProcessingLlm {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        ScrapingCore::cancel(&*service, id).await;

        let record = wait_terminal(&service, id).await;
        assert_eq!(record.status, TaskStatus::Cancelled);
    }
}
