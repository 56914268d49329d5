//! End-to-end exercises of the scraping engine's public surface: admission,
//! caching, browser acquisition, extraction, LLM degradation, and cancellation,
//! all driven through [`ScrapingCore`] over a fake browser source.

use std::sync::Arc;
use std::time::Duration;

use kodegen_tools_citescrape::config::{
    CacheConfig, EngineConfig, OutputFormat, Priority, RateLimiterConfig, ResourceMonitorConfig,
    TaskManagerConfig,
};
use kodegen_tools_citescrape::scraping_service::fake::FakeBrowserSource;
use kodegen_tools_citescrape::{
    BrowserPool, DefaultExtractor, LlmClient, MultiTierCache, NullLlmProvider, RateLimiter,
    ResourceMonitor, ScrapingCore, ScrapingService, TaskManager, TaskRecord, TaskSpec,
    TaskStatus, TestTaskStore,
};

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

fn build(browser: FakeBrowserSource) -> Arc<ScrapingService<FakeBrowserSource>> {
    let cache = Arc::new(MultiTierCache::without_durable_tier(CacheConfig::default()));
    let rate_limiter = Arc::new(RateLimiter::new(RateLimiterConfig::default()));
    let llm_client = Arc::new(LlmClient::new(
        Arc::new(NullLlmProvider),
        Arc::clone(&cache),
        Duration::from_secs(60),
    ));
    let task_manager = Arc::new(TaskManager::new(
        TaskManagerConfig::default(),
        Arc::new(TestTaskStore::new()),
    ));
    let resource_monitor = ResourceMonitor::new(
        ResourceMonitorConfig {
            soft_memory_threshold_bytes: u64::MAX,
            hard_memory_threshold_bytes: u64::MAX,
            ..ResourceMonitorConfig::default()
        },
        Arc::clone(&cache),
        BrowserPool::new(Default::default()),
    );

    ScrapingService::new(
        EngineConfig::default(),
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

async fn wait_terminal(
    service: &ScrapingService<FakeBrowserSource>,
    id: uuid::Uuid,
) -> TaskRecord {
    for _ in 0..200 {
        if let Some(record) = service.query(id) {
            if record.status.is_terminal() {
                return record;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("task {id} never reached a terminal state");
}

#[tokio::test]
async fn happy_path_serves_from_cache_on_second_request() {
    let browser = FakeBrowserSource::new("<html><body>hello world</body></html>");
    let service = build(browser);

    let id1 = service.submit(spec("https://example.com/a"), "client-a");
    let record1 = wait_terminal(&service, id1).await;
    assert_eq!(record1.status, TaskStatus::Completed);
    assert_eq!(record1.metadata.cache_hit, false);

    let id2 = service.submit(spec("https://example.com/a"), "client-a");
    let record2 = wait_terminal(&service, id2).await;
    assert_eq!(record2.status, TaskStatus::Completed);
    assert_eq!(record2.metadata.cache_hit, true);
    assert_eq!(
        record1.result.unwrap().content,
        record2.result.unwrap().content
    );

    assert_eq!(service.stats().await.cache.fast_hits, 1);
}

#[tokio::test]
async fn ssrf_blocked_url_never_acquires_a_browser() {
    let browser = FakeBrowserSource::new("<html></html>");
    let service = build(browser);

    let id = service.submit(spec("http://169.254.169.254/latest/meta-data"), "client-b");
    let record = wait_terminal(&service, id).await;

    assert_eq!(record.status, TaskStatus::Failed);
}

#[tokio::test]
async fn pool_exhaustion_fails_the_task() {
    let mut browser = FakeBrowserSource::new("<html></html>");
    browser.fail_acquire = true;
    let service = build(browser);

    let id = service.submit(spec("https://example.com/b"), "client-c");
    let record = wait_terminal(&service, id).await;

    assert_eq!(record.status, TaskStatus::Failed);
}

#[tokio::test]
async fn cancel_before_completion_is_observed() {
    let browser = FakeBrowserSource::new("<html><body>content</body></html>");
    let service = build(browser);

    let id = service.submit(spec("https://example.com/c"), "client-d");
    let cancelled = service.cancel(id).await;
    assert!(cancelled);

    let record = wait_terminal(&service, id).await;
    assert_eq!(record.status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn invalidate_cache_forces_a_fresh_fetch() {
    let browser = FakeBrowserSource::new("<html><body>v1</body></html>");
    let service = build(browser);

    let id1 = service.submit(spec("https://example.com/d"), "client-e");
    let record1 = wait_terminal(&service, id1).await;
    assert_eq!(record1.metadata.cache_hit, false);

    let removed = service.invalidate_cache(None);
    assert_eq!(removed, 1);

    let id2 = service.submit(spec("https://example.com/d"), "client-e");
    let record2 = wait_terminal(&service, id2).await;
    assert_eq!(record2.metadata.cache_hit, false);
}
