//! Narrow outbound browser contract
//! plus the live `chromiumoxide` binding and a fake for orchestration tests.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::browser_pool::{AcquireError, BrowserPool, PoolHandle, PoolStats, ReleaseOutcome};
use crate::config::Priority;

#[derive(Debug, Clone, thiserror::Error)]
pub enum NavigationError {
    #[error("navigation timed out after {0:?}")]
    TimedOut(Duration),
    #[error("navigation failed: {0}")]
    Failed(String),
}

impl NavigationError {
    #[must_use]
    pub const fn kind(&self) -> crate::error::ErrorKind {
        crate::error::ErrorKind::NavigationError
    }
}

/// One navigable browser surface, exclusively owned by the caller.
#[async_trait]
pub trait BrowserHandleOps: Send {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), NavigationError>;
    async fn content(&self) -> Result<String, NavigationError>;
    async fn close(&mut self);
    async fn ping(&self) -> bool;
}

/// Acquire/release seam in front of a pool of [`BrowserHandleOps`]. Generic
/// rather than a trait object so the Scraping Service can be instantiated
/// over the real [`BrowserPool`] in production and a fake in tests without
/// either side boxing per-call.
#[async_trait]
pub trait BrowserSource: Send + Sync {
    type Handle: BrowserHandleOps;

    async fn acquire(&self, priority: Priority, deadline: Instant) -> Result<Self::Handle, AcquireError>;
    async fn release(&self, handle: Self::Handle, outcome: ReleaseOutcome);

    /// Point-in-time pool statistics, surfaced through `stats()`. Sources
    /// with no real pool behind them (the test fake) report all zeros.
    async fn stats(&self) -> PoolStats {
        PoolStats {
            total: 0,
            idle: 0,
            in_use: 0,
            queue_len: 0,
            requests_served: 0,
            wait_time_p50: Duration::ZERO,
            wait_time_p95: Duration::ZERO,
            wait_time_max: Duration::ZERO,
        }
    }
}

/// Live handle: a [`PoolHandle`] plus the single `chromiumoxide::Page` it
/// lazily opens on first `navigate`.
pub struct LiveBrowserHandle {
    handle: PoolHandle,
    page: Option<chromiumoxide::Page>,
}

#[async_trait]
impl BrowserHandleOps for LiveBrowserHandle {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), NavigationError> {
        if self.page.is_none() {
            let page = self
                .handle
                .browser()
                .new_page("about:blank")
                .await
                .map_err(|e| NavigationError::Failed(e.to_string()))?;
            self.page = Some(page);
        }
        let page = self.page.as_ref().expect("just inserted");

        tokio::time::timeout(timeout, page.goto(url))
            .await
            .map_err(|_| NavigationError::TimedOut(timeout))?
            .map_err(|e| NavigationError::Failed(e.to_string()))?;
        Ok(())
    }

    async fn content(&self) -> Result<String, NavigationError> {
        let page = self.page.as_ref().ok_or_else(|| {
            NavigationError::Failed("content() called before a successful navigate()".to_string())
        })?;
        page.content()
            .await
            .map_err(|e| NavigationError::Failed(e.to_string()))
    }

    async fn close(&mut self) {
        if let Some(page) = self.page.take() {
            let _ = page.close().await;
        }
    }

    async fn ping(&self) -> bool {
        self.handle.browser().version().await.is_ok()
    }
}

#[async_trait]
impl BrowserSource for std::sync::Arc<BrowserPool> {
    type Handle = LiveBrowserHandle;

    async fn acquire(&self, priority: Priority, deadline: Instant) -> Result<LiveBrowserHandle, AcquireError> {
        let handle = BrowserPool::acquire(self, priority, deadline).await?;
        Ok(LiveBrowserHandle { handle, page: None })
    }

    async fn release(&self, handle: LiveBrowserHandle, outcome: ReleaseOutcome) {
        BrowserPool::release(self, handle.handle, outcome).await;
    }

    async fn stats(&self) -> PoolStats {
        BrowserPool::stats(self).await
    }
}

/// In-memory double for orchestration tests: never launches a real browser.
pub mod fake {
    use super::{async_trait, BrowserHandleOps, BrowserSource, Duration, Instant, NavigationError};
    use crate::browser_pool::{AcquireError, ReleaseOutcome};
    use crate::config::Priority;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub struct FakeBrowserHandle {
        pub html: String,
        pub fail_navigation: bool,
    }

    #[async_trait]
    impl BrowserHandleOps for FakeBrowserHandle {
        async fn navigate(&mut self, _url: &str, _timeout: Duration) -> Result<(), NavigationError> {
            if self.fail_navigation {
                return Err(NavigationError::Failed("fake navigation failure".into()));
            }
            Ok(())
        }

        async fn content(&self) -> Result<String, NavigationError> {
            Ok(self.html.clone())
        }

        async fn close(&mut self) {}

        async fn ping(&self) -> bool {
            true
        }
    }

    /// Configurable fake browser source: returns a canned page body, optionally
    /// fails acquisition (to simulate `pool_exhausted`), and records release
    /// outcomes for assertions.
    pub struct FakeBrowserSource {
        pub html: String,
        pub fail_acquire: bool,
        pub fail_navigation: bool,
        pub acquisitions: AtomicUsize,
        pub releases: Mutex<Vec<ReleaseOutcome>>,
    }

    impl FakeBrowserSource {
        #[must_use]
        pub fn new(html: impl Into<String>) -> Self {
            Self {
                html: html.into(),
                fail_acquire: false,
                fail_navigation: false,
                acquisitions: AtomicUsize::new(0),
                releases: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BrowserSource for FakeBrowserSource {
        type Handle = FakeBrowserHandle;

        async fn acquire(&self, _priority: Priority, _deadline: Instant) -> Result<FakeBrowserHandle, AcquireError> {
            self.acquisitions.fetch_add(1, Ordering::SeqCst);
            if self.fail_acquire {
                return Err(AcquireError::TimedOut);
            }
            Ok(FakeBrowserHandle {
                html: self.html.clone(),
                fail_navigation: self.fail_navigation,
            })
        }

        async fn release(&self, _handle: FakeBrowserHandle, outcome: ReleaseOutcome) {
            self.releases.lock().expect("not poisoned").push(outcome);
        }
    }
}
