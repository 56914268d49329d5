//! Bounded pool of headless Chrome instances with priority-aware fair queueing,
//! health checks, and auto-recycling.
//!
//! Grounds: the pre-warmed pool shape (idle deque, health-check background
//! task, `browser_setup::launch_browser` + `browser_profile` for lifecycle)
//! continues the original pool implementation in this codebase's ancestry.
//! What changes: `acquire` now takes a priority and a deadline and is backed
//! by [`queue::WaitQueue`] instead of a poll-and-sleep loop, and `release`
//! takes an explicit outcome that drives failure-count/age/request-count
//! recycling instead of an unconditional return-to-idle.

mod queue;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chromiumoxide::browser::Browser;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{BrowserPoolConfig, Priority};
use queue::WaitQueue;

#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("timed out waiting for a browser")]
    TimedOut,
    #[error("pool is shutting down")]
    PoolShutdown,
    #[error("failed to launch a browser: {0}")]
    LaunchFailed(String),
}

/// Outcome a caller reports when returning a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Ok,
    Error,
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub total: usize,
    pub idle: usize,
    pub in_use: usize,
    pub queue_len: usize,
    pub requests_served: u64,
    pub wait_time_p50: Duration,
    pub wait_time_p95: Duration,
    pub wait_time_max: Duration,
}

struct BrowserInstance {
    id: String,
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    profile_dir: Option<std::path::PathBuf>,
    created_at: Instant,
    last_activity_at: Instant,
    handled_count: u64,
    failure_count: u32,
}

impl BrowserInstance {
    fn touch(&mut self) {
        self.last_activity_at = Instant::now();
    }
}

impl Drop for BrowserInstance {
    fn drop(&mut self) {
        self.handler.abort();
        if let Some(dir) = self.profile_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!(path = %dir.display(), error = %e, "failed to remove browser profile directory");
            }
        }
    }
}

struct Inner {
    idle: VecDeque<BrowserInstance>,
    in_use: usize,
    total: usize,
    waiters: WaitQueue<BrowserInstance>,
    shutdown: bool,
    requests_served: u64,
    wait_time_samples: Vec<Duration>,
}

impl Inner {
    fn record_wait(&mut self, d: Duration) {
        self.wait_time_samples.push(d);
        if self.wait_time_samples.len() > 256 {
            self.wait_time_samples.remove(0);
        }
    }
}

/// Bounded pool of headless browser contexts. Construct with [`BrowserPool::new`]
/// and call [`BrowserPool::start`] once to launch the health-check task.
pub struct BrowserPool {
    config: BrowserPoolConfig,
    inner: Mutex<Inner>,
    next_id: AtomicU64,
    health_handle: Mutex<Option<JoinHandle<()>>>,
    shutting_down: AtomicBool,
}

impl BrowserPool {
    #[must_use]
    pub fn new(config: BrowserPoolConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            inner: Mutex::new(Inner {
                idle: VecDeque::new(),
                in_use: 0,
                total: 0,
                waiters: WaitQueue::new(),
                shutdown: false,
                requests_served: 0,
                wait_time_samples: Vec::new(),
            }),
            next_id: AtomicU64::new(0),
            health_handle: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Start the background health-check/recycling task. Idempotent only in
    /// the sense that a second call replaces the previous task handle without
    /// aborting it — callers should call this exactly once.
    pub async fn start(self: &Arc<Self>) {
        let pool = Arc::clone(self);
        let handle = tokio::spawn(async move { health_check_loop(pool).await });
        *self.health_handle.lock().await = Some(handle);
    }

    /// Acquire exclusive access to a browser. Hands out an idle instance
    /// immediately if one exists, launches a fresh one if the pool has spare
    /// capacity, or joins the priority-aware fair wait queue until a browser
    /// is released, a replacement is launched, or `deadline` passes.
    pub async fn acquire(
        self: &Arc<Self>,
        priority: Priority,
        deadline: Instant,
    ) -> Result<PoolHandle, AcquireError> {
        enum Obtained {
            Immediate(BrowserInstance),
            NeedLaunch,
            Wait(tokio::sync::oneshot::Receiver<BrowserInstance>),
        }

        let wait_start = Instant::now();

        let obtained = {
            let mut inner = self.inner.lock().await;
            if inner.shutdown {
                return Err(AcquireError::PoolShutdown);
            }
            if let Some(inst) = inner.idle.pop_back() {
                Obtained::Immediate(inst)
            } else if inner.total < self.config.max_pool_size {
                inner.total += 1;
                Obtained::NeedLaunch
            } else {
                Obtained::Wait(inner.waiters.push(priority))
            }
        };

        let inst = match obtained {
            Obtained::Immediate(inst) => inst,
            Obtained::NeedLaunch => match self.launch().await {
                Ok(inst) => inst,
                Err(e) => {
                    let mut inner = self.inner.lock().await;
                    inner.total -= 1;
                    return Err(AcquireError::LaunchFailed(e.to_string()));
                }
            },
            Obtained::Wait(rx) => {
                match tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), rx).await {
                    Ok(Ok(inst)) => inst,
                    Ok(Err(_)) => return Err(AcquireError::PoolShutdown),
                    Err(_) => return Err(AcquireError::TimedOut),
                }
            }
        };

        {
            let mut inner = self.inner.lock().await;
            inner.in_use += 1;
            inner.record_wait(wait_start.elapsed());
        }

        debug!(browser_id = %inst.id, "acquired browser");
        Ok(PoolHandle {
            inst: Some(inst),
            pool: Arc::clone(self),
        })
    }

    /// Return a handle, applying `outcome` to the recycling decision. A handle dropped without an explicit `release` (e.g. a
    /// panic unwind, or cancellation tearing down an in-flight navigation)
    /// is released with `ReleaseOutcome::Error` by [`PoolHandle`]'s `Drop`.
    pub async fn release(self: &Arc<Self>, mut handle: PoolHandle, outcome: ReleaseOutcome) {
        if let Some(inst) = handle.inst.take() {
            self.complete_release(inst, outcome).await;
        }
    }

    async fn complete_release(self: &Arc<Self>, mut inst: BrowserInstance, outcome: ReleaseOutcome) {
        inst.touch();
        match outcome {
            ReleaseOutcome::Ok => {
                inst.handled_count += 1;
                inst.failure_count = 0;
            }
            ReleaseOutcome::Error => inst.failure_count += 1,
        }

        let mut inner = self.inner.lock().await;
        inner.in_use = inner.in_use.saturating_sub(1);
        inner.requests_served += 1;

        let needs_recycle = inner.shutdown
            || (outcome == ReleaseOutcome::Error && inst.failure_count >= self.config.failure_threshold)
            || inst.created_at.elapsed() >= self.config.max_age
            || inst.handled_count >= self.config.max_requests;

        if needs_recycle {
            inner.total = inner.total.saturating_sub(1);
            let id = inst.id.clone();
            // Spare capacity is still owed to waiters (or to min_pool_size) even
            // though this instance is gone; `replenish_to_min` only runs on the
            // health-check interval and only tops up to `min_pool_size`, so a
            // recycle with queued waiters schedules its own replacement rather
            // than making them wait out the interval.
            let should_replace = !inner.shutdown
                && inner.total < self.config.max_pool_size
                && (!inner.waiters.is_empty() || inner.total < self.config.min_pool_size);
            drop(inner);
            drop(inst);
            debug!(browser_id = %id, "recycled browser");
            if should_replace {
                let pool = Arc::clone(self);
                tokio::spawn(async move { pool.spawn_replacement().await });
            }
            return;
        }

        if let Some(returned) = inner.waiters.hand_off(inst) {
            inner.idle.push_back(returned);
        }
    }

    /// Launch one browser to refill capacity lost to a recycle, handing it
    /// straight to the longest-waiting queued acquirer if one is still
    /// listening. Reserves its `total` slot up front, under the same lock
    /// discipline `acquire`'s `NeedLaunch` path uses, so concurrent recycles
    /// can't overshoot `max_pool_size`.
    async fn spawn_replacement(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock().await;
            if inner.shutdown || inner.total >= self.config.max_pool_size {
                return;
            }
            inner.total += 1;
        }

        match self.launch().await {
            Ok(inst) => {
                let mut inner = self.inner.lock().await;
                if inner.shutdown {
                    inner.total = inner.total.saturating_sub(1);
                    drop(inner);
                    drop(inst);
                    return;
                }
                if let Some(returned) = inner.waiters.hand_off(inst) {
                    inner.idle.push_back(returned);
                }
            }
            Err(e) => {
                let mut inner = self.inner.lock().await;
                inner.total = inner.total.saturating_sub(1);
                drop(inner);
                warn!(error = %e, "failed to launch replacement browser after recycle");
            }
        }
    }

    pub async fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().await;
        let mut samples = inner.wait_time_samples.clone();
        samples.sort();
        let percentile = |p: f64| -> Duration {
            if samples.is_empty() {
                return Duration::ZERO;
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let idx = (((samples.len() - 1) as f64) * p).round() as usize;
            samples[idx.min(samples.len() - 1)]
        };
        PoolStats {
            total: inner.total,
            idle: inner.idle.len(),
            in_use: inner.in_use,
            queue_len: inner.waiters.len(),
            requests_served: inner.requests_served,
            wait_time_p50: percentile(0.50),
            wait_time_p95: percentile(0.95),
            wait_time_max: samples.last().copied().unwrap_or(Duration::ZERO),
        }
    }

    /// Stop accepting new acquires, close idle browsers, and give any
    /// in-flight handles `shutdown_grace_period` before their eventual
    /// `release` tears them down instead of returning them to idle.
    pub async fn shutdown(self: &Arc<Self>) {
        info!("shutting down browser pool");
        self.shutting_down.store(true, Ordering::Relaxed);
        {
            let mut inner = self.inner.lock().await;
            inner.shutdown = true;
        }
        if let Some(handle) = self.health_handle.lock().await.take() {
            handle.abort();
        }

        tokio::time::sleep(self.config.shutdown_grace_period).await;

        let mut inner = self.inner.lock().await;
        while let Some(inst) = inner.idle.pop_front() {
            drop(inst);
        }
        info!(in_use = inner.in_use, "browser pool shutdown complete");
    }

    async fn launch(&self) -> anyhow::Result<BrowserInstance> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let profile =
            crate::browser_profile::create_unique_profile_with_prefix("kodegen_chrome_pool")?;
        let user_data_dir = profile.into_path();

        let (browser, handler, _dir) =
            crate::browser_setup::launch_browser(self.config.headless, Some(user_data_dir.clone()))
                .await?;

        Ok(BrowserInstance {
            id: format!("browser-{id}"),
            browser: Arc::new(browser),
            handler,
            profile_dir: Some(user_data_dir),
            created_at: Instant::now(),
            last_activity_at: Instant::now(),
            handled_count: 0,
            failure_count: 0,
        })
    }

    /// Trigger an out-of-cycle health/stale-browser scan.
    pub async fn run_health_pass_now(self: &Arc<Self>) {
        self.run_health_pass().await;
    }

    async fn run_health_pass(self: &Arc<Self>) {
        let candidates: Vec<BrowserInstance> = {
            let mut inner = self.inner.lock().await;
            if inner.shutdown {
                return;
            }
            inner.idle.drain(..).collect()
        };

        let mut healthy = VecDeque::with_capacity(candidates.len());
        let mut removed = 0usize;
        let now = Instant::now();

        for inst in candidates {
            let idle_for = now.duration_since(inst.last_activity_at);
            let over_idle_budget =
                healthy.len() >= self.config.min_pool_size && idle_for > self.config.idle_timeout;
            if over_idle_budget {
                debug!(browser_id = %inst.id, idle_for = ?idle_for, "retiring idle browser above min pool size");
                removed += 1;
                continue;
            }
            match inst.browser.version().await {
                Ok(_) => healthy.push_back(inst),
                Err(e) => {
                    warn!(browser_id = %inst.id, error = %e, "browser failed health check");
                    removed += 1;
                }
            }
        }

        {
            let mut inner = self.inner.lock().await;
            inner.total = inner.total.saturating_sub(removed);
            inner.idle.extend(healthy);
        }

        self.replenish_to_min().await;
    }

    async fn replenish_to_min(self: &Arc<Self>) {
        loop {
            {
                let inner = self.inner.lock().await;
                if inner.shutdown || inner.total >= self.config.min_pool_size {
                    return;
                }
            }
            match self.launch().await {
                Ok(inst) => {
                    let mut inner = self.inner.lock().await;
                    inner.total += 1;
                    if let Some(returned) = inner.waiters.hand_off(inst) {
                        inner.idle.push_back(returned);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to replenish browser pool to min size");
                    return;
                }
            }
        }
    }
}

async fn health_check_loop(pool: Arc<BrowserPool>) {
    let mut interval = tokio::time::interval(pool.config.keepalive_interval);
    loop {
        interval.tick().await;
        if pool.shutting_down.load(Ordering::Relaxed) {
            break;
        }
        pool.run_health_pass().await;
    }
    debug!("browser pool health-check loop exiting");
}

/// RAII grant of exclusive access to one [`BrowserInstance`]. Must be
/// returned via [`BrowserPool::release`]; a handle dropped without that call
/// is released with [`ReleaseOutcome::Error`].
pub struct PoolHandle {
    inst: Option<BrowserInstance>,
    pool: Arc<BrowserPool>,
}

impl PoolHandle {
    #[must_use]
    pub fn browser(&self) -> &Browser {
        &self
            .inst
            .as_ref()
            .expect("handle holds its instance until release")
            .browser
    }

    #[must_use]
    pub fn browser_arc(&self) -> Arc<Browser> {
        Arc::clone(
            &self
                .inst
                .as_ref()
                .expect("handle holds its instance until release")
                .browser,
        )
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self
            .inst
            .as_ref()
            .expect("handle holds its instance until release")
            .id
    }
}

impl Drop for PoolHandle {
    fn drop(&mut self) {
        if let Some(inst) = self.inst.take() {
            let pool = Arc::clone(&self.pool);
            tokio::spawn(async move {
                pool.complete_release(inst, ReleaseOutcome::Error).await;
            });
        }
    }
}
