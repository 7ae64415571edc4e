//! Browser process and page pool.
//!
//! The pool owns every browser process and page. Pages are checked out to
//! one task at a time; browsers are health-checked, replaced when they fail,
//! and scaled between `min_browsers` and `max_browsers`.

use std::{
    collections::HashMap,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    futures::FutureExt,
    tokio::{
        sync::{Mutex, RwLock, broadcast},
        time::{Instant, MissedTickBehavior},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    driver::{BrowserLauncher, BrowserProcess, PageDriver},
    error::BrowserError,
    types::{
        AcquireOptions, BrowserHealth, PageHandle, PoolConfig, PoolEvent, PoolStats,
        ReleaseOptions,
    },
};

/// Weight of the newest sample in the rolling task duration.
const TASK_EMA_ALPHA: f64 = 0.2;
const EVENT_BUFFER: usize = 256;

struct PageEntry {
    driver: Arc<dyn PageDriver>,
    in_use: bool,
    lease: u64,
    last_used: Instant,
    proxy: Option<String>,
}

struct BrowserState {
    health: BrowserHealth,
    pages: HashMap<String, PageEntry>,
    /// Slots reserved for pages still being opened.
    opening: usize,
    last_used: Instant,
}

impl BrowserState {
    fn load(&self) -> usize {
        self.pages.len() + self.opening
    }

    fn in_use(&self) -> usize {
        self.pages.values().filter(|p| p.in_use).count()
    }

    /// Reserve a page slot. A full browser gives up one free page (opened for
    /// a different proxy) to make room; the evicted driver is returned so the
    /// caller can close it outside the lock.
    fn reserve(&mut self, capacity: usize) -> Option<Option<Arc<dyn PageDriver>>> {
        if self.health != BrowserHealth::Healthy {
            return None;
        }
        if self.load() < capacity {
            self.opening += 1;
            return Some(None);
        }
        let free_id = self
            .pages
            .iter()
            .find(|(_, p)| !p.in_use)
            .map(|(id, _)| id.clone())?;
        let evicted = self.pages.remove(&free_id)?;
        self.opening += 1;
        Some(Some(evicted.driver))
    }

    fn drain_pages(&mut self) -> Vec<Arc<dyn PageDriver>> {
        self.pages.drain().map(|(_, p)| p.driver).collect()
    }
}

struct ManagedBrowser {
    id: String,
    created_at: Instant,
    process: Box<dyn BrowserProcess>,
    state: Mutex<BrowserState>,
}

#[derive(Default)]
struct PoolCounters {
    tasks_total: AtomicU64,
    tasks_succeeded: AtomicU64,
    tasks_failed: AtomicU64,
    browsers_created: AtomicU64,
    browsers_closed: AtomicU64,
    browsers_recovered: AtomicU64,
    avg_task_ms: std::sync::Mutex<Option<f64>>,
}

/// Pool of browser processes and their pages.
pub struct BrowserPool {
    config: PoolConfig,
    launcher: Arc<dyn BrowserLauncher>,
    browsers: RwLock<HashMap<String, Arc<ManagedBrowser>>>,
    /// Serialises launches so `max_browsers` is never exceeded.
    scale_lock: Mutex<()>,
    last_scale_event: std::sync::Mutex<Option<Instant>>,
    next_lease: AtomicU64,
    started: AtomicBool,
    closed: AtomicBool,
    cancel: CancellationToken,
    events: broadcast::Sender<PoolEvent>,
    counters: PoolCounters,
}

impl BrowserPool {
    pub fn new(config: PoolConfig, launcher: Arc<dyn BrowserLauncher>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            config,
            launcher,
            browsers: RwLock::new(HashMap::new()),
            scale_lock: Mutex::new(()),
            last_scale_event: std::sync::Mutex::new(None),
            next_lease: AtomicU64::new(1),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            events,
            counters: PoolCounters::default(),
        }
    }

    /// Pool backed by host Chrome/Chromium.
    pub fn with_chromium(config: PoolConfig) -> Self {
        let launcher = Arc::new(crate::chromium::ChromiumLauncher::new(config.clone()));
        Self::new(config, launcher)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Launch `min_browsers` and start the health and scale loops.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), BrowserError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::PoolClosed);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        {
            let _guard = self.scale_lock.lock().await;
            while self.browser_count().await < self.config.min_browsers {
                self.launch_browser().await?;
            }
        }

        let health_every = Duration::from_secs(self.config.health_check_interval_secs.max(1));
        self.spawn_loop("health", health_every, |pool| async move {
            pool.health_tick().await;
        });
        if self.config.auto_scale {
            let scale_every = Duration::from_secs(self.config.scale_check_interval_secs.max(1));
            self.spawn_loop("scale", scale_every, |pool| async move {
                pool.scale_tick().await;
            });
        }

        info!(
            browsers = self.config.min_browsers,
            max_browsers = self.config.max_browsers,
            pages_per_browser = self.config.pages_per_browser,
            auto_scale = self.config.auto_scale,
            "browser pool initialized"
        );
        Ok(())
    }

    fn spawn_loop<F, Fut>(self: &Arc<Self>, name: &'static str, every: Duration, tick: F)
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let weak: Weak<Self> = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick fires immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(pool) = weak.upgrade() else { break };
                        tick(pool).await;
                    },
                }
            }
            debug!(task = name, "pool loop stopped");
        });
    }

    /// Check out a page.
    ///
    /// Tries a free page with a matching proxy, then a new page on the
    /// least-loaded healthy browser, then a new browser. Fails fast with
    /// [`BrowserError::PoolExhausted`] past the hard cap.
    pub async fn acquire_page(&self, opts: AcquireOptions) -> Result<PageHandle, BrowserError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::PoolClosed);
        }
        if let Some(handle) = self.take_free_page(&opts).await {
            return Ok(handle);
        }
        if let Some(browser) = self.reserve_on_existing().await {
            return self.open_reserved(browser, &opts).await;
        }

        let browser = {
            let _guard = self.scale_lock.lock().await;
            if self.closed.load(Ordering::SeqCst) {
                return Err(BrowserError::PoolClosed);
            }
            // a concurrent launch may have freed up room while we waited
            if let Some(handle) = self.take_free_page(&opts).await {
                return Ok(handle);
            }
            if let Some(browser) = self.reserve_on_existing().await {
                browser
            } else {
                if self.browser_count().await >= self.config.max_browsers {
                    let capacity = self.config.max_browsers * self.config.pages_per_browser;
                    #[cfg(feature = "metrics")]
                    pagemine_metrics::counter!(pagemine_metrics::browser::POOL_EXHAUSTED_TOTAL)
                        .increment(1);
                    debug!(capacity, "pool exhausted");
                    return Err(BrowserError::PoolExhausted { capacity });
                }
                let browser = self.launch_browser().await?;
                self.mark_scale_event();
                let reserved = browser.state.lock().await.reserve(self.config.pages_per_browser);
                if reserved.is_none() {
                    return Err(BrowserError::PoolExhausted {
                        capacity: self.config.max_browsers * self.config.pages_per_browser,
                    });
                }
                browser
            }
        };
        self.open_reserved(browser, &opts).await
    }

    /// Return a page to the pool, or destroy it with `close`.
    ///
    /// Returns `false` (and changes nothing) when the handle is not currently
    /// checked out: already released, re-acquired by someone else, or gone.
    pub async fn release_page(&self, handle: &PageHandle, opts: ReleaseOptions) -> bool {
        let Some(browser) = self.browser(handle.browser_id()).await else {
            debug!(
                page_id = handle.id(),
                browser_id = handle.browser_id(),
                "release of page on a removed browser ignored"
            );
            return false;
        };

        if !Self::holds_lease(&browser, handle).await {
            warn!(page_id = handle.id(), "release of a page not checked out ignored");
            return false;
        }

        let mut close = opts.close;
        if !close && let Err(e) = handle.driver().clear_storage().await {
            warn!(page_id = handle.id(), error = %e, "failed to clear page storage, closing page");
            close = true;
        }

        let mut state = browser.state.lock().await;
        let Some(entry) = state.pages.get_mut(handle.id()) else {
            return false;
        };
        if !entry.in_use || entry.lease != handle.lease() {
            return false;
        }
        if close {
            let removed = state.pages.remove(handle.id());
            drop(state);
            if let Some(entry) = removed {
                close_page(&entry.driver, "released").await;
            }
        } else {
            entry.in_use = false;
            entry.last_used = Instant::now();
            drop(state);
        }
        #[cfg(feature = "metrics")]
        self.record_page_gauges().await;
        true
    }

    /// Run `task` on a checked-out page. The page is released on every path;
    /// a failed (or panicking) task closes it rather than reusing it.
    pub async fn execute<T, E, F, Fut>(&self, opts: AcquireOptions, task: F) -> Result<T, E>
    where
        F: FnOnce(PageHandle) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<BrowserError>,
    {
        let page = self.acquire_page(opts).await?;
        let started = Instant::now();
        let outcome = AssertUnwindSafe(task(page.clone())).catch_unwind().await;
        let succeeded = matches!(outcome, Ok(Ok(_)));

        self.release_page(&page, ReleaseOptions { close: !succeeded })
            .await;
        self.record_task(started.elapsed(), succeeded);

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Cancel the background loops and close every page and browser.
    /// Close errors are ignored.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();

        let browsers: Vec<Arc<ManagedBrowser>> = {
            let _guard = self.scale_lock.lock().await;
            self.browsers.write().await.drain().map(|(_, b)| b).collect()
        };
        for browser in browsers {
            self.close_browser(&browser, "shutdown").await;
        }
        info!("browser pool shut down");
    }

    pub async fn stats(&self) -> PoolStats {
        let browsers = self.snapshot_browsers().await;
        let mut stats = PoolStats {
            browsers: browsers.len(),
            tasks_total: self.counters.tasks_total.load(Ordering::Relaxed),
            tasks_succeeded: self.counters.tasks_succeeded.load(Ordering::Relaxed),
            tasks_failed: self.counters.tasks_failed.load(Ordering::Relaxed),
            avg_task_ms: self
                .counters
                .avg_task_ms
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .unwrap_or(0.0),
            browsers_created: self.counters.browsers_created.load(Ordering::Relaxed),
            browsers_closed: self.counters.browsers_closed.load(Ordering::Relaxed),
            browsers_recovered: self.counters.browsers_recovered.load(Ordering::Relaxed),
            ..Default::default()
        };
        for browser in &browsers {
            let state = browser.state.lock().await;
            if state.health == BrowserHealth::Healthy {
                stats.healthy_browsers += 1;
            }
            stats.pages_total += state.pages.len();
            stats.pages_in_use += state.in_use();
        }
        let capacity = stats.browsers * self.config.pages_per_browser;
        if capacity > 0 {
            stats.utilization = stats.pages_in_use as f64 / capacity as f64;
        }
        stats
    }

    /// Health of every browser, oldest first.
    pub async fn browser_health(&self) -> Vec<(String, BrowserHealth)> {
        let mut browsers = self.snapshot_browsers().await;
        browsers.sort_by_key(|b| b.created_at);
        let mut out = Vec::with_capacity(browsers.len());
        for b in browsers {
            let health = b.state.lock().await.health;
            out.push((b.id.clone(), health));
        }
        out
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn browser_count(&self) -> usize {
        self.browsers.read().await.len()
    }

    // ── acquisition internals ───────────────────────────────────────────────

    async fn browser(&self, id: &str) -> Option<Arc<ManagedBrowser>> {
        self.browsers.read().await.get(id).cloned()
    }

    async fn snapshot_browsers(&self) -> Vec<Arc<ManagedBrowser>> {
        self.browsers.read().await.values().cloned().collect()
    }

    async fn holds_lease(browser: &ManagedBrowser, handle: &PageHandle) -> bool {
        let state = browser.state.lock().await;
        state
            .pages
            .get(handle.id())
            .is_some_and(|p| p.in_use && p.lease == handle.lease())
    }

    async fn take_free_page(&self, opts: &AcquireOptions) -> Option<PageHandle> {
        for browser in self.snapshot_browsers().await {
            let mut state = browser.state.lock().await;
            if state.health != BrowserHealth::Healthy {
                continue;
            }
            let now = Instant::now();
            let lease = self.next_lease.fetch_add(1, Ordering::Relaxed);
            let Some((page_id, entry)) = state
                .pages
                .iter_mut()
                .find(|(_, p)| !p.in_use && p.proxy == opts.proxy)
            else {
                continue;
            };
            entry.in_use = true;
            entry.lease = lease;
            entry.last_used = now;
            let handle = self.handle(&browser.id, page_id.clone(), entry);
            state.last_used = now;
            debug!(page_id = handle.id(), browser_id = %browser.id, "reusing free page");
            return Some(handle);
        }
        None
    }

    /// Reserve a slot on the least-loaded healthy browser with room.
    async fn reserve_on_existing(&self) -> Option<Arc<ManagedBrowser>> {
        let mut candidates = Vec::new();
        for browser in self.snapshot_browsers().await {
            let state = browser.state.lock().await;
            if state.health == BrowserHealth::Healthy {
                candidates.push((state.load(), Arc::clone(&browser)));
            }
        }
        candidates.sort_by_key(|(load, _)| *load);

        for (_, browser) in candidates {
            let reserved = browser.state.lock().await.reserve(self.config.pages_per_browser);
            match reserved {
                Some(Some(evicted)) => {
                    close_page(&evicted, "evicted").await;
                    return Some(browser);
                },
                Some(None) => return Some(browser),
                None => continue,
            }
        }
        None
    }

    async fn open_reserved(
        &self,
        browser: Arc<ManagedBrowser>,
        opts: &AcquireOptions,
    ) -> Result<PageHandle, BrowserError> {
        let opened = browser.process.new_page(opts.proxy.as_deref()).await;

        let mut state = browser.state.lock().await;
        state.opening = state.opening.saturating_sub(1);
        let driver = opened?;

        if state.health != BrowserHealth::Healthy {
            drop(state);
            close_page(&driver, "orphaned").await;
            return Err(BrowserError::LaunchFailed(format!(
                "browser {} went away while opening a page",
                browser.id
            )));
        }

        let now = Instant::now();
        let page_id = generate_id("page");
        let entry = PageEntry {
            driver,
            in_use: true,
            lease: self.next_lease.fetch_add(1, Ordering::Relaxed),
            last_used: now,
            proxy: opts.proxy.clone(),
        };
        let handle = self.handle(&browser.id, page_id.clone(), &entry);
        state.pages.insert(page_id, entry);
        state.last_used = now;
        drop(state);

        debug!(page_id = handle.id(), browser_id = %browser.id, proxy = ?opts.proxy, "opened page");
        #[cfg(feature = "metrics")]
        self.record_page_gauges().await;
        Ok(handle)
    }

    fn handle(&self, browser_id: &str, page_id: String, entry: &PageEntry) -> PageHandle {
        PageHandle::new(
            page_id,
            browser_id.to_string(),
            entry.lease,
            entry.proxy.clone(),
            Duration::from_millis(self.config.navigation_timeout_ms),
            Arc::clone(&entry.driver),
        )
    }

    // ── browser lifecycle ───────────────────────────────────────────────────

    /// Launch and register one browser. Callers hold `scale_lock`.
    async fn launch_browser(&self) -> Result<Arc<ManagedBrowser>, BrowserError> {
        let id = generate_id("browser");
        let process = self.launcher.launch(&id).await?;
        let now = Instant::now();
        let browser = Arc::new(ManagedBrowser {
            id: id.clone(),
            created_at: now,
            process,
            state: Mutex::new(BrowserState {
                health: BrowserHealth::Starting,
                pages: HashMap::new(),
                opening: 0,
                last_used: now,
            }),
        });
        browser.state.lock().await.health = BrowserHealth::Healthy;
        self.browsers
            .write()
            .await
            .insert(id.clone(), Arc::clone(&browser));

        self.counters
            .browsers_created
            .fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        {
            pagemine_metrics::counter!(pagemine_metrics::browser::INSTANCES_CREATED_TOTAL)
                .increment(1);
            pagemine_metrics::gauge!(pagemine_metrics::browser::INSTANCES_ACTIVE)
                .set(self.browser_count().await as f64);
        }
        let _ = self.events.send(PoolEvent::BrowserLaunched {
            browser_id: id.clone(),
        });
        info!(browser_id = id, "launched browser");
        Ok(browser)
    }

    /// Close an already-unregistered browser and all its pages.
    async fn close_browser(&self, browser: &ManagedBrowser, reason: &str) {
        let pages = {
            let mut state = browser.state.lock().await;
            state.health = BrowserHealth::Closed;
            state.drain_pages()
        };
        for page in pages {
            close_page(&page, reason).await;
        }
        if let Err(e) = browser.process.close().await {
            debug!(browser_id = %browser.id, error = %e, "browser close failed");
        }

        self.counters.browsers_closed.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        {
            pagemine_metrics::counter!(pagemine_metrics::browser::INSTANCES_DESTROYED_TOTAL)
                .increment(1);
            pagemine_metrics::gauge!(pagemine_metrics::browser::INSTANCES_ACTIVE)
                .set(self.browser_count().await as f64);
        }
        let _ = self.events.send(PoolEvent::BrowserClosed {
            browser_id: browser.id.clone(),
            reason: reason.to_string(),
        });
        info!(browser_id = %browser.id, reason, "closed browser");
    }

    fn mark_scale_event(&self) {
        *self
            .last_scale_event
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    fn in_cooldown(&self) -> bool {
        let cooldown = Duration::from_secs(self.config.scale_down_cooldown_secs);
        self.last_scale_event
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some_and(|at| at.elapsed() < cooldown)
    }

    // ── background work ─────────────────────────────────────────────────────

    async fn health_tick(&self) {
        for browser in self.snapshot_browsers().await {
            if browser.state.lock().await.health != BrowserHealth::Healthy {
                continue;
            }
            if let Err(e) = self.ping(&browser).await {
                warn!(browser_id = %browser.id, error = %e, "browser failed health check");
                #[cfg(feature = "metrics")]
                pagemine_metrics::counter!(pagemine_metrics::browser::HEALTH_FAILURES_TOTAL)
                    .increment(1);
                self.recover(&browser).await;
            }
        }
        self.reap_idle_pages().await;
        self.restore_minimum().await;
    }

    /// Open and close a throwaway page within the health-check timeout.
    async fn ping(&self, browser: &ManagedBrowser) -> Result<(), BrowserError> {
        let timeout = Duration::from_millis(self.config.health_check_timeout_ms);
        let check = async {
            let page = browser.process.new_page(None).await?;
            page.close().await
        };
        match tokio::time::timeout(timeout, check).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::Timeout(format!(
                "health check exceeded {}ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn recover(&self, browser: &Arc<ManagedBrowser>) {
        browser.state.lock().await.health = BrowserHealth::Degraded;
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        browser.state.lock().await.health = BrowserHealth::Recovering;

        let replacement = {
            let _guard = self.scale_lock.lock().await;
            self.browsers.write().await.remove(&browser.id);
            self.close_browser(browser, "health check failed").await;

            let mut replacement = None;
            if !self.closed.load(Ordering::SeqCst)
                && self.browser_count().await < self.config.min_browsers
            {
                match self.launch_browser().await {
                    Ok(b) => replacement = Some(b.id.clone()),
                    Err(e) => warn!(error = %e, "failed to launch replacement browser"),
                }
            }
            replacement
        };

        self.counters
            .browsers_recovered
            .fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        pagemine_metrics::counter!(pagemine_metrics::browser::RECOVERIES_TOTAL).increment(1);
        info!(
            failed_browser_id = %browser.id,
            replacement_id = ?replacement,
            "recovered from browser failure"
        );
        let _ = self.events.send(PoolEvent::BrowserRecovered {
            failed_browser_id: browser.id.clone(),
            replacement_id: replacement,
        });
    }

    /// Relaunch browsers missing after failed replacements.
    async fn restore_minimum(&self) {
        let _guard = self.scale_lock.lock().await;
        while !self.closed.load(Ordering::SeqCst)
            && self.browser_count().await < self.config.min_browsers
        {
            if let Err(e) = self.launch_browser().await {
                warn!(error = %e, "failed to restore minimum browser count");
                break;
            }
        }
    }

    /// Close free pages unused for longer than the idle timeout.
    async fn reap_idle_pages(&self) {
        let idle = Duration::from_secs(self.config.page_idle_timeout_secs);
        for browser in self.snapshot_browsers().await {
            let stale: Vec<Arc<dyn PageDriver>> = {
                let mut state = browser.state.lock().await;
                let ids: Vec<String> = state
                    .pages
                    .iter()
                    .filter(|(_, p)| !p.in_use && p.last_used.elapsed() > idle)
                    .map(|(id, _)| id.clone())
                    .collect();
                ids.iter()
                    .filter_map(|id| state.pages.remove(id))
                    .map(|p| p.driver)
                    .collect()
            };
            if !stale.is_empty() {
                debug!(browser_id = %browser.id, pages = stale.len(), "reaping idle pages");
            }
            for page in stale {
                close_page(&page, "idle").await;
            }
        }
    }

    async fn scale_tick(&self) {
        let stats = self.stats().await;
        if stats.browsers == 0 || self.closed.load(Ordering::SeqCst) {
            return;
        }
        #[cfg(feature = "metrics")]
        pagemine_metrics::gauge!(pagemine_metrics::browser::POOL_UTILIZATION)
            .set(stats.utilization);

        if stats.utilization > self.config.scale_up_threshold
            && stats.browsers < self.config.max_browsers
        {
            let _guard = self.scale_lock.lock().await;
            if self.browser_count().await < self.config.max_browsers {
                match self.launch_browser().await {
                    Ok(b) => {
                        self.mark_scale_event();
                        info!(browser_id = %b.id, utilization = stats.utilization, "scaled up");
                    },
                    Err(e) => warn!(error = %e, "scale-up launch failed"),
                }
            }
        } else if stats.utilization < self.config.scale_down_threshold
            && stats.browsers > self.config.min_browsers
            && !self.in_cooldown()
        {
            self.scale_down(stats.utilization).await;
        }
    }

    /// Close the oldest browser with no pages in use or being opened.
    async fn scale_down(&self, utilization: f64) {
        let _guard = self.scale_lock.lock().await;
        if self.browser_count().await <= self.config.min_browsers {
            return;
        }
        let mut browsers = self.snapshot_browsers().await;
        browsers.sort_by_key(|b| b.created_at);

        for browser in browsers {
            {
                let mut state = browser.state.lock().await;
                if state.health != BrowserHealth::Healthy
                    || state.in_use() > 0
                    || state.opening > 0
                {
                    continue;
                }
                // no new checkouts once it is marked closed
                state.health = BrowserHealth::Closed;
            }
            self.browsers.write().await.remove(&browser.id);
            self.close_browser(&browser, "scale down").await;
            self.mark_scale_event();
            info!(browser_id = %browser.id, utilization, "scaled down");
            return;
        }
    }

    fn record_task(&self, elapsed: Duration, succeeded: bool) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.counters.tasks_total.fetch_add(1, Ordering::Relaxed);
        if succeeded {
            self.counters.tasks_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.tasks_failed.fetch_add(1, Ordering::Relaxed);
        }
        {
            let mut avg = self
                .counters
                .avg_task_ms
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            *avg = Some(match *avg {
                Some(prev) => prev + TASK_EMA_ALPHA * (ms - prev),
                None => ms,
            });
        }
        #[cfg(feature = "metrics")]
        pagemine_metrics::histogram!(
            pagemine_metrics::browser::TASK_DURATION_SECONDS,
            pagemine_metrics::labels::STATUS => if succeeded { "ok" } else { "error" }
        )
        .record(elapsed.as_secs_f64());
    }

    #[cfg(feature = "metrics")]
    async fn record_page_gauges(&self) {
        let stats = self.stats().await;
        pagemine_metrics::gauge!(pagemine_metrics::browser::PAGES_IN_USE)
            .set(stats.pages_in_use as f64);
        pagemine_metrics::gauge!(pagemine_metrics::browser::POOL_UTILIZATION)
            .set(stats.utilization);
    }
}

impl Drop for BrowserPool {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn close_page(page: &Arc<dyn PageDriver>, reason: &str) {
    if let Err(e) = page.close().await {
        debug!(reason, error = %e, "page close failed");
    }
}

/// Random identifier such as `browser-1f3a…`.
fn generate_id(prefix: &str) -> String {
    use rand::Rng;
    let id: u64 = rand::rng().random();
    format!("{prefix}-{id:016x}")
}
