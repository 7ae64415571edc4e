//! In-memory browser driver for tests.
//!
//! [`MockLauncher`] hands out fake processes whose pages serve canned HTML,
//! DOM snapshots and script results. Browsers can be forced unhealthy and
//! navigations can be made to fail, so pool recovery and retry paths run
//! without Chrome.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use {async_trait::async_trait, serde_json::Value};

use crate::{
    driver::{BrowserLauncher, BrowserProcess, PageDriver},
    error::BrowserError,
};

/// Script handler: `(script, current_url) -> value`.
pub type EvalFn = Arc<dyn Fn(&str, &str) -> Result<Value, BrowserError> + Send + Sync>;

/// One canned page.
#[derive(Debug, Clone, Default)]
pub struct MockSite {
    pub html: String,
    /// Raw `DOMSnapshot.captureSnapshot` JSON.
    pub snapshot: Option<Value>,
    /// URL reported after navigation (redirect target).
    pub final_url: Option<String>,
}

#[derive(Default)]
struct Shared {
    sites: RwLock<HashMap<String, MockSite>>,
    eval: RwLock<Option<EvalFn>>,
    goto_failures: Mutex<HashMap<String, u32>>,
    goto_delay: Mutex<Duration>,
    fail_launch: AtomicBool,
    launched: AtomicUsize,
    browsers: Mutex<Vec<Arc<MockBrowserState>>>,
    pages_opened: AtomicUsize,
    pages_closed: AtomicUsize,
    storage_clears: AtomicUsize,
    navigations: Mutex<Vec<String>>,
}

struct MockBrowserState {
    id: String,
    unhealthy: AtomicBool,
    closed: AtomicBool,
}

/// Launcher producing in-memory browsers. Clones share state.
#[derive(Clone, Default)]
pub struct MockLauncher {
    shared: Arc<Shared>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` for `url`.
    #[must_use]
    pub fn with_site(self, url: &str, html: &str) -> Self {
        self.set_site(url, MockSite {
            html: html.to_string(),
            ..Default::default()
        });
        self
    }

    pub fn set_site(&self, url: &str, site: MockSite) {
        self.shared
            .sites
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), site);
    }

    pub fn set_eval(&self, f: EvalFn) {
        *self.shared.eval.write().unwrap_or_else(|e| e.into_inner()) = Some(f);
    }

    /// Fail the next `times` navigations to `url`.
    pub fn fail_goto(&self, url: &str, times: u32) {
        self.shared
            .goto_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), times);
    }

    /// Delay every navigation (tokio time, so paused clocks apply).
    pub fn set_goto_delay(&self, delay: Duration) {
        *self
            .shared
            .goto_delay
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn set_fail_launch(&self, fail: bool) {
        self.shared.fail_launch.store(fail, Ordering::SeqCst);
    }

    /// Make a browser fail every subsequent `new_page`, and so its health checks.
    pub fn set_unhealthy(&self, browser_id: &str, unhealthy: bool) {
        let browsers = self
            .shared
            .browsers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        for b in browsers.iter().filter(|b| b.id == browser_id) {
            b.unhealthy.store(unhealthy, Ordering::SeqCst);
        }
    }

    pub fn launched(&self) -> usize {
        self.shared.launched.load(Ordering::SeqCst)
    }

    /// Browsers launched and not yet closed.
    pub fn open_browsers(&self) -> usize {
        self.shared
            .browsers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|b| !b.closed.load(Ordering::SeqCst))
            .count()
    }

    pub fn pages_opened(&self) -> usize {
        self.shared.pages_opened.load(Ordering::SeqCst)
    }

    pub fn pages_closed(&self) -> usize {
        self.shared.pages_closed.load(Ordering::SeqCst)
    }

    pub fn storage_clears(&self) -> usize {
        self.shared.storage_clears.load(Ordering::SeqCst)
    }

    /// Every URL navigated to, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.shared
            .navigations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(&self, browser_id: &str) -> Result<Box<dyn BrowserProcess>, BrowserError> {
        if self.shared.fail_launch.load(Ordering::SeqCst) {
            return Err(BrowserError::LaunchFailed("mock launch disabled".into()));
        }
        self.shared.launched.fetch_add(1, Ordering::SeqCst);
        let state = Arc::new(MockBrowserState {
            id: browser_id.to_string(),
            unhealthy: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        self.shared
            .browsers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::clone(&state));
        Ok(Box::new(MockBrowser {
            state,
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct MockBrowser {
    state: Arc<MockBrowserState>,
    shared: Arc<Shared>,
}

#[async_trait]
impl BrowserProcess for MockBrowser {
    async fn new_page(&self, _proxy: Option<&str>) -> Result<Arc<dyn PageDriver>, BrowserError> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::Cdp("browser closed".into()));
        }
        if self.state.unhealthy.load(Ordering::SeqCst) {
            return Err(BrowserError::Cdp(format!(
                "target crashed in {}",
                self.state.id
            )));
        }
        self.shared.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockPage {
            shared: Arc::clone(&self.shared),
            url: Mutex::new("about:blank".into()),
        }))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MockPage {
    shared: Arc<Shared>,
    url: Mutex<String>,
}

impl MockPage {
    fn current_url(&self) -> String {
        self.url.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn site(&self) -> Option<MockSite> {
        let url = self.current_url();
        let sites = self.shared.sites.read().unwrap_or_else(|e| e.into_inner());
        sites
            .get(&url)
            .or_else(|| sites.values().find(|s| s.final_url.as_deref() == Some(&url)))
            .cloned()
    }
}

#[async_trait]
impl PageDriver for MockPage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        let delay = *self
            .shared
            .goto_delay
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.shared
            .navigations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());

        {
            let mut failures = self
                .shared
                .goto_failures
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if let Some(left) = failures.get_mut(url)
                && *left > 0
            {
                *left -= 1;
                return Err(BrowserError::NavigationFailed(format!(
                    "net::ERR_CONNECTION_RESET at {url}"
                )));
            }
        }

        let final_url = self
            .shared
            .sites
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .and_then(|s| s.final_url.clone())
            .unwrap_or_else(|| url.to_string());
        *self.url.lock().unwrap_or_else(|e| e.into_inner()) = final_url;
        Ok(())
    }

    async fn url(&self) -> Result<Option<String>, BrowserError> {
        Ok(Some(self.current_url()))
    }

    async fn content(&self) -> Result<String, BrowserError> {
        Ok(self
            .site()
            .map(|s| s.html)
            .unwrap_or_else(|| "<html><head></head><body></body></html>".into()))
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        let eval = self
            .shared
            .eval
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match eval {
            Some(f) => f(script, &self.current_url()),
            None => Ok(Value::Null),
        }
    }

    async fn capture_snapshot(&self, _computed_styles: &[&str]) -> Result<Value, BrowserError> {
        Ok(self
            .site()
            .and_then(|s| s.snapshot)
            .unwrap_or_else(|| serde_json::json!({ "documents": [], "strings": [] })))
    }

    async fn clear_storage(&self) -> Result<(), BrowserError> {
        self.shared.storage_clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.shared.pages_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
