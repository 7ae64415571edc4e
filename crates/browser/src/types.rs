//! Pool configuration, acquisition options, health states and events.

use std::{fmt, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{driver::PageDriver, error::BrowserError};

pub use pagemine_config::BrowserPoolConfig as PoolConfig;

/// Options for [`crate::BrowserPool::acquire_page`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquireOptions {
    /// Proxy server (`scheme://host:port`) the page must route through.
    pub proxy: Option<String>,
}

impl AcquireOptions {
    #[must_use]
    pub fn with_proxy(proxy: impl Into<String>) -> Self {
        Self {
            proxy: Some(proxy.into()),
        }
    }
}

/// Options for [`crate::BrowserPool::release_page`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReleaseOptions {
    /// Destroy the page instead of returning it to the free set.
    pub close: bool,
}

/// Browser process health.
///
/// `Starting → Healthy → (Degraded → Recovering → Healthy) | Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserHealth {
    Starting,
    Healthy,
    Degraded,
    Recovering,
    Closed,
}

impl fmt::Display for BrowserHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Recovering => "recovering",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// A page checked out of the pool.
///
/// Holding a handle grants exclusive use of the page until it is released.
#[derive(Clone)]
pub struct PageHandle {
    id: String,
    browser_id: String,
    /// Checkout generation; a stale clone cannot release a re-acquired page.
    lease: u64,
    proxy: Option<String>,
    navigation_timeout: Duration,
    driver: Arc<dyn PageDriver>,
}

impl fmt::Debug for PageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageHandle")
            .field("id", &self.id)
            .field("browser_id", &self.browser_id)
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}

impl PageHandle {
    pub(crate) fn new(
        id: String,
        browser_id: String,
        lease: u64,
        proxy: Option<String>,
        navigation_timeout: Duration,
        driver: Arc<dyn PageDriver>,
    ) -> Self {
        Self {
            id,
            browser_id,
            lease,
            proxy,
            navigation_timeout,
            driver,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn browser_id(&self) -> &str {
        &self.browser_id
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    /// Navigate and wait for the load, bounded by the pool's navigation timeout.
    pub async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        match tokio::time::timeout(self.navigation_timeout, self.driver.goto(url)).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::Timeout(format!(
                "navigation to {url} exceeded {}ms",
                self.navigation_timeout.as_millis()
            ))),
        }
    }

    /// Current URL after redirects.
    pub async fn url(&self) -> Result<Option<String>, BrowserError> {
        self.driver.url().await
    }

    /// Serialized HTML of the current document.
    pub async fn content(&self) -> Result<String, BrowserError> {
        self.driver.content().await
    }

    /// Evaluate a JavaScript expression and return its JSON value.
    pub async fn evaluate(&self, script: &str) -> Result<serde_json::Value, BrowserError> {
        self.driver.evaluate(script).await
    }

    /// Raw `DOMSnapshot.captureSnapshot` result as JSON.
    pub async fn capture_snapshot(
        &self,
        computed_styles: &[&str],
    ) -> Result<serde_json::Value, BrowserError> {
        self.driver.capture_snapshot(computed_styles).await
    }

    pub(crate) fn lease(&self) -> u64 {
        self.lease
    }

    pub(crate) fn driver(&self) -> &Arc<dyn PageDriver> {
        &self.driver
    }
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolStats {
    pub browsers: usize,
    pub healthy_browsers: usize,
    pub pages_total: usize,
    pub pages_in_use: usize,
    /// `pages_in_use / (browsers × pages_per_browser)`
    pub utilization: f64,
    pub tasks_total: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    /// Exponentially weighted task duration.
    pub avg_task_ms: f64,
    pub browsers_created: u64,
    pub browsers_closed: u64,
    pub browsers_recovered: u64,
}

/// Lifecycle notifications broadcast by the pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolEvent {
    BrowserLaunched {
        browser_id: String,
    },
    BrowserClosed {
        browser_id: String,
        reason: String,
    },
    BrowserRecovered {
        failed_browser_id: String,
        replacement_id: Option<String>,
    },
}
