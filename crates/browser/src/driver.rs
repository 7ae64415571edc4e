//! Driver seam between the pool and a concrete browser backend.
//!
//! The pool only ever talks to these traits. [`crate::chromium`] implements
//! them over CDP; [`crate::testing`] implements them in memory.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BrowserError;

/// Starts browser processes.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, browser_id: &str) -> Result<Box<dyn BrowserProcess>, BrowserError>;
}

/// One running browser process.
#[async_trait]
pub trait BrowserProcess: Send + Sync {
    /// Open a page. With `proxy`, the page lives in an isolated context
    /// routed through that proxy server.
    async fn new_page(&self, proxy: Option<&str>) -> Result<Arc<dyn PageDriver>, BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;
}

/// One page (tab) inside a browser process.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;

    async fn url(&self) -> Result<Option<String>, BrowserError>;

    async fn content(&self) -> Result<String, BrowserError>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, BrowserError>;

    /// `DOMSnapshot.captureSnapshot` with paint order and DOM rects, plus the
    /// listed computed styles, as raw JSON.
    async fn capture_snapshot(
        &self,
        computed_styles: &[&str],
    ) -> Result<serde_json::Value, BrowserError>;

    /// Drop page-local state (local/session storage) before reuse.
    async fn clear_storage(&self) -> Result<(), BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;
}
