//! Browser error types.

use thiserror::Error;

/// Errors that can occur during pool and page operations.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser not available: Chrome/Chromium not found")]
    BrowserNotAvailable,

    #[error("pool exhausted: all {capacity} page slots are in use")]
    PoolExhausted { capacity: usize },

    #[error("pool is shut down")]
    PoolClosed,

    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("JavaScript evaluation failed: {0}")]
    JsEvalFailed(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("page not found: {0}")]
    PageNotFound(String),

    #[error("CDP error: {0}")]
    Cdp(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BrowserError {
    /// Capacity errors are surfaced to the caller and never retried by the pool.
    #[must_use]
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. })
    }
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserError::Cdp(err.to_string())
    }
}
