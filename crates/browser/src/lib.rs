//! Browser process and page pool for pagemine.
//!
//! [`BrowserPool`] owns a fleet of Chrome/Chromium processes and checks pages
//! out to one task at a time. It health-checks and replaces failed browsers,
//! scales between `min_browsers` and `max_browsers`, and reaps idle pages.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pagemine_browser::{AcquireOptions, BrowserPool, PoolConfig};
//!
//! let pool = Arc::new(BrowserPool::with_chromium(PoolConfig::default()));
//! pool.initialize().await?;
//!
//! let title = pool
//!     .execute(AcquireOptions::default(), |page| async move {
//!         page.goto("https://example.com").await?;
//!         page.evaluate("document.title").await
//!     })
//!     .await?;
//! ```

pub mod chromium;
pub mod detect;
pub mod driver;
pub mod error;
pub mod pool;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

pub use {
    driver::{BrowserLauncher, BrowserProcess, PageDriver},
    error::BrowserError,
    pool::BrowserPool,
    types::{
        AcquireOptions, BrowserHealth, PageHandle, PoolConfig, PoolEvent, PoolStats,
        ReleaseOptions,
    },
};
