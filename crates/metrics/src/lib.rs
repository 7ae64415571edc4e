//! Metrics collection and export for pagemine.
//!
//! All components record through the `metrics` crate facade; with no recorder
//! installed every call is a no-op. The `prometheus` feature installs a
//! Prometheus recorder whose text output can be rendered from [`MetricsHandle`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use pagemine_metrics::{counter, gauge, histogram};
//!
//! counter!(pagemine_metrics::miner::URLS_PROCESSED_TOTAL, "status" => "ok").increment(1);
//! gauge!(pagemine_metrics::browser::INSTANCES_ACTIVE).set(2.0);
//! histogram!(pagemine_metrics::extract::DURATION_SECONDS).record(0.42);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
