//! Metric name and label definitions.
//!
//! Every metric recorded by pagemine is named here so the set of exported
//! series can be read in one place.

/// Browser pool metrics
pub mod browser {
    /// Running browser processes
    pub const INSTANCES_ACTIVE: &str = "pagemine_browser_instances_active";
    /// Browsers launched (startup, scale-up, recovery)
    pub const INSTANCES_CREATED_TOTAL: &str = "pagemine_browser_instances_created_total";
    /// Browsers closed (scale-down, failed health, shutdown)
    pub const INSTANCES_DESTROYED_TOTAL: &str = "pagemine_browser_instances_destroyed_total";
    /// Pages currently checked out
    pub const PAGES_IN_USE: &str = "pagemine_browser_pages_in_use";
    /// Acquisitions refused because every slot was taken
    pub const POOL_EXHAUSTED_TOTAL: &str = "pagemine_browser_pool_exhausted_total";
    /// Pages in use divided by total capacity
    pub const POOL_UTILIZATION: &str = "pagemine_browser_pool_utilization";
    /// Duration of `execute` tasks in seconds
    pub const TASK_DURATION_SECONDS: &str = "pagemine_browser_task_duration_seconds";
    /// Failed health checks
    pub const HEALTH_FAILURES_TOTAL: &str = "pagemine_browser_health_failures_total";
    /// Browsers replaced after a failed health check
    pub const RECOVERIES_TOTAL: &str = "pagemine_browser_recoveries_total";
}

/// Crawl policy metrics
pub mod policy {
    /// robots.txt fetches (labels: outcome)
    pub const ROBOTS_FETCHES_TOTAL: &str = "pagemine_policy_robots_fetches_total";
    /// URLs refused by robots rules
    pub const ROBOTS_DISALLOWED_TOTAL: &str = "pagemine_policy_robots_disallowed_total";
    /// Time spent waiting for the rate limiter in seconds
    pub const THROTTLE_WAIT_SECONDS: &str = "pagemine_policy_throttle_wait_seconds";
    /// Proxy selections (labels: proxy)
    pub const PROXY_SELECTIONS_TOTAL: &str = "pagemine_policy_proxy_selections_total";
    /// Proxy failures reported back (labels: proxy)
    pub const PROXY_FAILURES_TOTAL: &str = "pagemine_policy_proxy_failures_total";
}

/// Page structure extraction metrics
pub mod extract {
    /// Completed extractions
    pub const EXTRACTIONS_TOTAL: &str = "pagemine_extract_extractions_total";
    /// Extraction duration in seconds
    pub const DURATION_SECONDS: &str = "pagemine_extract_duration_seconds";
    /// Results served from the extraction cache
    pub const CACHE_HITS_TOTAL: &str = "pagemine_extract_cache_hits_total";
    /// Layers kept per page
    pub const LAYERS_PER_PAGE: &str = "pagemine_extract_layers_per_page";
    /// SEO score per page
    pub const SEO_SCORE: &str = "pagemine_extract_seo_score";
}

/// Orchestrator metrics
pub mod miner {
    /// Instances currently running
    pub const INSTANCES_RUNNING: &str = "pagemine_miner_instances_running";
    /// URLs processed (labels: status)
    pub const URLS_PROCESSED_TOTAL: &str = "pagemine_miner_urls_processed_total";
    /// Retry attempts scheduled
    pub const RETRIES_TOTAL: &str = "pagemine_miner_retries_total";
    /// Per-URL processing duration in seconds
    pub const URL_DURATION_SECONDS: &str = "pagemine_miner_url_duration_seconds";
    /// Results appended to data bundles
    pub const BUNDLE_RESULTS_TOTAL: &str = "pagemine_miner_bundle_results_total";
}

/// Common label keys used across metrics
pub mod labels {
    pub const INSTANCE: &str = "instance";
    pub const STATUS: &str = "status";
    pub const OUTCOME: &str = "outcome";
    pub const PROXY: &str = "proxy";
    pub const DOMAIN: &str = "domain";
    pub const ERROR_TYPE: &str = "error_type";
}

/// Standard histogram buckets for different metric types
pub mod buckets {
    use once_cell::sync::Lazy;

    /// Page task durations (in seconds), 10ms to 2 minutes
    pub static TASK_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
        ]
    });

    /// Throttle waits (in seconds), 1ms to 30s
    pub static THROTTLE_WAIT: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.001, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0,
        ]
    });

    /// SEO score (0-100)
    pub static SEO_SCORE: Lazy<Vec<f64>> =
        Lazy::new(|| vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0]);

    /// Layer counts per page
    pub static LAYER_COUNT: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0,
        ]
    });
}
