/// Config schema types (browser pool, crawl policy, extractor, orchestrator, instances).
use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    pub browser: BrowserPoolConfig,
    pub policy: PolicyConfig,
    pub extractor: ExtractorConfig,
    pub miner: OrchestratorConfig,
    pub metrics: MetricsConfig,
    pub instances: Vec<InstanceConfig>,
}

/// Browser pool sizing, launch options and background loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserPoolConfig {
    /// Browsers launched at startup and kept alive by recovery.
    pub min_browsers: usize,
    /// Hard cap on concurrently running browsers.
    pub max_browsers: usize,
    /// Pages (tabs) a single browser may host.
    pub pages_per_browser: usize,
    pub headless: bool,
    /// Path to Chrome/Chromium binary (auto-detected if not set).
    pub chrome_path: Option<String>,
    /// Additional Chrome arguments.
    pub chrome_args: Vec<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub device_scale_factor: f64,
    /// User agent applied to every new page (browser default if not set).
    pub user_agent: Option<String>,
    pub navigation_timeout_ms: u64,
    /// Free pages unused for longer than this are closed.
    pub page_idle_timeout_secs: u64,
    pub health_check_interval_secs: u64,
    pub health_check_timeout_ms: u64,
    pub auto_scale: bool,
    pub scale_check_interval_secs: u64,
    /// Utilization (0-1) above which one browser is added.
    pub scale_up_threshold: f64,
    /// Utilization (0-1) below which one idle browser is removed.
    pub scale_down_threshold: f64,
    /// Minimum time between a scale event and the next scale-down.
    pub scale_down_cooldown_secs: u64,
}

impl Default for BrowserPoolConfig {
    fn default() -> Self {
        Self {
            min_browsers: 1,
            max_browsers: 4,
            pages_per_browser: 4,
            headless: true,
            chrome_path: None,
            chrome_args: Vec::new(),
            viewport_width: 1920,
            viewport_height: 1080,
            device_scale_factor: 1.0,
            user_agent: None,
            navigation_timeout_ms: 30_000,
            page_idle_timeout_secs: 300,
            health_check_interval_secs: 30,
            health_check_timeout_ms: 5_000,
            auto_scale: true,
            scale_check_interval_secs: 10,
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.2,
            scale_down_cooldown_secs: 60,
        }
    }
}

/// Site etiquette: robots, rate limits, retries and proxies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// User agent used for robots.txt group matching and fetching.
    pub user_agent: String,
    pub respect_robots: bool,
    pub robots_cache_ttl_secs: u64,
    pub robots_timeout_ms: u64,
    pub min_crawl_delay_ms: u64,
    pub max_crawl_delay_ms: u64,
    pub requests_per_second: u32,
    /// When false, all domains share a single window.
    pub per_domain_limit: bool,
    pub retry: RetryConfig,
    pub proxy: ProxyPoolConfig,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            user_agent: "pagemine/0.3 (+https://github.com/pagemine/pagemine)".into(),
            respect_robots: true,
            robots_cache_ttl_secs: 3600,
            robots_timeout_ms: 10_000,
            min_crawl_delay_ms: 0,
            max_crawl_delay_ms: 30_000,
            requests_per_second: 2,
            per_domain_limit: true,
            retry: RetryConfig::default(),
            proxy: ProxyPoolConfig::default(),
        }
    }
}

/// Exponential backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

/// Proxy selection strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    #[default]
    RoundRobin,
    LeastUsed,
    Smart,
}

impl std::fmt::Display for RotationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoundRobin => write!(f, "round_robin"),
            Self::LeastUsed => write!(f, "least_used"),
            Self::Smart => write!(f, "smart"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyPoolConfig {
    pub enabled: bool,
    pub strategy: RotationStrategy,
    pub endpoints: Vec<ProxyEndpointConfig>,
}

/// Proxy protocol/scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    #[default]
    Http,
    Https,
    Socks5,
}

impl ProxyProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Socks5 => "socks5",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyEndpointConfig {
    /// Stable identifier; derived from host and port when empty.
    pub id: Option<String>,
    pub host: String,
    pub port: u16,
    pub protocol: ProxyProtocol,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<Secret<String>>,
    pub country: Option<String>,
    pub provider: Option<String>,
}

/// Page-structure extraction tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Layers and hierarchy nodes scoring below this are dropped.
    pub min_importance_score: f64,
    /// Depth bound for the live DOM walk.
    pub max_depth: usize,
    pub max_layers: usize,
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    /// Cached structures kept at most; the oldest is evicted past this.
    pub cache_max_entries: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_importance_score: 0.3,
            max_depth: 12,
            max_layers: 500,
            cache_enabled: false,
            cache_ttl_secs: 600,
            cache_max_entries: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Capacity of the event broadcast channel.
    pub event_buffer: usize,
    /// Instances allowed in `running` at once (0 = unlimited).
    pub max_concurrent_instances: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            event_buffer: 1024,
            max_concurrent_instances: 0,
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Install the Prometheus recorder (requires the `prometheus` feature).
    pub prometheus: bool,
}

/// One named mining instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    pub name: String,
    /// Bundle topic results are appended to (defaults to the instance name).
    pub topic: Option<String>,
    pub urls: Vec<String>,
    pub attributes: Vec<AttributeSpec>,
    /// Names of registered custom extractors to run on every page.
    pub custom_extractors: Vec<String>,
    /// Run the layer/hierarchy/SEO extractor on each page.
    pub extract_structure: bool,
    /// Enqueue same-host links found on mined pages.
    pub follow_links: bool,
    pub max_discovered_urls: usize,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            topic: None,
            urls: Vec::new(),
            attributes: Vec::new(),
            custom_extractors: Vec::new(),
            extract_structure: true,
            follow_links: false,
            max_discovered_urls: 100,
        }
    }
}

impl InstanceConfig {
    pub fn topic(&self) -> &str {
        self.topic.as_deref().unwrap_or(&self.name)
    }
}

/// A named CSS selector whose matches become one attribute of a result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeSpec {
    pub name: String,
    pub selector: String,
    /// Element attribute to read instead of the text content (e.g. `href`).
    pub attribute: Option<String>,
    /// Collect every match instead of the first one.
    pub multiple: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_topic_defaults_to_name() {
        let cfg = InstanceConfig {
            name: "news".into(),
            ..Default::default()
        };
        assert_eq!(cfg.topic(), "news");

        let cfg = InstanceConfig {
            name: "news".into(),
            topic: Some("headlines".into()),
            ..Default::default()
        };
        assert_eq!(cfg.topic(), "headlines");
    }

    #[test]
    fn rotation_strategy_parses_snake_case() {
        let cfg: ProxyPoolConfig =
            toml::from_str("enabled = true\nstrategy = \"least_used\"").unwrap_or_default();
        assert_eq!(cfg.strategy, RotationStrategy::LeastUsed);
        assert!(cfg.enabled);
    }

    #[test]
    fn default_pool_thresholds() {
        let cfg = BrowserPoolConfig::default();
        assert!((cfg.scale_up_threshold - 0.8).abs() < f64::EPSILON);
        assert!((cfg.scale_down_threshold - 0.2).abs() < f64::EPSILON);
        assert!(cfg.min_browsers <= cfg.max_browsers);
    }
}
