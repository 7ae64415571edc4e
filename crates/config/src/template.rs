//! Default configuration template with all options documented.
//!
//! Written by `pagemine config init`. Every option is listed with its default
//! so users can see what is tunable without reading the schema.

/// Generate the default config template.
pub fn default_config_template() -> String {
    r##"# pagemine configuration
# ======================
# Environment variable substitution is supported: ${ENV_VAR}
# Example: password = "${PROXY_PASSWORD}"

# ══════════════════════════════════════════════════════════════════════════════
# BROWSER POOL
# ══════════════════════════════════════════════════════════════════════════════

[browser]
min_browsers = 1                  # Launched at startup, restored by recovery
max_browsers = 4                  # Hard cap; acquisitions past it fail fast
pages_per_browser = 4             # Tabs per browser process
headless = true
# chrome_path = "/usr/bin/chromium"
chrome_args = []
viewport_width = 1920
viewport_height = 1080
device_scale_factor = 1.0
# user_agent = "Mozilla/5.0 ..."
navigation_timeout_ms = 30000
page_idle_timeout_secs = 300      # Free pages idle longer than this are closed
health_check_interval_secs = 30
health_check_timeout_ms = 5000
auto_scale = true
scale_check_interval_secs = 10
scale_up_threshold = 0.8          # Utilization above which a browser is added
scale_down_threshold = 0.2        # Utilization below which an idle browser is removed
scale_down_cooldown_secs = 60

# ══════════════════════════════════════════════════════════════════════════════
# CRAWL POLICY
# ══════════════════════════════════════════════════════════════════════════════

[policy]
user_agent = "pagemine/0.3 (+https://github.com/pagemine/pagemine)"
respect_robots = true
robots_cache_ttl_secs = 3600
robots_timeout_ms = 10000
min_crawl_delay_ms = 0
max_crawl_delay_ms = 30000
requests_per_second = 2
per_domain_limit = true           # false = one shared window for all domains

[policy.retry]
max_attempts = 3
base_delay_ms = 1000
max_backoff_ms = 30000

[policy.proxy]
enabled = false
strategy = "round_robin"          # round_robin | least_used | smart

# [[policy.proxy.endpoints]]
# host = "proxy.example.com"
# port = 3128
# protocol = "http"               # http | https | socks5
# country = "de"

# ══════════════════════════════════════════════════════════════════════════════
# EXTRACTOR
# ══════════════════════════════════════════════════════════════════════════════

[extractor]
min_importance_score = 0.3
max_depth = 12
max_layers = 500
cache_enabled = false
cache_ttl_secs = 600
cache_max_entries = 1024         # oldest cached structure is evicted past this

[miner]
event_buffer = 1024
max_concurrent_instances = 0      # 0 = unlimited

[metrics]
enabled = false
prometheus = false

# ══════════════════════════════════════════════════════════════════════════════
# INSTANCES
# ══════════════════════════════════════════════════════════════════════════════

# [[instances]]
# name = "blog"
# topic = "articles"
# urls = ["https://example.com/blog/"]
# custom_extractors = []
# extract_structure = true
# follow_links = false
# max_discovered_urls = 100
#
# [[instances.attributes]]
# name = "headline"
# selector = "h1"
#
# [[instances.attributes]]
# name = "links"
# selector = "article a"
# attribute = "href"
# multiple = true
"##
    .to_string()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_to_defaults() {
        let cfg: crate::schema::MinerConfig = toml::from_str(&default_config_template()).unwrap();
        let defaults = crate::schema::BrowserPoolConfig::default();
        assert_eq!(cfg.browser.max_browsers, defaults.max_browsers);
        assert_eq!(cfg.policy.retry.max_attempts, 3);
        assert!(cfg.instances.is_empty());
    }

    #[test]
    fn template_validates_cleanly() {
        let result = crate::validate::validate_toml_str(&default_config_template());
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
    }
}
