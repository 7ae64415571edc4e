//! Crawl policy: robots.txt, proxy rotation, per-domain rate windows and
//! retry backoff.
//!
//! [`CrawlPolicyEngine`] is shared by every mining instance. All methods take
//! `&self`; interior state is sharded (robots per origin, windows per domain,
//! stats per proxy) so concurrent workers rarely contend.

pub mod error;
pub mod proxy;
pub mod rate_limit;
pub mod retry;
pub mod robots;

use std::time::Duration;

use {
    pagemine_config::PolicyConfig,
    serde::Serialize,
    tracing::{debug, info},
    url::Url,
};

pub use {
    error::PolicyError,
    proxy::{ProxyEndpoint, ProxyPool, ProxySnapshot, ProxyStats},
    rate_limit::RateLimiter,
    retry::RetryDecision,
    robots::{RobotsCache, RobotsRules},
};

/// Shared key used when `per_domain_limit` is off.
pub const GLOBAL_RATE_KEY: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RobotsDecision {
    pub allowed: bool,
    /// Crawl delay for the origin, clamped to the configured bounds.
    pub crawl_delay: Duration,
}

pub struct CrawlPolicyEngine {
    config: PolicyConfig,
    /// Product token used for robots group matching (`pagemine` in `pagemine/0.3 (...)`).
    product_token: String,
    robots: RobotsCache,
    proxies: ProxyPool,
    limiter: RateLimiter,
}

impl CrawlPolicyEngine {
    pub fn new(config: PolicyConfig) -> Result<Self, PolicyError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_millis(config.robots_timeout_ms))
            .build()?;
        let product_token = config
            .user_agent
            .split(['/', ' '])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        let proxies = ProxyPool::new(config.proxy.enabled, config.proxy.strategy);
        for endpoint in &config.proxy.endpoints {
            proxies.add(ProxyEndpoint::from(endpoint));
        }
        info!(
            respect_robots = config.respect_robots,
            rps = config.requests_per_second,
            proxies = proxies.len(),
            strategy = %config.proxy.strategy,
            "crawl policy ready"
        );

        Ok(Self {
            robots: RobotsCache::new(client, Duration::from_secs(config.robots_cache_ttl_secs)),
            limiter: RateLimiter::new(config.requests_per_second),
            proxies,
            product_token,
            config,
        })
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    fn min_delay(&self) -> Duration {
        Duration::from_millis(self.config.min_crawl_delay_ms)
    }

    fn clamp_delay(&self, delay: Option<Duration>) -> Duration {
        let min = self.min_delay();
        let max = Duration::from_millis(self.config.max_crawl_delay_ms).max(min);
        delay.unwrap_or(min).clamp(min, max)
    }

    /// Whether `url` may be crawled and at what spacing.
    ///
    /// Fails open: if robots.txt cannot be fetched, the URL is allowed at the
    /// minimum delay.
    pub async fn check_robots(&self, url: &str) -> RobotsDecision {
        let open = RobotsDecision {
            allowed: true,
            crawl_delay: self.min_delay(),
        };
        if !self.config.respect_robots {
            return open;
        }
        let Ok(parsed) = Url::parse(url) else {
            debug!(url, "unparsable URL, skipping robots check");
            return open;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return open;
        }

        let entry = self.robots.get(&parsed).await;
        let Some(rules) = entry.rules.as_ref() else {
            return open;
        };

        let mut path = parsed.path().to_string();
        if let Some(q) = parsed.query() {
            path.push('?');
            path.push_str(q);
        }
        let allowed = rules.is_allowed(&self.product_token, &path);
        if !allowed {
            debug!(url, "disallowed by robots.txt");
            #[cfg(feature = "metrics")]
            pagemine_metrics::counter!(pagemine_metrics::policy::ROBOTS_DISALLOWED_TOTAL)
                .increment(1);
        }
        RobotsDecision {
            allowed,
            crawl_delay: self.clamp_delay(rules.crawl_delay(&self.product_token)),
        }
    }

    /// Sitemap URLs advertised by the origin's robots.txt.
    pub async fn sitemaps(&self, url: &str) -> Result<Vec<String>, PolicyError> {
        let parsed = Url::parse(url).map_err(|e| PolicyError::InvalidUrl(format!("{url}: {e}")))?;
        let entry = self.robots.get(&parsed).await;
        Ok(entry
            .rules
            .as_ref()
            .map(|r| r.sitemaps().to_vec())
            .unwrap_or_default())
    }

    pub fn next_proxy(&self) -> Option<ProxyEndpoint> {
        self.proxies.select()
    }

    pub fn record_proxy_outcome(&self, proxy_id: &str, success: bool, latency_ms: f64) {
        self.proxies.record(proxy_id, success, latency_ms);
    }

    pub fn add_proxy(&self, endpoint: ProxyEndpoint) {
        self.proxies.add(endpoint);
    }

    pub fn proxies(&self) -> Vec<ProxySnapshot> {
        self.proxies.snapshot()
    }

    /// Wait for room in the domain's one-second window. Returns the time spent
    /// waiting.
    pub async fn throttle(&self, domain_key: &str) -> Duration {
        let key = if self.config.per_domain_limit {
            domain_key
        } else {
            GLOBAL_RATE_KEY
        };
        let waited = self.limiter.acquire(key).await;
        if !waited.is_zero() {
            debug!(domain = key, waited_ms = waited.as_millis() as u64, "throttled");
        }
        #[cfg(feature = "metrics")]
        pagemine_metrics::histogram!(pagemine_metrics::policy::THROTTLE_WAIT_SECONDS)
            .record(waited.as_secs_f64());
        waited
    }

    pub fn retry_policy(&self, attempt: u32) -> RetryDecision {
        retry::decide(&self.config.retry, attempt)
    }
}

/// Lower-cased host of `url`, the key for throttling and crawl-delay spacing.
pub fn domain_key(url: &str) -> Result<String, PolicyError> {
    let parsed = Url::parse(url).map_err(|e| PolicyError::InvalidUrl(format!("{url}: {e}")))?;
    parsed
        .host_str()
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| PolicyError::InvalidUrl(format!("{url}: no host")))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn engine(f: impl FnOnce(&mut PolicyConfig)) -> CrawlPolicyEngine {
        let mut cfg = PolicyConfig {
            user_agent: "pagemine/0.3 (+https://example.test)".into(),
            min_crawl_delay_ms: 100,
            max_crawl_delay_ms: 3_000,
            robots_timeout_ms: 2_000,
            ..Default::default()
        };
        f(&mut cfg);
        CrawlPolicyEngine::new(cfg).unwrap()
    }

    #[tokio::test]
    async fn disallowed_and_allow_override() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/robots.txt")
            .with_status(200)
            .with_body("User-agent: *\nDisallow: /private\nAllow: /private/open\nCrawl-delay: 1\n")
            .expect(1)
            .create_async()
            .await;
        let engine = engine(|_| {});
        let base = server.url();

        let d = engine.check_robots(&format!("{base}/private/secret")).await;
        assert!(!d.allowed);
        assert_eq!(d.crawl_delay, Duration::from_secs(1));
        assert!(engine.check_robots(&format!("{base}/private/open/x")).await.allowed);
        assert!(engine.check_robots(&format!("{base}/public")).await.allowed);

        // one fetch serves every lookup for the origin
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_failure_fails_open_and_is_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/robots.txt")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;
        let engine = engine(|_| {});
        let url = format!("{}/anything", server.url());

        for _ in 0..3 {
            let d = engine.check_robots(&url).await;
            assert!(d.allowed);
            assert_eq!(d.crawl_delay, Duration::from_millis(100));
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_robots_allows_everything() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/robots.txt")
            .with_status(404)
            .create_async()
            .await;
        let engine = engine(|_| {});
        assert!(engine.check_robots(&format!("{}/x", server.url())).await.allowed);
    }

    #[tokio::test]
    async fn unreachable_host_fails_open() {
        let engine = engine(|c| c.robots_timeout_ms = 500);
        let d = engine.check_robots("http://127.0.0.1:1/page").await;
        assert!(d.allowed);
        assert_eq!(d.crawl_delay, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn crawl_delay_is_clamped() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/robots.txt")
            .with_status(200)
            .with_body("User-agent: pagemine\nCrawl-delay: 120\n\nUser-agent: *\nDisallow: /\n")
            .create_async()
            .await;
        let engine = engine(|_| {});
        let d = engine.check_robots(&format!("{}/page", server.url())).await;
        assert!(d.allowed);
        assert_eq!(d.crawl_delay, Duration::from_millis(3_000));
    }

    #[tokio::test]
    async fn robots_ignored_when_disabled() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/robots.txt")
            .with_status(200)
            .with_body("User-agent: *\nDisallow: /\n")
            .expect(0)
            .create_async()
            .await;
        let engine = engine(|c| c.respect_robots = false);
        assert!(engine.check_robots(&format!("{}/x", server.url())).await.allowed);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn sitemaps_from_robots() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/robots.txt")
            .with_status(200)
            .with_body("Sitemap: https://example.test/sitemap.xml\nUser-agent: *\nAllow: /\n")
            .create_async()
            .await;
        let engine = engine(|_| {});
        let maps = engine.sitemaps(&format!("{}/", server.url())).await.unwrap();
        assert_eq!(maps, ["https://example.test/sitemap.xml"]);
        assert!(engine.sitemaps("not a url").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn global_window_is_shared_across_domains() {
        let engine = engine(|c| {
            c.requests_per_second = 1;
            c.per_domain_limit = false;
        });
        assert_eq!(engine.throttle("a.com").await, Duration::ZERO);
        assert_eq!(engine.throttle("b.com").await, Duration::from_secs(1));
    }

    #[test]
    fn proxies_from_config_rotate() {
        let engine = engine(|c| {
            c.proxy.enabled = true;
            c.proxy.endpoints = vec![
                pagemine_config::ProxyEndpointConfig {
                    host: "p1".into(),
                    port: 8080,
                    ..Default::default()
                },
                pagemine_config::ProxyEndpointConfig {
                    host: "p2".into(),
                    port: 8080,
                    ..Default::default()
                },
            ];
        });
        assert_eq!(engine.next_proxy().unwrap().id, "p1:8080");
        assert_eq!(engine.next_proxy().unwrap().id, "p2:8080");
        engine.record_proxy_outcome("p1:8080", true, 12.0);
        assert_eq!(engine.proxies()[0].stats.successes, 1);
    }

    #[test]
    fn retry_policy_uses_config() {
        let engine = engine(|c| c.retry.max_attempts = 2);
        assert!(engine.retry_policy(1).should_retry);
        assert!(!engine.retry_policy(2).should_retry);
    }

    #[test]
    fn domain_keys() {
        assert_eq!(domain_key("https://WWW.Example.com/a").unwrap(), "www.example.com");
        assert!(domain_key("mailto:x@example.com").is_err());
        assert!(domain_key("::").is_err());
    }
}
