//! Proxy endpoints, per-endpoint outcome stats and rotation.

use std::sync::{
    Arc, Mutex, RwLock,
    atomic::{AtomicUsize, Ordering},
};

use {
    pagemine_config::{ProxyEndpointConfig, ProxyProtocol, RotationStrategy},
    secrecy::Secret,
    serde::Serialize,
    tracing::{debug, warn},
};

/// Weight of the newest latency sample in the rolling average.
const LATENCY_ALPHA: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct ProxyEndpoint {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub protocol: ProxyProtocol,
    pub username: Option<String>,
    pub password: Option<Secret<String>>,
    pub country: Option<String>,
    pub provider: Option<String>,
}

impl ProxyEndpoint {
    pub fn new(host: impl Into<String>, port: u16, protocol: ProxyProtocol) -> Self {
        let host = host.into();
        Self {
            id: format!("{host}:{port}"),
            host,
            port,
            protocol,
            username: None,
            password: None,
            country: None,
            provider: None,
        }
    }

    /// `scheme://host:port`, the form Chrome's proxy settings accept.
    pub fn server_url(&self) -> String {
        format!("{}://{}:{}", self.protocol.as_str(), self.host, self.port)
    }
}

impl From<&ProxyEndpointConfig> for ProxyEndpoint {
    fn from(cfg: &ProxyEndpointConfig) -> Self {
        Self {
            id: cfg
                .id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("{}:{}", cfg.host, cfg.port)),
            host: cfg.host.clone(),
            port: cfg.port,
            protocol: cfg.protocol,
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            country: cfg.country.clone(),
            provider: cfg.provider.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProxyStats {
    pub uses: u64,
    pub successes: u64,
    pub failures: u64,
    pub avg_latency_ms: Option<f64>,
}

impl ProxyStats {
    /// Fraction of recorded outcomes that succeeded; 1.0 before any outcome.
    pub fn success_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            1.0
        } else {
            self.successes as f64 / total as f64
        }
    }

    /// Smart-rotation score: `success_rate / (avg_latency_ms + 1)`.
    pub fn score(&self) -> f64 {
        self.success_rate() / (self.avg_latency_ms.unwrap_or(0.0) + 1.0)
    }
}

/// Endpoint plus its stats, as reported by [`ProxyPool::snapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct ProxySnapshot {
    pub id: String,
    pub server: String,
    pub country: Option<String>,
    pub provider: Option<String>,
    pub stats: ProxyStats,
}

struct Slot {
    endpoint: ProxyEndpoint,
    stats: Mutex<ProxyStats>,
}

impl Slot {
    fn stats(&self) -> std::sync::MutexGuard<'_, ProxyStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct ProxyPool {
    enabled: bool,
    strategy: RotationStrategy,
    slots: RwLock<Vec<Arc<Slot>>>,
    cursor: AtomicUsize,
}

impl ProxyPool {
    pub fn new(enabled: bool, strategy: RotationStrategy) -> Self {
        Self {
            enabled,
            strategy,
            slots: RwLock::new(Vec::new()),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Add an endpoint, replacing any existing one with the same id.
    pub fn add(&self, endpoint: ProxyEndpoint) {
        if endpoint.username.is_some() {
            warn!(
                proxy = %endpoint.id,
                "proxy credentials are not supported by browser proxy settings, connecting without auth"
            );
        }
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        slots.retain(|s| s.endpoint.id != endpoint.id);
        debug!(proxy = %endpoint.id, server = %endpoint.server_url(), "proxy added");
        slots.push(Arc::new(Slot {
            endpoint,
            stats: Mutex::new(ProxyStats::default()),
        }));
    }

    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pick an endpoint per the configured strategy and count the use.
    pub fn select(&self) -> Option<ProxyEndpoint> {
        if !self.enabled {
            return None;
        }
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        if slots.is_empty() {
            return None;
        }
        let slot = match self.strategy {
            RotationStrategy::RoundRobin => {
                let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % slots.len();
                &slots[idx]
            },
            // ties go to the earliest added endpoint
            RotationStrategy::LeastUsed => slots.iter().min_by_key(|s| s.stats().uses)?,
            RotationStrategy::Smart => {
                let scores: Vec<f64> = slots.iter().map(|s| s.stats().score()).collect();
                let mut best = 0;
                for (i, score) in scores.iter().enumerate() {
                    if *score > scores[best] {
                        best = i;
                    }
                }
                &slots[best]
            },
        };
        slot.stats().uses += 1;
        #[cfg(feature = "metrics")]
        pagemine_metrics::counter!(
            pagemine_metrics::policy::PROXY_SELECTIONS_TOTAL,
            pagemine_metrics::labels::PROXY => slot.endpoint.id.clone()
        )
        .increment(1);
        Some(slot.endpoint.clone())
    }

    /// Record an attempt outcome. Unknown ids are ignored.
    pub fn record(&self, id: &str, success: bool, latency_ms: f64) {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        let Some(slot) = slots.iter().find(|s| s.endpoint.id == id) else {
            debug!(proxy = id, "outcome for unknown proxy ignored");
            return;
        };
        let mut stats = slot.stats();
        if success {
            stats.successes += 1;
        } else {
            stats.failures += 1;
            #[cfg(feature = "metrics")]
            pagemine_metrics::counter!(
                pagemine_metrics::policy::PROXY_FAILURES_TOTAL,
                pagemine_metrics::labels::PROXY => id.to_string()
            )
            .increment(1);
        }
        if latency_ms.is_finite() && latency_ms >= 0.0 {
            stats.avg_latency_ms = Some(match stats.avg_latency_ms {
                Some(avg) => LATENCY_ALPHA * latency_ms + (1.0 - LATENCY_ALPHA) * avg,
                None => latency_ms,
            });
        }
    }

    pub fn snapshot(&self) -> Vec<ProxySnapshot> {
        self.slots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|s| ProxySnapshot {
                id: s.endpoint.id.clone(),
                server: s.endpoint.server_url(),
                country: s.endpoint.country.clone(),
                provider: s.endpoint.provider.clone(),
                stats: s.stats().clone(),
            })
            .collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn pool(strategy: RotationStrategy, n: u16) -> ProxyPool {
        let pool = ProxyPool::new(true, strategy);
        for i in 0..n {
            pool.add(ProxyEndpoint::new("10.0.0.1", 8000 + i, ProxyProtocol::Http));
        }
        pool
    }

    fn ids(pool: &ProxyPool, n: usize) -> Vec<String> {
        (0..n).map(|_| pool.select().unwrap().id).collect()
    }

    #[test]
    fn disabled_or_empty_selects_nothing() {
        let disabled = ProxyPool::new(false, RotationStrategy::RoundRobin);
        disabled.add(ProxyEndpoint::new("h", 1, ProxyProtocol::Http));
        assert!(disabled.select().is_none());
        assert!(pool(RotationStrategy::Smart, 0).select().is_none());
    }

    #[test]
    fn round_robin_cycles() {
        let pool = pool(RotationStrategy::RoundRobin, 3);
        assert_eq!(ids(&pool, 4), [
            "10.0.0.1:8000",
            "10.0.0.1:8001",
            "10.0.0.1:8002",
            "10.0.0.1:8000"
        ]);
    }

    #[test]
    fn least_used_balances() {
        let pool = pool(RotationStrategy::LeastUsed, 3);
        ids(&pool, 9);
        assert!(pool.snapshot().iter().all(|p| p.stats.uses == 3));
    }

    #[test]
    fn smart_prefers_reliable_fast_endpoint() {
        let pool = pool(RotationStrategy::Smart, 3);
        pool.record("10.0.0.1:8000", false, 50.0);
        pool.record("10.0.0.1:8001", true, 900.0);
        pool.record("10.0.0.1:8002", true, 40.0);
        assert_eq!(pool.select().unwrap().id, "10.0.0.1:8002");
    }

    #[test]
    fn smart_tries_untried_endpoint_first() {
        let pool = pool(RotationStrategy::Smart, 2);
        pool.record("10.0.0.1:8000", true, 10.0);
        assert_eq!(pool.select().unwrap().id, "10.0.0.1:8001");
    }

    #[test]
    fn latency_is_exponentially_weighted() {
        let pool = pool(RotationStrategy::RoundRobin, 1);
        pool.record("10.0.0.1:8000", true, 100.0);
        pool.record("10.0.0.1:8000", false, 200.0);
        let stats = &pool.snapshot()[0].stats;
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.failures, 1);
        assert!((stats.avg_latency_ms.unwrap() - 130.0).abs() < 1e-9);
        assert!((stats.success_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn concurrent_outcomes_are_all_counted() {
        let pool = Arc::new(pool(RotationStrategy::RoundRobin, 1));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        pool.record("10.0.0.1:8000", i % 2 == 0, 10.0);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let stats = &pool.snapshot()[0].stats;
        assert_eq!(stats.successes + stats.failures, 800);
    }

    #[test]
    fn config_endpoint_gets_derived_id() {
        let cfg = ProxyEndpointConfig {
            host: "proxy.local".into(),
            port: 3128,
            protocol: ProxyProtocol::Socks5,
            ..Default::default()
        };
        let ep = ProxyEndpoint::from(&cfg);
        assert_eq!(ep.id, "proxy.local:3128");
        assert_eq!(ep.server_url(), "socks5://proxy.local:3128");
    }
}
