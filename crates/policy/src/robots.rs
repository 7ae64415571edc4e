//! robots.txt parsing, matching and per-origin caching.
//!
//! Supports the subset crawlers rely on in practice: user-agent groups,
//! `Allow`/`Disallow` with `*` wildcards and a trailing `$` anchor,
//! `Crawl-delay` and `Sitemap`.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use {
    dashmap::DashMap,
    tokio::sync::Mutex,
    tracing::{debug, warn},
    url::Url,
};

use crate::error::PolicyError;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    allow: bool,
    pattern: String,
}

#[derive(Debug, Clone, Default)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
    crawl_delay: Option<f64>,
}

/// Parsed robots.txt.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    groups: Vec<Group>,
    sitemaps: Vec<String>,
}

impl RobotsRules {
    pub fn parse(body: &str) -> Self {
        let mut rules = Self::default();
        let mut current: Option<Group> = None;
        // consecutive user-agent lines share one group
        let mut collecting_agents = false;

        for raw in body.lines() {
            let line = raw.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !collecting_agents {
                        if let Some(group) = current.take() {
                            rules.groups.push(group);
                        }
                        current = Some(Group::default());
                    }
                    if let Some(group) = current.as_mut() {
                        group.agents.push(value.to_ascii_lowercase());
                    }
                    collecting_agents = true;
                },
                "allow" | "disallow" => {
                    collecting_agents = false;
                    if let Some(group) = current.as_mut()
                        && !value.is_empty()
                    {
                        group.rules.push(Rule {
                            allow: key == "allow",
                            pattern: value.to_string(),
                        });
                    }
                },
                "crawl-delay" => {
                    collecting_agents = false;
                    if let Some(group) = current.as_mut()
                        && let Ok(secs) = value.parse::<f64>()
                        && secs.is_finite()
                        && secs >= 0.0
                    {
                        group.crawl_delay = Some(secs);
                    }
                },
                "sitemap" => {
                    if !value.is_empty() {
                        rules.sitemaps.push(value.to_string());
                    }
                },
                _ => {},
            }
        }
        if let Some(group) = current {
            rules.groups.push(group);
        }
        rules
    }

    /// Groups that apply to `product_token`: the longest matching agent token
    /// wins, falling back to `*`. Groups naming the same token are merged.
    fn groups_for(&self, product_token: &str) -> Vec<&Group> {
        let token = product_token.to_ascii_lowercase();
        let best = self
            .groups
            .iter()
            .flat_map(|g| g.agents.iter())
            .filter(|a| a.as_str() != "*" && !a.is_empty() && token.contains(a.as_str()))
            .max_by_key(|a| a.len())
            .cloned();
        let wanted = best.unwrap_or_else(|| "*".to_string());
        self.groups
            .iter()
            .filter(|g| g.agents.iter().any(|a| *a == wanted))
            .collect()
    }

    /// Whether `path` (path plus optional query) may be fetched.
    pub fn is_allowed(&self, product_token: &str, path: &str) -> bool {
        if path == "/robots.txt" {
            return true;
        }
        let mut longest_allow: Option<usize> = None;
        let mut longest_disallow: Option<usize> = None;
        for group in self.groups_for(product_token) {
            for rule in &group.rules {
                if !pattern_matches(&rule.pattern, path) {
                    continue;
                }
                let slot = if rule.allow {
                    &mut longest_allow
                } else {
                    &mut longest_disallow
                };
                let len = rule.pattern.len();
                if slot.is_none_or(|l| len > l) {
                    *slot = Some(len);
                }
            }
        }
        match (longest_disallow, longest_allow) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(d), Some(a)) => a >= d,
        }
    }

    pub fn crawl_delay(&self, product_token: &str) -> Option<Duration> {
        self.groups_for(product_token)
            .iter()
            .find_map(|g| g.crawl_delay)
            .map(Duration::from_secs_f64)
    }

    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }
}

/// Match a robots path pattern. `*` matches any run of characters and a
/// trailing `$` anchors the pattern at the end of the path.
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or("");
    if !path.starts_with(first) {
        return false;
    }
    let mut pos = first.len();
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        return !anchored || pos == path.len();
    }
    for (i, part) in rest.iter().enumerate() {
        if anchored && i == rest.len() - 1 {
            return path.len() >= pos + part.len() && path[pos..].ends_with(part);
        }
        match path[pos..].find(part) {
            Some(idx) => pos += idx + part.len(),
            None => return false,
        }
    }
    true
}

/// One cached robots.txt lookup. `rules` is `None` when the fetch failed,
/// which is treated as allow-all.
#[derive(Debug)]
pub struct RobotsEntry {
    pub rules: Option<RobotsRules>,
    pub fetched_at: Instant,
}

/// Per-origin robots.txt cache. Expired entries are refetched and replaced
/// as a whole; concurrent misses on one origin share a single fetch.
pub struct RobotsCache {
    client: reqwest::Client,
    ttl: Duration,
    entries: DashMap<String, Arc<RobotsEntry>>,
    fetching: DashMap<String, Arc<Mutex<()>>>,
}

impl RobotsCache {
    pub fn new(client: reqwest::Client, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            entries: DashMap::new(),
            fetching: DashMap::new(),
        }
    }

    fn fresh(&self, origin: &str) -> Option<Arc<RobotsEntry>> {
        self.entries
            .get(origin)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Cached entry for the URL's origin, fetching when missing or expired.
    pub async fn get(&self, url: &Url) -> Arc<RobotsEntry> {
        let origin = url.origin().ascii_serialization();
        if let Some(entry) = self.fresh(&origin) {
            return entry;
        }

        let gate = Arc::clone(self.fetching.entry(origin.clone()).or_default().value());
        let _fetch_guard = gate.lock().await;
        // whoever held the gate before us may have filled the entry
        if let Some(entry) = self.fresh(&origin) {
            return entry;
        }

        let rules = match self.fetch(&origin).await {
            Ok(rules) => Some(rules),
            Err(e) => {
                warn!(origin, error = %e, "robots.txt unavailable, allowing all");
                None
            },
        };
        #[cfg(feature = "metrics")]
        pagemine_metrics::counter!(
            pagemine_metrics::policy::ROBOTS_FETCHES_TOTAL,
            pagemine_metrics::labels::OUTCOME => if rules.is_some() { "ok" } else { "failed" }
        )
        .increment(1);

        let entry = Arc::new(RobotsEntry {
            rules,
            fetched_at: Instant::now(),
        });
        self.entries.insert(origin.clone(), Arc::clone(&entry));
        self.fetching.remove(&origin);
        entry
    }

    async fn fetch(&self, origin: &str) -> Result<RobotsRules, PolicyError> {
        let robots_url = format!("{origin}/robots.txt");
        let resp = self.client.get(&robots_url).send().await?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(PolicyError::RobotsFetch(format!(
                "{robots_url} returned {status}"
            )));
        }
        let body = resp.text().await?;
        debug!(origin, bytes = body.len(), "fetched robots.txt");
        Ok(RobotsRules::parse(&body))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
