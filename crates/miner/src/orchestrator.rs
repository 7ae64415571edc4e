use std::{
    any::Any,
    collections::{BTreeMap, HashMap, HashSet},
    future::Future,
    panic::AssertUnwindSafe,
    sync::{Arc, RwLock},
};

use {
    futures::FutureExt,
    pagemine_browser::{AcquireOptions, BrowserPool, PageHandle, PoolEvent, PoolStats},
    pagemine_config::{InstanceConfig, OrchestratorConfig},
    pagemine_extract::{PageStructure, PageStructureExtractor, extract_attributes, links},
    pagemine_policy::{CrawlPolicyEngine, ProxyEndpoint, domain_key},
    serde_json::Value,
    tokio::{
        sync::{Semaphore, broadcast},
        time::Instant,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
    url::Url,
};

use crate::{
    MinerError, Result,
    bundle::{BundleStore, DataBundle},
    events::MinerEvent,
    extractors::{CustomExtractorFn, ExtractorRegistry},
    instance::MiningInstance,
    queue::UrlQueue,
    store::ResultStore,
    types::{ExtractionResult, InstanceId, InstanceStats, InstanceStatus, ResultStatus},
};

/// What one successful page visit produced.
struct PageOutput {
    final_url: Option<String>,
    structure: Option<Arc<PageStructure>>,
    attributes: BTreeMap<String, Value>,
    attribute_errors: BTreeMap<String, String>,
    custom: BTreeMap<String, Value>,
    custom_errors: BTreeMap<String, String>,
    links: Vec<String>,
}

fn http_url(raw: &str) -> Option<Url> {
    Url::parse(raw)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
}

fn validate_instance(config: &InstanceConfig) -> Result<()> {
    if config.name.trim().is_empty() {
        return Err(MinerError::invalid_config("instance name is empty"));
    }
    if config.urls.is_empty() {
        return Err(MinerError::invalid_config(format!(
            "instance {} has no URLs",
            config.name
        )));
    }
    if let Some(bad) = config.urls.iter().find(|u| http_url(u).is_none()) {
        return Err(MinerError::invalid_config(format!(
            "not an http(s) URL: {bad}"
        )));
    }
    let mut names = HashSet::new();
    for attr in &config.attributes {
        if attr.name.is_empty() || attr.selector.is_empty() {
            return Err(MinerError::invalid_config(
                "attribute specs need a name and a selector",
            ));
        }
        if !names.insert(attr.name.as_str()) {
            return Err(MinerError::invalid_config(format!(
                "duplicate attribute name: {}",
                attr.name
            )));
        }
    }
    Ok(())
}

/// Runs mining instances over the shared pool, policy engine and extractor.
///
/// Each started instance gets its own task that mines its URLs one at a
/// time; instances run concurrently and compete for pool pages.
pub struct MiningOrchestrator {
    config: OrchestratorConfig,
    pool: Arc<BrowserPool>,
    policy: Arc<CrawlPolicyEngine>,
    extractor: Arc<PageStructureExtractor>,
    store: Arc<dyn ResultStore>,
    instances: RwLock<HashMap<InstanceId, Arc<MiningInstance>>>,
    bundles: BundleStore,
    extractors: ExtractorRegistry,
    events: broadcast::Sender<MinerEvent>,
    run_slots: Option<Arc<Semaphore>>,
    cancel: CancellationToken,
}

impl MiningOrchestrator {
    /// Must be called inside a Tokio runtime: pool events are forwarded by a
    /// background task.
    pub fn new(
        config: OrchestratorConfig,
        pool: Arc<BrowserPool>,
        policy: Arc<CrawlPolicyEngine>,
        extractor: Arc<PageStructureExtractor>,
        store: Arc<dyn ResultStore>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let run_slots = (config.max_concurrent_instances > 0)
            .then(|| Arc::new(Semaphore::new(config.max_concurrent_instances)));
        let this = Arc::new(Self {
            config,
            pool,
            policy,
            extractor,
            store,
            instances: RwLock::new(HashMap::new()),
            bundles: BundleStore::default(),
            extractors: ExtractorRegistry::default(),
            events,
            run_slots,
            cancel: CancellationToken::new(),
        });
        this.spawn_pool_forwarder();
        this
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<BrowserPool> {
        &self.pool
    }

    pub fn policy(&self) -> &Arc<CrawlPolicyEngine> {
        &self.policy
    }

    fn spawn_pool_forwarder(&self) {
        let mut pool_events = self.pool.subscribe();
        let events = self.events.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    received = pool_events.recv() => match received {
                        Ok(PoolEvent::BrowserRecovered {
                            failed_browser_id,
                            replacement_id,
                        }) => {
                            let _ = events.send(MinerEvent::BrowserRecovered {
                                failed_browser_id,
                                replacement_id,
                            });
                        },
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "pool event stream lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
    }

    fn emit(&self, event: MinerEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn instance(&self, id: &str) -> Result<Arc<MiningInstance>> {
        self.instances
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or_else(|| MinerError::instance_not_found(id))
    }

    // ── instance lifecycle ──────────────────────────────────────────────────

    /// Validate `config` and register a new instance in `Ready`.
    pub fn create_instance(&self, config: InstanceConfig) -> Result<InstanceId> {
        validate_instance(&config)?;
        let id = uuid::Uuid::new_v4().to_string();
        let instance = Arc::new(MiningInstance::new(id.clone(), config));
        info!(
            instance_id = %id,
            name = %instance.config.name,
            topic = %instance.topic(),
            urls = instance.config.urls.len(),
            "created mining instance"
        );
        self.instances
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), instance);
        Ok(id)
    }

    pub fn start(self: &Arc<Self>, id: &str) -> Result<()> {
        let instance = self.instance(id)?;
        instance
            .transition(InstanceStatus::Ready, InstanceStatus::Running)
            .map_err(|from| MinerError::InvalidTransition {
                instance_id: id.to_string(),
                from,
                action: "start",
            })?;
        instance.mark_started();
        info!(instance_id = %id, name = %instance.config.name, "instance started");
        #[cfg(feature = "metrics")]
        pagemine_metrics::gauge!(pagemine_metrics::miner::INSTANCES_RUNNING).increment(1.0);
        self.emit(MinerEvent::InstanceStarted {
            instance_id: id.to_string(),
            name: instance.config.name.clone(),
        });

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let task = tokio::spawn(Arc::clone(&this).run(Arc::clone(&instance)));
            if let Err(e) = task.await {
                this.abandon(&instance, &e);
            }
        });
        Ok(())
    }

    /// Move an instance whose run task died to `Failed` so waiters resolve.
    fn abandon(&self, instance: &MiningInstance, cause: &tokio::task::JoinError) {
        let message = if cause.is_panic() {
            "mining task panicked".to_string()
        } else {
            format!("mining task ended unexpectedly: {cause}")
        };
        error!(instance_id = %instance.id, error = %message, "instance aborted");
        #[cfg(feature = "metrics")]
        pagemine_metrics::gauge!(pagemine_metrics::miner::INSTANCES_RUNNING).decrement(1.0);
        if instance.finish(
            InstanceStatus::Running,
            InstanceStatus::Failed,
            Some(message.clone()),
        ) {
            self.emit(MinerEvent::InstanceFailed {
                instance_id: instance.id.clone(),
                error: message,
            });
        }
    }

    /// A running instance stops at the next URL boundary; a ready one
    /// completes immediately. Terminal instances are left alone.
    pub fn stop(&self, id: &str) -> Result<()> {
        let instance = self.instance(id)?;
        if instance.finish(InstanceStatus::Ready, InstanceStatus::Completed, None) {
            info!(instance_id = %id, "stopped instance before start");
            self.emit(MinerEvent::InstanceCompleted {
                instance_id: id.to_string(),
                summary: instance.stats(),
            });
        } else {
            debug!(instance_id = %id, status = %instance.status(), "stop requested");
            instance.request_stop();
        }
        Ok(())
    }

    /// Stop every non-terminal instance.
    pub fn stop_all(&self) {
        let ids: Vec<InstanceId> = self
            .instances
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        for id in ids {
            let _ = self.stop(&id);
        }
    }

    /// Push extra URLs into an instance that has not finished yet.
    pub fn seed(&self, id: &str, urls: Vec<String>) -> Result<usize> {
        let instance = self.instance(id)?;
        if let Some(bad) = urls.iter().find(|u| http_url(u).is_none()) {
            return Err(MinerError::invalid_config(format!(
                "not an http(s) URL: {bad}"
            )));
        }
        instance.seed(urls)
    }

    /// Resolve once the instance completes or fails.
    pub async fn wait(&self, id: &str) -> Result<InstanceStats> {
        let instance = self.instance(id)?;
        Ok(instance.wait().await)
    }

    // ── queries ─────────────────────────────────────────────────────────────

    pub fn get_stats(&self, id: &str) -> Result<InstanceStats> {
        Ok(self.instance(id)?.stats())
    }

    pub fn list_instances(&self) -> Vec<InstanceStats> {
        let mut all: Vec<InstanceStats> = self
            .instances
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|i| i.stats())
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub async fn pool_stats(&self) -> PoolStats {
        self.pool.stats().await
    }

    pub fn get_data_bundle(&self, topic: &str) -> Option<DataBundle> {
        self.bundles.snapshot(topic)
    }

    pub fn topics(&self) -> Vec<String> {
        self.bundles.topics()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MinerEvent> {
        self.events.subscribe()
    }

    // ── extension points ────────────────────────────────────────────────────

    pub fn register_custom_extractor<F, Fut>(&self, name: &str, f: F) -> Result<()>
    where
        F: Fn(PageHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let f: CustomExtractorFn = Arc::new(move |page| Box::pin(f(page)));
        self.extractors.register(name, f)?;
        debug!(extractor = name, "registered custom extractor");
        Ok(())
    }

    pub fn add_proxy(&self, endpoint: ProxyEndpoint) {
        let event = MinerEvent::ProxyAdded {
            proxy_id: endpoint.id.clone(),
            server: endpoint.server_url(),
        };
        self.policy.add_proxy(endpoint);
        self.emit(event);
    }

    // ── run loop ────────────────────────────────────────────────────────────

    async fn run(self: Arc<Self>, instance: Arc<MiningInstance>) {
        let _slot = match &self.run_slots {
            Some(slots) => Arc::clone(slots).acquire_owned().await.ok(),
            None => None,
        };

        let mut queue = UrlQueue::new(instance.config.max_discovered_urls);
        for url in &instance.config.urls {
            if queue.push(url.as_str()) {
                instance.add_total(1);
            }
        }
        match self.store.load_seeds(&instance.id).await {
            Ok(seeds) => {
                for url in seeds {
                    if http_url(&url).is_none() {
                        warn!(instance_id = %instance.id, url, "ignoring stored seed");
                    } else if queue.push(url) {
                        instance.add_total(1);
                    }
                }
            },
            Err(e) => warn!(instance_id = %instance.id, error = %e, "failed to load seeds"),
        }

        let mut seeds = instance.take_seed_rx();
        let mut last_visit: HashMap<String, Instant> = HashMap::new();
        let outcome = loop {
            if instance.stop_requested() {
                info!(instance_id = %instance.id, "stopping at URL boundary");
                break Ok(());
            }
            drain_seeds(&instance, seeds.as_mut(), &mut queue);
            let Some(url) = queue.pop() else {
                // close first so nothing can be seeded after the final drain
                instance.close_seeding();
                if drain_seeds(&instance, seeds.as_mut(), &mut queue) == 0 {
                    break Ok(());
                }
                continue;
            };

            match self.process_url(&instance, &url, &mut last_visit).await {
                Ok((result, links)) => {
                    self.record_result(&instance, result).await;
                    if instance.config.follow_links {
                        for link in links {
                            if queue.push_discovered(link) {
                                instance.add_total(1);
                            }
                        }
                    }
                },
                Err(e) => break Err(e),
            }
        };

        #[cfg(feature = "metrics")]
        pagemine_metrics::gauge!(pagemine_metrics::miner::INSTANCES_RUNNING).decrement(1.0);

        match outcome {
            Ok(()) => {
                if instance.finish(InstanceStatus::Running, InstanceStatus::Completed, None) {
                    let summary = instance.stats();
                    info!(
                        instance_id = %instance.id,
                        processed = summary.processed,
                        succeeded = summary.succeeded,
                        failed = summary.failed,
                        disallowed = summary.disallowed,
                        elapsed_ms = summary.elapsed_ms,
                        "instance completed"
                    );
                    self.emit(MinerEvent::InstanceCompleted {
                        instance_id: instance.id.clone(),
                        summary,
                    });
                }
            },
            Err(e) => {
                error!(instance_id = %instance.id, error = %e, "instance failed");
                if instance.finish(
                    InstanceStatus::Running,
                    InstanceStatus::Failed,
                    Some(e.to_string()),
                ) {
                    self.emit(MinerEvent::InstanceFailed {
                        instance_id: instance.id.clone(),
                        error: e.to_string(),
                    });
                }
            },
        }
    }

    /// Mine one URL to a result. `Err` only when the pool can no longer
    /// serve pages at all.
    async fn process_url(
        &self,
        instance: &MiningInstance,
        url: &str,
        last_visit: &mut HashMap<String, Instant>,
    ) -> Result<(ExtractionResult, Vec<String>)> {
        let started = Instant::now();
        let robots = self.policy.check_robots(url).await;
        if !robots.allowed {
            debug!(instance_id = %instance.id, url, "disallowed by robots.txt");
            let mut result = ExtractionResult::new(url, ResultStatus::Disallowed);
            result.error = Some("disallowed by robots.txt".into());
            return Ok((result, Vec::new()));
        }
        let domain = match domain_key(url) {
            Ok(domain) => domain,
            Err(e) => {
                let mut result = ExtractionResult::new(url, ResultStatus::Failed);
                result.error = Some(e.to_string());
                return Ok((result, Vec::new()));
            },
        };
        if let Some(last) = last_visit.get(&domain) {
            tokio::time::sleep_until(*last + robots.crawl_delay).await;
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.policy.throttle(&domain).await;
            last_visit.insert(domain.clone(), Instant::now());

            let proxy = self.policy.next_proxy();
            let opts = proxy
                .as_ref()
                .map(|p| AcquireOptions::with_proxy(p.server_url()))
                .unwrap_or_default();
            let attempt_started = Instant::now();
            let outcome = self
                .pool
                .execute(opts, |page| self.mine_page(page, url, &instance.config))
                .await;
            if let Some(p) = &proxy {
                self.policy.record_proxy_outcome(
                    &p.id,
                    outcome.is_ok(),
                    attempt_started.elapsed().as_secs_f64() * 1000.0,
                );
            }

            match outcome {
                Ok(output) => {
                    let mut result = ExtractionResult::new(url, ResultStatus::Success);
                    result.final_url = output.final_url;
                    result.structure = output.structure;
                    result.attributes = output.attributes;
                    result.attribute_errors = output.attribute_errors;
                    result.custom = output.custom;
                    result.custom_errors = output.custom_errors;
                    result.attempts = attempt;
                    result.proxy = proxy.map(|p| p.id);
                    result.duration_ms = duration_ms(started);
                    return Ok((result, output.links));
                },
                Err(e) => {
                    if e.is_capacity_lost(self.pool.browser_count().await) {
                        return Err(e);
                    }
                    let decision = self.policy.retry_policy(attempt);
                    if !decision.should_retry {
                        warn!(instance_id = %instance.id, url, attempt, error = %e, "URL failed");
                        let mut result = ExtractionResult::new(url, ResultStatus::Failed);
                        result.error = Some(e.to_string());
                        result.attempts = attempt;
                        result.proxy = proxy.map(|p| p.id);
                        result.duration_ms = duration_ms(started);
                        return Ok((result, Vec::new()));
                    }
                    debug!(
                        instance_id = %instance.id,
                        url,
                        attempt,
                        delay_ms = decision.delay.as_millis() as u64,
                        error = %e,
                        "retrying URL"
                    );
                    #[cfg(feature = "metrics")]
                    pagemine_metrics::counter!(pagemine_metrics::miner::RETRIES_TOTAL).increment(1);
                    tokio::time::sleep(decision.delay).await;
                },
            }
        }
    }

    async fn mine_page(
        &self,
        page: PageHandle,
        url: &str,
        config: &InstanceConfig,
    ) -> Result<PageOutput> {
        page.goto(url).await?;
        let final_url = page.url().await?;
        let structure = if config.extract_structure {
            Some(self.extractor.extract(&page).await?)
        } else {
            None
        };
        let attributes = extract_attributes(&page, &config.attributes).await?;

        let mut custom = BTreeMap::new();
        let mut custom_errors = BTreeMap::new();
        for name in &config.custom_extractors {
            let Some(extractor) = self.extractors.get(name) else {
                debug!(extractor = %name, "unknown custom extractor, skipped");
                continue;
            };
            let call = AssertUnwindSafe(async { extractor(page.clone()).await }).catch_unwind();
            match call.await {
                Ok(Ok(value)) => {
                    custom.insert(name.clone(), value);
                },
                Ok(Err(e)) => {
                    warn!(extractor = %name, url, error = %e, "custom extractor failed");
                    custom_errors.insert(name.clone(), format!("{e:#}"));
                },
                Err(panic) => {
                    let message = panic_message(&*panic);
                    warn!(extractor = %name, url, panic = message, "custom extractor panicked");
                    custom_errors.insert(name.clone(), format!("panicked: {message}"));
                },
            }
        }

        let links = match (&structure, config.follow_links) {
            (_, false) => Vec::new(),
            (Some(structure), true) => structure.links.clone(),
            (None, true) => {
                let html = page.content().await?;
                links::same_host_links(&html, final_url.as_deref().unwrap_or(url))
            },
        };

        Ok(PageOutput {
            final_url,
            structure,
            attributes: attributes.values,
            attribute_errors: attributes.errors,
            custom,
            custom_errors,
            links,
        })
    }

    async fn record_result(&self, instance: &MiningInstance, result: ExtractionResult) {
        let result = Arc::new(result);
        self.bundles.append(instance.topic(), Arc::clone(&result));
        if let Err(e) = self.store.save_result(instance.topic(), &result).await {
            warn!(instance_id = %instance.id, url = %result.url, error = %e, "failed to save result");
        }
        let processed = instance.record(result.status);
        debug!(
            instance_id = %instance.id,
            url = %result.url,
            status = result.status.as_str(),
            attempts = result.attempts,
            processed,
            "URL processed"
        );

        #[cfg(feature = "metrics")]
        {
            use pagemine_metrics::{counter, histogram, labels, miner};
            counter!(miner::URLS_PROCESSED_TOTAL, labels::STATUS => result.status.as_str())
                .increment(1);
            counter!(miner::BUNDLE_RESULTS_TOTAL).increment(1);
            histogram!(miner::URL_DURATION_SECONDS).record(result.duration_ms as f64 / 1000.0);
        }

        self.emit(MinerEvent::UrlProcessed {
            instance_id: instance.id.clone(),
            url: result.url.clone(),
            status: result.status,
            attempts: result.attempts,
            processed,
            total: instance.total(),
        });
    }
}

impl Drop for MiningOrchestrator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn drain_seeds(
    instance: &MiningInstance,
    seeds: Option<&mut tokio::sync::mpsc::UnboundedReceiver<String>>,
    queue: &mut UrlQueue,
) -> usize {
    let Some(rx) = seeds else {
        return 0;
    };
    let mut added = 0;
    while let Ok(url) = rx.try_recv() {
        if queue.push(url) {
            instance.add_total(1);
            added += 1;
        }
    }
    added
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn duration_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, pagemine_config::AttributeSpec, rstest::rstest};

    fn instance(name: &str, urls: &[&str]) -> InstanceConfig {
        InstanceConfig {
            name: name.into(),
            urls: urls.iter().map(|u| (*u).to_string()).collect(),
            ..Default::default()
        }
    }

    fn attr(name: &str) -> AttributeSpec {
        AttributeSpec {
            name: name.into(),
            selector: "h1".into(),
            ..Default::default()
        }
    }

    #[rstest]
    #[case::empty_name(instance("  ", &["https://a.test/"]), "name is empty")]
    #[case::no_urls(instance("news", &[]), "has no URLs")]
    #[case::bad_scheme(instance("news", &["ftp://a.test/"]), "not an http(s) URL")]
    #[case::unparsable(instance("news", &["not a url"]), "not an http(s) URL")]
    #[case::duplicate_attribute(
        InstanceConfig { attributes: vec![attr("title"), attr("title")], ..instance("news", &["https://a.test/"]) },
        "duplicate attribute name"
    )]
    #[case::blank_selector(
        InstanceConfig { attributes: vec![AttributeSpec { name: "x".into(), ..Default::default() }], ..instance("news", &["https://a.test/"]) },
        "need a name and a selector"
    )]
    fn rejects_invalid_instances(#[case] config: InstanceConfig, #[case] expected: &str) {
        let err = validate_instance(&config).unwrap_err();
        assert!(matches!(err, MinerError::InvalidConfig { .. }));
        assert!(err.to_string().contains(expected), "{err}");
    }

    #[test]
    fn accepts_minimal_instance() {
        validate_instance(&InstanceConfig {
            attributes: vec![attr("title"), attr("heading")],
            ..instance("news", &["https://a.test/", "http://b.test/x?y=1"])
        })
        .unwrap();
    }
}
