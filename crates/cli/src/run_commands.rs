//! `pagemine run`: mine every configured instance and emit the bundles.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    anyhow::{Context, Result},
    clap::Args,
    pagemine_browser::{BrowserPool, detect::detect_browser},
    pagemine_config::{InstanceConfig, MinerConfig, validate::Severity},
    pagemine_extract::PageStructureExtractor,
    pagemine_metrics::{MetricsRecorderConfig, init_metrics},
    pagemine_miner::{InstanceStats, MinerEvent, MiningOrchestrator, NoopResultStore},
    pagemine_policy::CrawlPolicyEngine,
    tokio::sync::broadcast,
    tracing::{info, warn},
};

#[derive(Args)]
pub struct RunArgs {
    /// Only run the configured instance with this name.
    #[arg(long)]
    instance: Option<String>,
    /// Mine this URL in an ad-hoc instance (repeatable).
    #[arg(long = "url")]
    urls: Vec<String>,
    /// Write the data bundles here instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Write Prometheus metrics here when the run ends.
    #[arg(long)]
    metrics_out: Option<PathBuf>,
}

/// Instances to run: the configured ones (optionally filtered by name) plus
/// an ad-hoc instance for `--url`.
fn select_instances(config: &MinerConfig, args: &RunArgs) -> Result<Vec<InstanceConfig>> {
    let mut instances: Vec<InstanceConfig> = match &args.instance {
        Some(name) => {
            let found: Vec<_> = config
                .instances
                .iter()
                .filter(|i| &i.name == name)
                .cloned()
                .collect();
            if found.is_empty() {
                anyhow::bail!("no instance named {name:?} in the config");
            }
            found
        },
        None => config.instances.clone(),
    };
    if !args.urls.is_empty() {
        instances.push(InstanceConfig {
            name: "adhoc".into(),
            urls: args.urls.clone(),
            ..Default::default()
        });
    }
    if instances.is_empty() {
        anyhow::bail!("nothing to mine: add [[instances]] to the config or pass --url");
    }
    Ok(instances)
}

fn log_event(event: &MinerEvent) {
    match event {
        MinerEvent::UrlProcessed {
            url,
            status,
            attempts,
            processed,
            total,
            ..
        } => info!(url, status = status.as_str(), attempts, processed, total, "processed"),
        MinerEvent::BrowserRecovered {
            failed_browser_id,
            replacement_id,
        } => warn!(
            failed_browser_id,
            replacement_id = replacement_id.as_deref().unwrap_or("-"),
            "browser replaced"
        ),
        MinerEvent::InstanceFailed { instance_id, error } => {
            warn!(instance_id, error, "instance failed");
        },
        _ => {},
    }
}

fn print_summary(stats: &[InstanceStats]) {
    eprintln!();
    eprintln!(
        "{:<20} {:<10} {:>7} {:>7} {:>7} {:>10} {:>9}",
        "instance", "status", "ok", "failed", "robots", "processed", "seconds"
    );
    for s in stats {
        eprintln!(
            "{:<20} {:<10} {:>7} {:>7} {:>7} {:>10} {:>9.1}",
            s.name,
            s.status.to_string(),
            s.succeeded,
            s.failed,
            s.disallowed,
            s.processed,
            s.elapsed_ms as f64 / 1000.0
        );
    }
}

pub async fn handle_run(config_path: Option<&Path>, args: RunArgs) -> Result<()> {
    let config = pagemine_config::load_or_discover(config_path)?;
    let validation = pagemine_config::validate_config(&config);
    for d in validation
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
    {
        eprintln!("error: {}: {}", d.path, d.message);
    }
    if validation.has_errors() {
        anyhow::bail!("configuration has errors; run `pagemine config validate` for details");
    }
    let instances = select_instances(&config, &args)?;

    let metrics = init_metrics(MetricsRecorderConfig {
        enabled: config.metrics.enabled && config.metrics.prometheus,
        global_labels: Vec::new(),
    })?;

    let detection = detect_browser(config.browser.chrome_path.as_deref());
    if !detection.found() {
        anyhow::bail!(
            "no Chrome/Chromium found. Install one:\n{}",
            detection.install_hint
        );
    }

    let pool = Arc::new(BrowserPool::with_chromium(config.browser.clone()));
    pool.initialize().await?;
    let orchestrator = MiningOrchestrator::new(
        config.miner.clone(),
        Arc::clone(&pool),
        Arc::new(CrawlPolicyEngine::new(config.policy.clone())?),
        Arc::new(PageStructureExtractor::new(config.extractor.clone())),
        Arc::new(NoopResultStore),
    );

    let mut events = orchestrator.subscribe();
    let progress = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    let interrupt = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping instances at the next URL");
                orchestrator.stop_all();
            }
        })
    };

    let mut ids = Vec::with_capacity(instances.len());
    for instance in instances {
        ids.push(orchestrator.create_instance(instance)?);
    }
    for id in &ids {
        orchestrator.start(id)?;
    }
    let finished = futures::future::join_all(ids.iter().map(|id| orchestrator.wait(id))).await;
    interrupt.abort();
    progress.abort();

    let stats = finished.into_iter().collect::<Result<Vec<_>, _>>()?;
    print_summary(&stats);

    let mut bundles = serde_json::Map::new();
    for topic in orchestrator.topics() {
        if let Some(bundle) = orchestrator.get_data_bundle(&topic) {
            bundles.insert(topic, serde_json::to_value(&bundle)?);
        }
    }
    let json = serde_json::to_string_pretty(&bundles)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("\nBundles written to {}", path.display());
        },
        None => println!("{json}"),
    }

    if let Some(path) = &args.metrics_out {
        std::fs::write(path, metrics.render())
            .with_context(|| format!("writing {}", path.display()))?;
    }

    pool.shutdown().await;
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn args(instance: Option<&str>, urls: &[&str]) -> RunArgs {
        RunArgs {
            instance: instance.map(str::to_string),
            urls: urls.iter().map(|u| (*u).to_string()).collect(),
            output: None,
            metrics_out: None,
        }
    }

    fn config() -> MinerConfig {
        MinerConfig {
            instances: vec![
                InstanceConfig {
                    name: "news".into(),
                    urls: vec!["https://news.test/".into()],
                    ..Default::default()
                },
                InstanceConfig {
                    name: "shop".into(),
                    urls: vec!["https://shop.test/".into()],
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn runs_every_configured_instance_by_default() {
        let names: Vec<_> = select_instances(&config(), &args(None, &[]))
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, ["news", "shop"]);
    }

    #[test]
    fn filters_by_name_and_adds_adhoc_urls() {
        let selected =
            select_instances(&config(), &args(Some("shop"), &["https://x.test/"])).unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].name, "shop");
        assert_eq!(selected[1].name, "adhoc");
        assert_eq!(selected[1].urls, ["https://x.test/"]);
    }

    #[test]
    fn unknown_instance_or_nothing_to_do_is_an_error() {
        assert!(select_instances(&config(), &args(Some("blog"), &[])).is_err());
        assert!(select_instances(&MinerConfig::default(), &args(None, &[])).is_err());
    }
}
