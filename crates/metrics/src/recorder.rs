//! Metrics recorder initialization.

use {anyhow::Result, tracing::info};

/// Handle to the installed recorder.
#[derive(Clone)]
pub struct MetricsHandle {
    #[cfg(feature = "prometheus")]
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl MetricsHandle {
    /// Render metrics in Prometheus text format.
    ///
    /// Empty when metrics are disabled or the `prometheus` feature is off.
    #[must_use]
    pub fn render(&self) -> String {
        #[cfg(feature = "prometheus")]
        {
            self.prometheus_handle
                .as_ref()
                .map(metrics_exporter_prometheus::PrometheusHandle::render)
                .unwrap_or_default()
        }
        #[cfg(not(feature = "prometheus"))]
        {
            String::new()
        }
    }
}

/// Configuration for the metrics system.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorderConfig {
    pub enabled: bool,
    /// Labels added to every series.
    pub global_labels: Vec<(String, String)>,
}

/// Install the global recorder.
///
/// Call once at startup. When disabled (or built without `prometheus`) no
/// recorder is installed and the facade macros discard everything.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or bucket
/// configuration is rejected.
pub fn init_metrics(config: MetricsRecorderConfig) -> Result<MetricsHandle> {
    if !config.enabled {
        info!("metrics collection is disabled");
        return Ok(MetricsHandle {
            #[cfg(feature = "prometheus")]
            prometheus_handle: None,
        });
    }

    #[cfg(feature = "prometheus")]
    {
        let handle = init_prometheus(config)?;
        info!("prometheus metrics recorder installed");
        Ok(MetricsHandle {
            prometheus_handle: Some(handle),
        })
    }

    #[cfg(not(feature = "prometheus"))]
    {
        let _ = config;
        info!("metrics feature not enabled at compile time");
        Ok(MetricsHandle {})
    }
}

#[cfg(feature = "prometheus")]
fn init_prometheus(
    config: MetricsRecorderConfig,
) -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    use {
        crate::{browser, buckets, extract, miner, policy},
        metrics_exporter_prometheus::{Matcher, PrometheusBuilder},
    };

    let mut builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(browser::TASK_DURATION_SECONDS.to_string()),
            &buckets::TASK_DURATION,
        )?
        .set_buckets_for_metric(
            Matcher::Full(miner::URL_DURATION_SECONDS.to_string()),
            &buckets::TASK_DURATION,
        )?
        .set_buckets_for_metric(
            Matcher::Full(extract::DURATION_SECONDS.to_string()),
            &buckets::TASK_DURATION,
        )?
        .set_buckets_for_metric(
            Matcher::Full(policy::THROTTLE_WAIT_SECONDS.to_string()),
            &buckets::THROTTLE_WAIT,
        )?
        .set_buckets_for_metric(
            Matcher::Full(extract::SEO_SCORE.to_string()),
            &buckets::SEO_SCORE,
        )?
        .set_buckets_for_metric(
            Matcher::Full(extract::LAYERS_PER_PAGE.to_string()),
            &buckets::LAYER_COUNT,
        )?;

    for (key, value) in config.global_labels {
        builder = builder.add_global_label(key, value);
    }

    // Installs globally without spawning an HTTP listener.
    Ok(builder.install_recorder()?)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_renders_nothing() {
        let handle = init_metrics(MetricsRecorderConfig::default()).unwrap();
        assert!(handle.render().is_empty());
    }
}
