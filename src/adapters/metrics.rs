//! Prometheus metrics recorder.
//!
//! Installs the process-wide recorder behind the `metrics` facade and keeps
//! its histogram upkeep running until release. The HTTP server renders the
//! handle on `/metrics` when this resource is present.

use std::time::Duration;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::adapters::{stop_task, Acquisition, ResourceAdapter, RELEASE_GRACE};
use crate::config::MetricsConfig;
use crate::lifecycle::error::BoxError;
use crate::lifecycle::handle::Resources;
use crate::lifecycle::registry::Release;
use crate::lifecycle::shutdown::{Shutdown, ShutdownListener};

const UPKEEP_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Access to the installed recorder.
#[derive(Clone)]
pub struct MetricsHandle {
    handle: PrometheusHandle,
}

impl MetricsHandle {
    /// Current metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl std::fmt::Debug for MetricsHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsHandle").finish_non_exhaustive()
    }
}

pub struct MetricsAdapter {
    config: MetricsConfig,
}

impl MetricsAdapter {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }
}

async fn upkeep(
    handle: PrometheusHandle,
    every: Duration,
    stop: ShutdownListener,
) -> Result<(), BoxError> {
    let mut ticker = tokio::time::interval(every);
    let stop = stop.wait();
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = ticker.tick() => handle.run_upkeep(),
            _ = &mut stop => break,
        }
    }
    Ok(())
}

#[async_trait]
impl ResourceAdapter for MetricsAdapter {
    type Resource = MetricsHandle;

    fn name(&self) -> &str {
        "metrics"
    }

    async fn construct(&self, _resources: &Resources) -> Acquisition<MetricsHandle> {
        let handle = match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => return Acquisition::failed(e),
        };
        tracing::info!(
            upkeep_interval_secs = self.config.upkeep_interval_secs,
            "Metrics recorder installed"
        );

        let shutdown = Shutdown::new();
        let task = tokio::spawn(upkeep(
            handle.clone(),
            self.config.upkeep_interval(),
            shutdown.subscribe(),
        ));

        // The recorder itself stays installed; only the upkeep loop is stopped.
        let release = Release::new(self.name(), move || {
            stop_task(shutdown, task, UPKEEP_STOP_TIMEOUT)
        })
        .with_timeout(UPKEEP_STOP_TIMEOUT + RELEASE_GRACE);

        Acquisition::ready(MetricsHandle { handle }, release)
    }
}
