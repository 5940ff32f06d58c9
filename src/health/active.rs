//! Periodic health sweep.
//!
//! # Responsibilities
//! - Probe every live, non-inactive integration on an interval
//! - Feed results into the registry's status state machine

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::health::state::HealthTracker;
use crate::registry::IntegrationRegistry;
use crate::resilience::timeouts::with_timeout;

pub struct HealthMonitor {
    registry: Arc<IntegrationRegistry>,
    config: HealthCheckConfig,
    tracker: HealthTracker,
}

impl HealthMonitor {
    pub fn new(registry: Arc<IntegrationRegistry>, config: HealthCheckConfig) -> Self {
        let tracker = HealthTracker::new(config.unhealthy_threshold);
        Self {
            registry,
            config,
            tracker,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Integration health checks disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.config.interval_secs,
            unhealthy_threshold = self.tracker.unhealthy_threshold(),
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe all targets concurrently, each bounded by the check timeout.
    /// Returns how many were probed.
    pub async fn check_all(&self) -> usize {
        let targets = self.registry.health_targets();
        let limit = Duration::from_secs(self.config.timeout_secs.max(1));

        let probes = targets.iter().map(|(id, live)| async move {
            let adapter = live.adapter();
            let result = with_timeout(limit, adapter.provider(), adapter.health_check()).await;
            (id.as_str(), result)
        });

        let results = join_all(probes).await;
        for (id, result) in &results {
            self.registry.record_health(id, result, &self.tracker);
        }
        tracing::debug!(probed = results.len(), "Health sweep complete");
        results.len()
    }
}
