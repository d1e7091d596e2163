// src/health/checker.rs
use crate::health::HealthProbe;
use crate::load_balancer::Rotator;
use crate::metrics::MetricsCollector;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Periodically refreshes every host's health flag through an injected probe.
pub struct HealthMonitor {
    rotator: Arc<Rotator>,
    probe: Arc<dyn HealthProbe>,
    interval: Duration,
    metrics: Option<Arc<MetricsCollector>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheckSummary {
    pub healthy: usize,
    pub unhealthy: usize,
}

impl HealthMonitor {
    pub fn new(
        rotator: Arc<Rotator>,
        probe: Arc<dyn HealthProbe>,
        interval: Duration,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            rotator,
            probe,
            interval,
            metrics,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Runs until [`HealthMonitor::shutdown`] is called. The first check
    /// happens one full interval after start.
    pub async fn start(self: Arc<Self>) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!("Starting health monitor with interval: {:?}", self.interval);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all_hosts().await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Health monitor shutting down");
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// One monitor tick. Probes run concurrently against a snapshot of the
    /// pool; the rotator lock is only taken to write each result back.
    pub async fn check_all_hosts(&self) -> HealthCheckSummary {
        let addresses = self.rotator.addresses().await;

        let results = futures::future::join_all(addresses.iter().map(|address| async move {
            let result = self.probe.check(address).await;
            (address, result)
        }))
        .await;

        let mut summary = HealthCheckSummary::default();

        for (address, result) in results {
            let healthy = match result {
                Ok(()) => {
                    debug!(host = %address, "Host is healthy");
                    true
                }
                Err(e) => {
                    warn!(host = %address, error = %e, "Host is unhealthy");
                    false
                }
            };

            self.rotator.mark_health(address, healthy).await;

            if let Some(metrics) = &self.metrics {
                metrics.update_backend_health(address.as_str(), healthy);
            }

            if healthy {
                summary.healthy += 1;
            } else {
                summary.unhealthy += 1;
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.update_backend_counts(summary.healthy, addresses.len());
        }

        info!(
            "Health check complete: {} healthy, {} unhealthy",
            summary.healthy, summary.unhealthy
        );

        summary
    }
}
