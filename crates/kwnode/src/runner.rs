//! The reconciliation loop.
//!
//! Each cycle classifies every watched node, then every pod of every watched
//! namespace in configuration order, feeds the results to the
//! [`ProblemManager`] and finally sweeps stale records. Cycles never overlap;
//! the next one starts one poll interval after the previous one started, or
//! immediately if the previous one overran.

use std::time::Duration;

use chrono::{DateTime, Utc};
use kw_alerts::{CycleSummary, Notifier, ProblemManager};
use kw_observe::{classify_node, classify_pod, ProblemKind};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::WatchConfig;
use crate::error::Result;
use crate::source::{NodeMetrics, SnapshotSource};

/// Drives reconciliation cycles against a snapshot source.
#[derive(Debug)]
pub struct Runner<S, N> {
    source: S,
    manager: ProblemManager<N>,
    config: WatchConfig,
}

impl<S: SnapshotSource, N: Notifier> Runner<S, N> {
    /// Creates a runner with an empty problem registry.
    #[must_use]
    pub fn new(source: S, notifier: N, config: WatchConfig) -> Self {
        Self::with_manager(source, ProblemManager::new(notifier), config)
    }

    /// Creates a runner around an existing manager.
    #[must_use]
    pub fn with_manager(source: S, manager: ProblemManager<N>, config: WatchConfig) -> Self {
        Self {
            source,
            manager,
            config,
        }
    }

    /// Returns the snapshot source.
    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Returns the problem manager.
    #[must_use]
    pub const fn manager(&self) -> &ProblemManager<N> {
        &self.manager
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Checks that every watch target is reachable.
    ///
    /// # Errors
    ///
    /// Returns a setup error naming the first target that failed.
    pub async fn verify(&self) -> Result<()> {
        if self.config.watch_nodes {
            self.source.verify_nodes().await?;
            debug!("node listing verified");
        }

        for namespace in &self.config.watch_namespaces {
            self.source.verify_namespace(namespace).await?;
            debug!(namespace = %namespace, "namespace verified");
        }

        Ok(())
    }

    /// Runs one reconciliation cycle at time `now`.
    ///
    /// # Errors
    ///
    /// Listing and notification errors abort the cycle. A metrics failure
    /// only skips pressure checks.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleSummary> {
        let mut summary = CycleSummary::default();

        if self.config.watch_nodes {
            let nodes = self.source.list_nodes().await?;
            let metrics = match self.source.node_metrics().await {
                Ok(metrics) => metrics,
                Err(e) => {
                    warn!(error = %e, "node metrics unavailable, skipping pressure checks");
                    NodeMetrics::unavailable()
                }
            };

            // Without metrics a clean result says nothing about pressure.
            let skipped: &[ProblemKind] = if metrics.available {
                &[]
            } else {
                &[ProblemKind::NodeResourcePressure]
            };

            for node in &nodes {
                let detection =
                    classify_node(node, metrics.sample(&node.name), metrics.available);
                let result = self
                    .manager
                    .handle_except(&node.identity(), detection, now, skipped)
                    .await?;
                summary.merge(&result);
            }
        }

        for namespace in &self.config.watch_namespaces {
            let pods = self.source.list_pods(namespace).await?;
            for pod in &pods {
                let detection = classify_pod(pod, now);
                let result = self.manager.handle(&pod.identity(), detection, now).await?;
                summary.merge(&result);
            }
        }

        summary.stale_evicted = self.manager.evict_stale(now);

        debug!(
            resources = summary.resources_checked,
            problems = summary.problems_detected,
            reports = summary.reports_sent,
            resolves = summary.resolves_sent,
            evicted = summary.stale_evicted,
            tracked = self.manager.registry().len(),
            "cycle complete"
        );

        Ok(summary)
    }

    /// Runs cycles until one fails.
    ///
    /// # Errors
    ///
    /// Returns the first fatal cycle error.
    pub async fn start(&mut self) -> Result<()> {
        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            watch_nodes = self.config.watch_nodes,
            namespaces = ?self.config.watch_namespaces,
            notifier = %self.manager.notifier().name(),
            "starting watch loop"
        );

        loop {
            let started = Instant::now();
            self.run_cycle(Utc::now()).await?;

            let elapsed = started.elapsed();
            if elapsed > self.config.poll_interval {
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    "cycle took longer than the poll interval"
                );
            }
            sleep(next_wait(self.config.poll_interval, elapsed)).await;
        }
    }
}

/// Time to wait before the next cycle so that cycles start one `interval`
/// apart. Zero once a cycle has taken the whole interval or longer.
#[must_use]
pub fn next_wait(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}
