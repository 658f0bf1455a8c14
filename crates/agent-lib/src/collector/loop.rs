//! Collection loop
//!
//! Runs collection cycles on an interval with jitter, bounds each cycle by
//! a timeout and publishes every cycle's entities to a payload sink.

use super::driver::{CollectionDriver, CycleReport};
use crate::health::{components, HealthRegistry};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::output::{IntegrationPayload, PayloadSink};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for the collection loop
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Base collection interval (default: 60 seconds)
    pub interval: Duration,
    /// Maximum jitter to add to interval (default: 5 seconds)
    pub jitter: Duration,
    /// Performance queries still running after this are cancelled (default: 50 seconds)
    pub cycle_timeout: Duration,
    /// Integration name reported in payloads
    pub integration_name: String,
    /// Integration version reported in payloads
    pub integration_version: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            jitter: Duration::from_secs(5),
            cycle_timeout: Duration::from_secs(50),
            integration_name: "com.vsphere.agent".to_string(),
            integration_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Summary of one published cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub entities: usize,
    pub excluded: usize,
    pub errors: usize,
}

/// Outcome of the cycles run so far
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleState {
    /// Cycles that published a payload
    pub published: u64,
    /// Summary of the most recent published cycle
    pub last_published: Option<CycleSummary>,
    /// Failed cycles since the last published one
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Shared record of cycle outcomes, written by the loop
#[derive(Debug, Clone, Default)]
pub struct CycleHistory {
    state: Arc<RwLock<CycleState>>,
}

impl CycleHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_published(&self, summary: CycleSummary) {
        let mut state = self.state.write().await;
        state.published += 1;
        state.last_published = Some(summary);
        state.consecutive_failures = 0;
        state.last_error = None;
    }

    pub async fn record_failure(&self, error: impl Into<String>) {
        let mut state = self.state.write().await;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_error = Some(error.into());
    }

    pub async fn state(&self) -> CycleState {
        self.state.read().await.clone()
    }
}

/// Periodically runs the driver and publishes its output
pub struct CollectionLoop {
    driver: Arc<CollectionDriver>,
    sink: Arc<dyn PayloadSink>,
    health: HealthRegistry,
    history: CycleHistory,
    config: CollectionConfig,
    metrics: AgentMetrics,
    logger: StructuredLogger,
}

impl CollectionLoop {
    pub fn new(
        driver: Arc<CollectionDriver>,
        sink: Arc<dyn PayloadSink>,
        health: HealthRegistry,
        config: CollectionConfig,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            driver,
            sink,
            health,
            history: CycleHistory::new(),
            config,
            metrics: AgentMetrics::new(),
            logger,
        }
    }

    /// Cycle outcomes recorded by this loop
    pub fn history(&self) -> &CycleHistory {
        &self.history
    }

    /// Run cycles until `shutdown` is cancelled. The first cycle starts
    /// immediately; cancelling also stops the queries of a running cycle.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            timeout_secs = self.config.cycle_timeout.as_secs(),
            "Starting collection loop"
        );

        let mut cycles = 0u64;
        loop {
            if let Err(e) = self.run_once(&shutdown).await {
                debug!(error = %e, "Collection cycle did not publish");
            }
            cycles += 1;

            if shutdown.is_cancelled() {
                break;
            }

            let wait = self.next_interval();
            debug!(cycles, wait_ms = wait.as_millis(), "Waiting for next cycle");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        info!(cycles, "Shutting down collection loop");
    }

    /// Run one cycle and publish its payload.
    ///
    /// Errors when the cycle aborted or the payload could not be published.
    /// Either way the outcome is recorded in [`history`](Self::history).
    pub async fn run_once(&self, shutdown: &CancellationToken) -> Result<CycleSummary> {
        match self.collect_and_publish(shutdown).await {
            Ok(summary) => {
                self.history.record_published(summary).await;
                Ok(summary)
            }
            Err(e) => {
                self.history.record_failure(format!("{:#}", e)).await;
                Err(e)
            }
        }
    }

    async fn collect_and_publish(&self, shutdown: &CancellationToken) -> Result<CycleSummary> {
        let start = Instant::now();
        let cancel = shutdown.child_token();
        let timer = tokio::spawn({
            let cancel = cancel.clone();
            let timeout = self.config.cycle_timeout;
            async move {
                tokio::time::sleep(timeout).await;
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "Collection cycle timed out, cancelling outstanding queries"
                );
                cancel.cancel();
            }
        });

        let result = self.driver.run_cycle(&cancel).await;
        timer.abort();

        let report = result.context("collection cycle aborted")?;
        let summary = self.publish(&report).await?;

        self.logger.log_cycle_complete(
            report.datacenters,
            summary.entities,
            summary.excluded,
            summary.errors,
            start.elapsed().as_millis(),
        );
        self.health.set_ready(true).await;

        Ok(summary)
    }

    async fn publish(&self, report: &CycleReport) -> Result<CycleSummary> {
        let payload = IntegrationPayload::new(
            &self.config.integration_name,
            &self.config.integration_version,
            &report.entities,
        );

        if let Err(e) = self.sink.publish(&payload).await {
            self.health
                .set_unhealthy(components::SINK, e.to_string())
                .await;
            self.metrics.inc_cycle_failures();
            self.logger.log_cycle_failed(&e.to_string());
            return Err(e.context("failed to publish payload"));
        }
        self.health.set_healthy(components::SINK).await;

        Ok(CycleSummary {
            entities: report.entities.len(),
            excluded: report.objects_excluded,
            errors: report.error_count(),
        })
    }

    /// Interval until the next cycle, with jitter to spread load on the endpoint
    fn next_interval(&self) -> Duration {
        let jitter_ms = rand_jitter(self.config.jitter.as_millis() as u64);
        self.config.interval + Duration::from_millis(jitter_ms)
    }
}

/// Generate a random jitter value between 0 and max_ms
fn rand_jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;

    now % max_ms
}

/// Builder for creating the collection loop
pub struct CollectionLoopBuilder {
    driver: Option<Arc<CollectionDriver>>,
    sink: Option<Arc<dyn PayloadSink>>,
    health: HealthRegistry,
    history: CycleHistory,
    logger: Option<StructuredLogger>,
    config: CollectionConfig,
}

impl CollectionLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            driver: None,
            sink: None,
            health: HealthRegistry::new(),
            history: CycleHistory::new(),
            logger: None,
            config: CollectionConfig::default(),
        }
    }

    /// Set the collection driver
    pub fn driver(mut self, driver: Arc<CollectionDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Set the payload sink
    pub fn sink(mut self, sink: Arc<dyn PayloadSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Share a health registry with the API server
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    /// Share the cycle history with the API server
    pub fn history(mut self, history: CycleHistory) -> Self {
        self.history = history;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Set the collection interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the jitter duration
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.config.jitter = jitter;
        self
    }

    /// Set the per-cycle timeout
    pub fn cycle_timeout(mut self, timeout: Duration) -> Self {
        self.config.cycle_timeout = timeout;
        self
    }

    /// Set the integration name and version reported in payloads
    pub fn integration(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.config.integration_name = name.into();
        self.config.integration_version = version.into();
        self
    }

    /// Build the collection loop
    pub fn build(self) -> Result<CollectionLoop> {
        let driver = self
            .driver
            .ok_or_else(|| anyhow::anyhow!("Driver is required"))?;
        let sink = self
            .sink
            .ok_or_else(|| anyhow::anyhow!("Sink is required"))?;

        if self.config.cycle_timeout.is_zero() {
            anyhow::bail!("Cycle timeout must be greater than zero");
        }

        let mut collection_loop = CollectionLoop::new(
            driver,
            sink,
            self.health,
            self.config,
            self.logger
                .unwrap_or_else(|| StructuredLogger::new("unknown")),
        );
        collection_loop.history = self.history;
        Ok(collection_loop)
    }
}

impl Default for CollectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectionDriverBuilder;
    use crate::inventory::{InventorySnapshot, SnapshotSource};
    use crate::output::MemorySink;
    use crate::settings::AgentSettings;
    use async_trait::async_trait;

    fn driver() -> Arc<CollectionDriver> {
        let source = Arc::new(SnapshotSource::new(InventorySnapshot::default()));
        Arc::new(
            CollectionDriverBuilder::new(AgentSettings::default())
                .inventory(source)
                .build()
                .unwrap(),
        )
    }

    /// Sink that always fails
    struct BrokenSink;

    #[async_trait]
    impl PayloadSink for BrokenSink {
        async fn publish(&self, _payload: &IntegrationPayload) -> Result<()> {
            anyhow::bail!("pipe closed")
        }
    }

    #[test]
    fn test_collection_config_default() {
        let config = CollectionConfig::default();
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.jitter, Duration::from_secs(5));
        assert!(config.cycle_timeout < config.interval);
    }

    #[test]
    fn test_rand_jitter() {
        let jitter = rand_jitter(1000);
        assert!(jitter < 1000);

        // Zero max should return zero
        assert_eq!(rand_jitter(0), 0);
    }

    #[test]
    fn test_builder_requires_driver_and_sink() {
        assert!(CollectionLoopBuilder::new()
            .sink(Arc::new(MemorySink::new()))
            .build()
            .is_err());
        assert!(CollectionLoopBuilder::new().driver(driver()).build().is_err());
        assert!(CollectionLoopBuilder::new()
            .driver(driver())
            .sink(Arc::new(MemorySink::new()))
            .cycle_timeout(Duration::ZERO)
            .build()
            .is_err());
    }

    #[tokio::test]
    async fn test_run_once_publishes_and_sets_ready() {
        let sink = Arc::new(MemorySink::new());
        let health = HealthRegistry::new();
        let collection_loop = CollectionLoopBuilder::new()
            .driver(driver())
            .sink(sink.clone())
            .health(health.clone())
            .integration("com.example.vsphere", "1.2.3")
            .build()
            .unwrap();

        assert!(!health.readiness().await.ready);

        let summary = collection_loop
            .run_once(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.entities, 0);

        let payloads = sink.payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].name, "com.example.vsphere");
        assert_eq!(payloads[0].integration_version, "1.2.3");
        assert!(health.readiness().await.ready);

        let state = collection_loop.history().state().await;
        assert_eq!(state.published, 1);
        assert_eq!(state.last_published, Some(summary));
    }

    #[tokio::test]
    async fn test_history_tracks_failures_until_next_publish() {
        let history = CycleHistory::new();
        let broken = CollectionLoopBuilder::new()
            .driver(driver())
            .sink(Arc::new(BrokenSink))
            .history(history.clone())
            .build()
            .unwrap();

        assert!(broken.run_once(&CancellationToken::new()).await.is_err());
        assert!(broken.run_once(&CancellationToken::new()).await.is_err());

        let state = history.state().await;
        assert_eq!(state.published, 0);
        assert_eq!(state.consecutive_failures, 2);
        assert!(state.last_error.unwrap().contains("pipe closed"));

        let working = CollectionLoopBuilder::new()
            .driver(driver())
            .sink(Arc::new(MemorySink::new()))
            .history(history.clone())
            .build()
            .unwrap();
        working.run_once(&CancellationToken::new()).await.unwrap();

        let state = history.state().await;
        assert_eq!(state.published, 1);
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.last_error.is_none());
    }

    #[tokio::test]
    async fn test_sink_failure_marks_sink_unhealthy() {
        let health = HealthRegistry::new();
        health.register_all().await;
        let collection_loop = CollectionLoopBuilder::new()
            .driver(driver())
            .sink(Arc::new(BrokenSink))
            .health(health.clone())
            .build()
            .unwrap();

        assert!(collection_loop
            .run_once(&CancellationToken::new())
            .await
            .is_err());

        let status = health.health().await;
        assert_eq!(
            status.components[components::SINK].status,
            crate::health::ComponentStatus::Unhealthy
        );
        assert!(!health.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let sink = Arc::new(MemorySink::new());
        let collection_loop = CollectionLoopBuilder::new()
            .driver(driver())
            .sink(sink.clone())
            .interval(Duration::from_secs(3600))
            .jitter(Duration::ZERO)
            .build()
            .unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(collection_loop.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sink.payloads().len(), 1);
    }
}
