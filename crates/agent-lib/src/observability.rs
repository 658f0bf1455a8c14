//! Observability infrastructure for the vSphere agent
//!
//! Provides:
//! - Prometheus metrics (cycle latency, performance query latency and failures, emitted entities)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for collection cycle latency (in seconds)
const CYCLE_LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Histogram buckets for a single performance query (in seconds)
const QUERY_LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<Option<AgentMetricsInner>> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct AgentMetricsInner {
    cycle_latency_seconds: Histogram,
    perf_query_latency_seconds: Histogram,
    perf_queries: IntCounter,
    perf_query_failures: IntCounter,
    entities_emitted: IntGauge,
    objects_excluded: IntCounter,
    entity_errors: IntCounter,
    metric_write_errors: IntCounter,
    cycle_failures: IntCounter,
}

impl AgentMetricsInner {
    fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            cycle_latency_seconds: register_histogram!(
                "vsphere_agent_cycle_latency_seconds",
                "Time spent running one collection cycle",
                CYCLE_LATENCY_BUCKETS.to_vec()
            )?,

            perf_query_latency_seconds: register_histogram!(
                "vsphere_agent_perf_query_latency_seconds",
                "Time spent in a single performance query",
                QUERY_LATENCY_BUCKETS.to_vec()
            )?,

            perf_queries: register_int_counter!(
                "vsphere_agent_perf_queries_total",
                "Total number of performance queries issued"
            )?,

            perf_query_failures: register_int_counter!(
                "vsphere_agent_perf_query_failures_total",
                "Total number of performance queries that failed or were cancelled"
            )?,

            entities_emitted: register_int_gauge!(
                "vsphere_agent_entities_emitted",
                "Number of entities emitted by the last collection cycle"
            )?,

            objects_excluded: register_int_counter!(
                "vsphere_agent_objects_excluded_total",
                "Total number of objects excluded by the tag filter"
            )?,

            entity_errors: register_int_counter!(
                "vsphere_agent_entity_errors_total",
                "Total number of entities that could not be created"
            )?,

            metric_write_errors: register_int_counter!(
                "vsphere_agent_metric_write_errors_total",
                "Total number of metrics that could not be written"
            )?,

            cycle_failures: register_int_counter!(
                "vsphere_agent_cycle_failures_total",
                "Total number of collection cycles that were aborted"
            )?,
        })
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone, Debug)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(|| match AgentMetricsInner::new() {
            Ok(inner) => Some(inner),
            Err(e) => {
                warn!(error = %e, "Failed to register agent metrics, self-metrics disabled");
                None
            }
        });
        Self { _private: () }
    }

    fn inner(&self) -> Option<&AgentMetricsInner> {
        GLOBAL_METRICS.get().and_then(Option::as_ref)
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        if let Some(inner) = self.inner() {
            inner.cycle_latency_seconds.observe(duration_secs);
        }
    }

    pub fn observe_perf_query_latency(&self, duration_secs: f64) {
        if let Some(inner) = self.inner() {
            inner.perf_query_latency_seconds.observe(duration_secs);
        }
    }

    pub fn inc_perf_queries(&self, count: u64) {
        if let Some(inner) = self.inner() {
            inner.perf_queries.inc_by(count);
        }
    }

    pub fn inc_perf_query_failures(&self, count: u64) {
        if let Some(inner) = self.inner() {
            inner.perf_query_failures.inc_by(count);
        }
    }

    /// Update the number of entities emitted by the last cycle
    pub fn set_entities_emitted(&self, count: i64) {
        if let Some(inner) = self.inner() {
            inner.entities_emitted.set(count);
        }
    }

    pub fn inc_objects_excluded(&self) {
        if let Some(inner) = self.inner() {
            inner.objects_excluded.inc();
        }
    }

    pub fn inc_entity_errors(&self) {
        if let Some(inner) = self.inner() {
            inner.entity_errors.inc();
        }
    }

    pub fn inc_metric_write_errors(&self) {
        if let Some(inner) = self.inner() {
            inner.metric_write_errors.inc();
        }
    }

    pub fn inc_cycle_failures(&self) {
        if let Some(inner) = self.inner() {
            inner.cycle_failures.inc();
        }
    }
}

/// Structured logger for agent events
///
/// Provides consistent JSON-formatted logging for collection cycles
/// and other significant events.
#[derive(Clone, Debug)]
pub struct StructuredLogger {
    endpoint: String,
}

impl StructuredLogger {
    /// `endpoint` names the vCenter or ESXi host being collected
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str) {
        info!(
            event = "agent_started",
            endpoint = %self.endpoint,
            agent_version = %version,
            "vSphere agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            endpoint = %self.endpoint,
            reason = %reason,
            "vSphere agent shutting down"
        );
    }

    /// Log a finished collection cycle
    pub fn log_cycle_complete(
        &self,
        datacenters: usize,
        entities: usize,
        excluded: usize,
        errors: usize,
        elapsed_ms: u128,
    ) {
        info!(
            event = "cycle_complete",
            endpoint = %self.endpoint,
            datacenters = datacenters,
            entities = entities,
            excluded = excluded,
            errors = errors,
            elapsed_ms = elapsed_ms,
            "Collection cycle complete"
        );
    }

    /// Log a cycle that returned only part of its performance data
    pub fn log_partial_performance(&self, datacenter: &str, failed: usize, total: usize) {
        warn!(
            event = "perf_partial",
            endpoint = %self.endpoint,
            datacenter = %datacenter,
            failed_queries = failed,
            total_queries = total,
            "Performance data incomplete, emitting what was collected"
        );
    }

    /// Log an aborted cycle
    pub fn log_cycle_failed(&self, reason: &str) {
        error!(
            event = "cycle_failed",
            endpoint = %self.endpoint,
            reason = %reason,
            "Collection cycle aborted, retrying on the next cycle"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_metrics_creation() {
        let metrics = AgentMetrics::new();

        // Verify metrics can be observed
        metrics.observe_cycle_latency(0.5);
        metrics.observe_perf_query_latency(0.002);
        metrics.inc_perf_queries(6);
        metrics.inc_perf_query_failures(1);
        metrics.set_entities_emitted(12);
        metrics.inc_objects_excluded();
        metrics.inc_entity_errors();
        metrics.inc_metric_write_errors();
        metrics.inc_cycle_failures();

        // A second handle shares the same registration
        let again = AgentMetrics::new();
        again.inc_perf_queries(1);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("vcenter.example.com");
        assert_eq!(logger.endpoint, "vcenter.example.com");
        logger.log_cycle_complete(1, 3, 0, 0, 12);
    }
}
