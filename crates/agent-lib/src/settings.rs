//! Collection settings shared by every component of a collection cycle

use crate::error::{AgentError, Result};
use crate::performance::BatchLimits;
use serde::Deserialize;
use std::path::PathBuf;

/// Default number of entities per performance query. The vendor guidance is
/// between 10 and 50 entities per call.
pub const DEFAULT_BATCH_SIZE_PERF_ENTITIES: i64 = 50;

/// Default number of counters per performance query
pub const DEFAULT_BATCH_SIZE_PERF_METRICS: i64 = 50;

/// Default number of performance queries in flight at once
pub const DEFAULT_MAX_CONCURRENT_QUERIES: usize = 4;

/// Settings consumed by the collection core
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSettings {
    /// Datacenter location label, e.g. `sydney-ultimo`
    #[serde(default)]
    pub datacenter_location: Option<String>,

    /// True when connected to a vCenter rather than a standalone ESXi host
    #[serde(default)]
    pub vcenter_api: bool,

    /// Collect tags (only available through vCenter)
    #[serde(default)]
    pub enable_tags: bool,

    /// Space-separated `category=value` pairs for resource inclusion
    #[serde(default)]
    pub include_tags: String,

    /// Collect performance metrics
    #[serde(default)]
    pub enable_perf_metrics: bool,

    /// Highest counter level requested from the catalog
    #[serde(default = "default_perf_level")]
    pub perf_level: u8,

    /// Counter catalog file; built-in catalog when unset
    #[serde(default)]
    pub perf_metric_file: Option<PathBuf>,

    /// Emit per-instance sub-entities for instanced counters
    #[serde(default)]
    pub consider_instances: bool,

    #[serde(default = "default_batch_size_perf_entities")]
    pub batch_size_perf_entities: i64,

    #[serde(default = "default_batch_size_perf_metrics")]
    pub batch_size_perf_metrics: i64,

    /// Size of the performance query worker pool
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,
}

fn default_perf_level() -> u8 {
    1
}

fn default_batch_size_perf_entities() -> i64 {
    DEFAULT_BATCH_SIZE_PERF_ENTITIES
}

fn default_batch_size_perf_metrics() -> i64 {
    DEFAULT_BATCH_SIZE_PERF_METRICS
}

fn default_max_concurrent_queries() -> usize {
    DEFAULT_MAX_CONCURRENT_QUERIES
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            datacenter_location: None,
            vcenter_api: false,
            enable_tags: false,
            include_tags: String::new(),
            enable_perf_metrics: false,
            perf_level: default_perf_level(),
            perf_metric_file: None,
            consider_instances: false,
            batch_size_perf_entities: DEFAULT_BATCH_SIZE_PERF_ENTITIES,
            batch_size_perf_metrics: DEFAULT_BATCH_SIZE_PERF_METRICS,
            max_concurrent_queries: DEFAULT_MAX_CONCURRENT_QUERIES,
        }
    }
}

impl AgentSettings {
    /// Reject settings the core cannot run with
    pub fn validate(&self) -> Result<()> {
        self.batch_limits()?;

        if self.max_concurrent_queries == 0 {
            return Err(AgentError::invalid_config(
                "max_concurrent_queries must be at least 1",
            ));
        }

        if self.perf_level == 0 {
            return Err(AgentError::invalid_config("perf_level must be at least 1"));
        }

        Ok(())
    }

    /// Tags can only be collected through vCenter
    pub fn tag_collection_enabled(&self) -> bool {
        self.vcenter_api && self.enable_tags
    }

    pub fn tag_filtering_enabled(&self) -> bool {
        self.tag_collection_enabled() && !self.include_tags.trim().is_empty()
    }

    pub fn perf_metrics_enabled(&self) -> bool {
        self.enable_perf_metrics
    }

    pub fn consider_instances_enabled(&self) -> bool {
        self.consider_instances
    }

    /// Vendor query limits derived from the configured batch sizes
    pub fn batch_limits(&self) -> Result<BatchLimits> {
        BatchLimits::new(self.batch_size_perf_entities, self.batch_size_perf_metrics)
    }

    /// Location label, if one was configured
    pub fn location(&self) -> Option<&str> {
        self.datacenter_location
            .as_deref()
            .filter(|location| !location.is_empty())
    }
}
