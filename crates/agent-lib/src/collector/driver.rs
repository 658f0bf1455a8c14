//! One collection cycle over every datacenter
//!
//! A cycle lists datacenters, loads tags once, then for each datacenter
//! lists datastores, applies the inclusion filter, fetches performance data
//! in batches and builds entities into a fresh registry.

use super::datastores::{build_datastore, BuildContext};
use crate::error::{AgentError, Result};
use crate::health::{components, HealthRegistry};
use crate::inventory::InventorySource;
use crate::models::{Datacenter, ObjectKind, ObjectRef};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::output::{Entity, EntityRegistry};
use crate::performance::{CounterCatalog, PerfBatcher, PerfTable, PerformanceService};
use crate::settings::AgentSettings;
use crate::tags::{InclusionFilter, TagIndex, TagService};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a collection cycle produced
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Emitted entities, ordered by kind and id
    pub entities: Vec<Arc<Entity>>,
    pub datacenters: usize,
    pub objects_seen: usize,
    pub objects_excluded: usize,
    pub perf_queries: usize,
    pub perf_failures: usize,
    pub entity_errors: usize,
    pub metric_errors: usize,
    /// Non-fatal problems; the cycle still produced output
    pub warnings: Vec<AgentError>,
}

impl CycleReport {
    pub fn error_count(&self) -> usize {
        self.warnings.len() + self.entity_errors + self.metric_errors
    }
}

/// Runs collection cycles against one endpoint
pub struct CollectionDriver {
    settings: AgentSettings,
    inventory: Arc<dyn InventorySource>,
    tag_service: Option<Arc<dyn TagService>>,
    batcher: Option<PerfBatcher>,
    catalog: CounterCatalog,
    filter: InclusionFilter,
    health: HealthRegistry,
    metrics: AgentMetrics,
    logger: StructuredLogger,
}

impl CollectionDriver {
    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn filter(&self) -> &InclusionFilter {
        &self.filter
    }

    /// Run one collection cycle.
    ///
    /// The cycle aborts when datacenters cannot be listed or when every
    /// performance query of a datacenter failed at the service. Every other
    /// failure is logged, counted and reported while the remaining objects
    /// are still collected. Cancelling `cancel` stops outstanding
    /// performance queries; data that already arrived is kept.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport> {
        let start = Instant::now();

        let datacenters = match self.inventory.list_datacenters().await {
            Ok(datacenters) => {
                self.health.set_healthy(components::INVENTORY).await;
                datacenters
            }
            Err(e) => {
                self.health.record_error(components::INVENTORY, &e).await;
                self.metrics.inc_cycle_failures();
                self.logger.log_cycle_failed(&e.to_string());
                return Err(e);
            }
        };

        let tags = self.load_tags().await;
        let registry = EntityRegistry::new();
        let mut report = CycleReport {
            datacenters: datacenters.len(),
            ..Default::default()
        };

        for datacenter in &datacenters {
            let collected = self
                .collect_datacenter(datacenter, &tags, &registry, cancel, &mut report)
                .await;
            if let Err(e) = collected {
                self.health.record_error(components::PERFORMANCE, &e).await;
                self.metrics.inc_cycle_failures();
                self.logger.log_cycle_failed(&e.to_string());
                return Err(e);
            }
        }

        if report.perf_queries > 0 && report.perf_failures == 0 {
            self.health.set_healthy(components::PERFORMANCE).await;
        }

        report.entities = registry.entities();
        self.metrics.set_entities_emitted(report.entities.len() as i64);
        self.metrics
            .observe_cycle_latency(start.elapsed().as_secs_f64());

        debug!(
            datacenters = report.datacenters,
            entities = report.entities.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Collection cycle finished"
        );

        Ok(report)
    }

    /// Tag index for this cycle; empty when tags are off or unavailable
    async fn load_tags(&self) -> TagIndex {
        if !self.settings.tag_collection_enabled() {
            return TagIndex::empty();
        }

        let Some(service) = &self.tag_service else {
            warn!("Tag collection is enabled but no tag service is configured");
            self.health
                .set_degraded(components::TAGS, "no tag service configured")
                .await;
            return TagIndex::empty();
        };

        match TagIndex::load(service.as_ref()).await {
            Ok(index) => {
                self.health.set_healthy(components::TAGS).await;
                index
            }
            Err(e) => {
                warn!(error = %e, "Failed to load tags, continuing without them");
                self.health
                    .set_degraded(components::TAGS, e.to_string())
                    .await;
                TagIndex::empty()
            }
        }
    }

    async fn collect_datacenter(
        &self,
        datacenter: &Datacenter,
        tags: &TagIndex,
        registry: &EntityRegistry,
        cancel: &CancellationToken,
        report: &mut CycleReport,
    ) -> Result<()> {
        let datastores = match self.inventory.list_datastores(&datacenter.reference).await {
            Ok(datastores) => datastores,
            Err(e) => {
                warn!(
                    datacenter = %datacenter.name,
                    error = %e,
                    "Failed to list datastores, skipping datacenter"
                );
                self.health
                    .set_degraded(components::INVENTORY, e.to_string())
                    .await;
                report.warnings.push(e);
                return Ok(());
            }
        };

        report.objects_seen += datastores.len();

        let (included, excluded): (Vec<_>, Vec<_>) = datastores
            .into_iter()
            .partition(|ds| self.filter.allows(&ds.reference, tags));

        for datastore in &excluded {
            self.metrics.inc_objects_excluded();
            debug!(
                datacenter = %datacenter.name,
                datastore = %datastore.name,
                "Datastore excluded by tag filter"
            );
        }
        report.objects_excluded += excluded.len();

        let refs: Vec<ObjectRef> = included.iter().map(|ds| ds.reference.clone()).collect();
        let perf = self
            .fetch_performance(&datacenter.name, &refs, cancel, report)
            .await?;

        let ctx = BuildContext {
            settings: &self.settings,
            registry,
            tags,
            metrics: &self.metrics,
            datacenter_name: &datacenter.name,
        };

        for datastore in &included {
            match build_datastore(&ctx, datastore, perf.get(&datastore.reference)) {
                Ok(stats) => {
                    report.entity_errors += stats.entity_errors;
                    report.metric_errors += stats.metric_errors;
                }
                Err(e) => {
                    report.entity_errors += 1;
                    self.metrics.inc_entity_errors();
                    warn!(
                        datacenter = %datacenter.name,
                        datastore = %datastore.name,
                        datastore_ref = %datastore.reference,
                        error = %e,
                        "Failed to create datastore entity, skipping"
                    );
                }
            }
        }

        info!(
            datacenter = %datacenter.name,
            datastores = included.len(),
            excluded = excluded.len(),
            "Collected datacenter"
        );
        Ok(())
    }

    async fn fetch_performance(
        &self,
        datacenter: &str,
        objects: &[ObjectRef],
        cancel: &CancellationToken,
        report: &mut CycleReport,
    ) -> Result<PerfTable> {
        let Some(batcher) = &self.batcher else {
            return Ok(PerfTable::default());
        };

        let counters = self
            .catalog
            .counters(ObjectKind::Datastore, self.settings.perf_level);
        if counters.is_empty() {
            debug!(level = self.settings.perf_level, "No counters configured for datastores");
            return Ok(PerfTable::default());
        }

        let outcome = batcher.get_metrics(objects, &counters, cancel).await;
        report.perf_queries += outcome.queries;
        report.perf_failures += outcome.failures.len();

        if let Some(unreachable) = outcome.unreachable() {
            warn!(
                datacenter = %datacenter,
                queries = outcome.queries,
                error = %unreachable,
                "Performance service unreachable, aborting cycle"
            );
            return Err(unreachable);
        }

        if let Some(warning) = outcome.warning() {
            self.logger
                .log_partial_performance(datacenter, outcome.failures.len(), outcome.queries);
            self.health
                .record_error(components::PERFORMANCE, &warning)
                .await;
            report.warnings.push(warning);
        }

        Ok(outcome.table)
    }
}

/// Builder for a [`CollectionDriver`]
pub struct CollectionDriverBuilder {
    settings: AgentSettings,
    inventory: Option<Arc<dyn InventorySource>>,
    tag_service: Option<Arc<dyn TagService>>,
    performance: Option<Arc<dyn PerformanceService>>,
    catalog: Option<CounterCatalog>,
    health: HealthRegistry,
    logger: Option<StructuredLogger>,
}

impl CollectionDriverBuilder {
    pub fn new(settings: AgentSettings) -> Self {
        Self {
            settings,
            inventory: None,
            tag_service: None,
            performance: None,
            catalog: None,
            health: HealthRegistry::new(),
            logger: None,
        }
    }

    /// Set the inventory source
    pub fn inventory(mut self, inventory: Arc<dyn InventorySource>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    /// Set the tag service, used when tag collection is enabled
    pub fn tags(mut self, service: Arc<dyn TagService>) -> Self {
        self.tag_service = Some(service);
        self
    }

    /// Set the performance service, used when performance metrics are enabled
    pub fn performance(mut self, service: Arc<dyn PerformanceService>) -> Self {
        self.performance = Some(service);
        self
    }

    /// Set the counter catalog (default: built-in counters)
    pub fn catalog(mut self, catalog: CounterCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Share a health registry with the API server
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Validate the settings and build the driver
    pub fn build(self) -> Result<CollectionDriver> {
        self.settings.validate()?;

        let inventory = self
            .inventory
            .ok_or_else(|| AgentError::invalid_config("inventory source is required"))?;

        let batcher = if self.settings.perf_metrics_enabled() {
            let service = self.performance.ok_or_else(|| {
                AgentError::invalid_config(
                    "performance metrics are enabled but no performance service is configured",
                )
            })?;
            Some(PerfBatcher::new(
                service,
                self.settings.batch_limits()?,
                self.settings.max_concurrent_queries,
            ))
        } else {
            None
        };

        Ok(CollectionDriver {
            filter: InclusionFilter::from_settings(&self.settings),
            inventory,
            tag_service: self.tag_service,
            batcher,
            catalog: self.catalog.unwrap_or_else(CounterCatalog::builtin),
            health: self.health,
            metrics: AgentMetrics::new(),
            logger: self
                .logger
                .unwrap_or_else(|| StructuredLogger::new("unknown")),
            settings: self.settings,
        })
    }
}
