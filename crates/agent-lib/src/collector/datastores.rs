//! Datastore entities and metric sets

use crate::error::{AgentError, Result};
use crate::models::{Datastore, ObjectKind, PerfSample};
use crate::observability::AgentMetrics;
use crate::output::{Entity, EntityKind, EntityRegistry};
use crate::settings::AgentSettings;
use crate::tags::TagIndex;
use tracing::{debug, warn};

/// Prefix of tag attributes, e.g. `label.env`
pub const TAGS_PREFIX: &str = "label.";

/// Prefix of performance gauges, e.g. `perf.disk.used.latest`
pub const PERF_METRIC_PREFIX: &str = "perf.";

/// Inventory section mirroring the tag attributes
pub const TAGS_INVENTORY_CATEGORY: &str = "tags";

const BYTES_PER_GIB: f64 = (1u64 << 30) as f64;

/// Shared state for building the entities of one datacenter
pub struct BuildContext<'a> {
    pub settings: &'a AgentSettings,
    pub registry: &'a EntityRegistry,
    pub tags: &'a TagIndex,
    pub metrics: &'a AgentMetrics,
    pub datacenter_name: &'a str,
}

/// Counts from building one datastore
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    pub instance_entities: usize,
    pub metric_errors: usize,
    pub entity_errors: usize,
}

/// Writes metrics into one entity, logging and counting failed writes
struct MetricWriter<'a> {
    entity: &'a Entity,
    metrics: &'a AgentMetrics,
    errors: usize,
}

impl<'a> MetricWriter<'a> {
    fn new(entity: &'a Entity, metrics: &'a AgentMetrics) -> Self {
        Self {
            entity,
            metrics,
            errors: 0,
        }
    }

    fn attribute(&mut self, key: &str, value: impl Into<String>) {
        let result = self.entity.metrics().set_attribute(key, value);
        self.check(key, result);
    }

    fn gauge(&mut self, key: &str, value: f64) {
        let result = self.entity.metrics().set_gauge(key, value);
        self.check(key, result);
    }

    fn check(&mut self, key: &str, result: Result<()>) {
        if let Err(e) = result {
            self.errors += 1;
            self.metrics.inc_metric_write_errors();
            warn!(
                entity_id = %self.entity.id(),
                key = %key,
                error = %e,
                "Failed to write metric"
            );
        }
    }
}

/// Entity name of a datastore; vCenter names are qualified by datacenter
pub fn sanitize_entity_name(settings: &AgentSettings, name: &str, datacenter_name: &str) -> String {
    let name = name.trim();
    if settings.vcenter_api && !datacenter_name.is_empty() {
        format!("{}:{}", datacenter_name, name)
    } else {
        name.to_string()
    }
}

/// Build the datastore entity, plus instance entities when enabled.
///
/// Fails only when the datastore entity itself cannot be created; the
/// caller skips the datastore and carries on.
pub fn build_datastore(
    ctx: &BuildContext<'_>,
    datastore: &Datastore,
    perf: &[PerfSample],
) -> Result<BuildStats> {
    let kind = EntityKind::Object(ObjectKind::Datastore);
    // The datacenter prefix would otherwise hide a blank name
    if datastore.name.trim().is_empty() {
        return Err(AgentError::EntityCreation {
            kind: kind.to_string(),
            id: datastore.url.clone(),
            reason: "datastore name is empty".to_string(),
        });
    }

    let entity_name = sanitize_entity_name(ctx.settings, &datastore.name, ctx.datacenter_name);
    let datastore_id = datastore.url.as_str();

    let entity = ctx.registry.get_or_create(
        kind,
        &entity_name,
        datastore_id,
    )?;

    let mut stats = BuildStats::default();
    let mut writer = MetricWriter::new(&entity, ctx.metrics);

    if let Some(location) = ctx.settings.location() {
        writer.attribute("datacenterLocation", location);
    }
    if ctx.settings.vcenter_api {
        writer.attribute("datacenterName", ctx.datacenter_name);
    }

    writer.attribute("name", datastore.name.as_str());
    writer.attribute("fileSystemType", datastore.fs_type.as_str());
    writer.attribute("overallStatus", datastore.overall_status.to_string());
    writer.attribute("accessible", datastore.accessible.to_string());
    writer.gauge("vmCount", datastore.vms.len() as f64);
    writer.gauge("hostCount", datastore.hosts.len() as f64);
    writer.attribute("url", datastore.url.as_str());
    writer.gauge("capacity", datastore.capacity_bytes as f64 / BYTES_PER_GIB);
    writer.gauge("freeSpace", datastore.free_space_bytes as f64 / BYTES_PER_GIB);
    writer.gauge("uncommitted", datastore.uncommitted_bytes as f64 / BYTES_PER_GIB);

    for (key, value) in datastore.backing.attributes() {
        writer.attribute(key, value);
    }

    if ctx.settings.tag_collection_enabled() {
        for (category, value) in ctx.tags.tags_by_category(&datastore.reference) {
            writer.attribute(&format!("{}{}", TAGS_PREFIX, category), value.as_str());
            entity.set_inventory(TAGS_INVENTORY_CATEGORY, &category, value);
        }
    }

    if ctx.settings.perf_metrics_enabled() {
        for sample in perf {
            let key = format!("{}{}", PERF_METRIC_PREFIX, sample.counter);
            if let Some(value) = sample.value {
                writer.gauge(&key, value);
            }

            if ctx.settings.consider_instances_enabled() {
                for (instance, value) in &sample.instances {
                    if instance.is_empty() {
                        continue;
                    }
                    match build_instance(ctx, &entity_name, datastore_id, instance, &key, *value) {
                        Ok(created) => {
                            stats.instance_entities += usize::from(created);
                        }
                        Err(e) => {
                            stats.entity_errors += 1;
                            ctx.metrics.inc_entity_errors();
                            warn!(
                                datastore_name = %entity_name,
                                datastore_id = %datastore_id,
                                instance = %instance,
                                error = %e,
                                "Failed to create instance entity"
                            );
                        }
                    }
                }
            }
        }
    }

    stats.metric_errors += writer.errors;
    debug!(
        datastore_name = %entity_name,
        metrics = entity.metrics().len(),
        instances = stats.instance_entities,
        "Built datastore entity"
    );

    Ok(stats)
}

/// Write one instance value, returning true if the instance entity was new
fn build_instance(
    ctx: &BuildContext<'_>,
    parent_name: &str,
    parent_id: &str,
    instance: &str,
    key: &str,
    value: f64,
) -> Result<bool> {
    let kind = EntityKind::Instance(ObjectKind::Datastore);
    let instance_id = format!("{}:{}", parent_id, instance);
    let created = ctx.registry.get(kind, &instance_id).is_none();

    let entity = ctx.registry.get_or_create(
        kind,
        &format!("{}:{}", parent_name, instance),
        &instance_id,
    )?;

    let mut writer = MetricWriter::new(&entity, ctx.metrics);
    writer.attribute("dataStoreID", parent_id);
    if let Some(location) = ctx.settings.location() {
        writer.attribute("datacenterLocation", location);
    }
    writer.attribute("datacenterName", ctx.datacenter_name);
    writer.attribute("instanceName", instance);
    writer.gauge(key, value);

    Ok(created)
}
