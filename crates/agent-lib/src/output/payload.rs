//! Integration payload handed to the telemetry sink

use super::entity::{Entity, Inventory, MetricValue};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// Header identifying an entity in the payload
#[derive(Debug, Clone, Serialize)]
pub struct EntityHeader {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

/// Metric sample of one entity.
///
/// `values` sits next to `event_type`; [`MetricSet`](super::MetricSet)
/// refuses that key so the flattened object never repeats it.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSample {
    pub event_type: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, MetricValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityData {
    pub entity: EntityHeader,
    pub metrics: Vec<MetricSample>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub inventory: Inventory,
}

impl From<&Entity> for EntityData {
    fn from(entity: &Entity) -> Self {
        Self {
            entity: EntityHeader {
                name: entity.name().to_string(),
                kind: entity.kind().to_string(),
                id: entity.id().to_string(),
            },
            metrics: vec![MetricSample {
                event_type: entity.kind().event_type(),
                values: entity.metrics().snapshot(),
            }],
            inventory: entity.inventory(),
        }
    }
}

/// Output of one collection cycle
#[derive(Debug, Clone, Serialize)]
pub struct IntegrationPayload {
    pub name: String,
    pub integration_version: String,
    pub timestamp: i64,
    pub data: Vec<EntityData>,
}

impl IntegrationPayload {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        entities: &[Arc<Entity>],
    ) -> Self {
        Self {
            name: name.into(),
            integration_version: version.into(),
            timestamp: chrono::Utc::now().timestamp(),
            data: entities.iter().map(|e| EntityData::from(e.as_ref())).collect(),
        }
    }
}

/// Destination of integration payloads
#[async_trait]
pub trait PayloadSink: Send + Sync {
    async fn publish(&self, payload: &IntegrationPayload) -> Result<()>;
}

/// Writes each payload as one JSON line on stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

#[async_trait]
impl PayloadSink for StdoutSink {
    async fn publish(&self, payload: &IntegrationPayload) -> Result<()> {
        let line = serde_json::to_string(payload).context("Failed to serialize payload")?;
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{}", line).context("Failed to write payload to stdout")?;
        handle.flush().context("Failed to flush stdout")?;
        Ok(())
    }
}

/// Keeps published payloads in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    payloads: Mutex<Vec<IntegrationPayload>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payloads(&self) -> Vec<IntegrationPayload> {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PayloadSink for MemorySink {
    async fn publish(&self, payload: &IntegrationPayload) -> Result<()> {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(payload.clone());
        Ok(())
    }
}
