//! Entities and their metric sets

use crate::error::{AgentError, Result};
use crate::models::ObjectKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Kind of an emitted entity: an inventory object, or one instance of it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Object(ObjectKind),
    Instance(ObjectKind),
}

impl EntityKind {
    /// Event type of the metric sample, e.g. `VSphereDatastoreSample`
    pub fn event_type(&self) -> String {
        format!("VSphere{}Sample", self)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Object(kind) => write!(f, "{}", kind),
            EntityKind::Instance(kind) => write!(f, "{}Instance", kind),
        }
    }
}

/// Table key of an entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: String,
}

/// Value of a single metric
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Attribute(String),
    Gauge(f64),
}

impl MetricValue {
    pub fn as_gauge(&self) -> Option<f64> {
        match self {
            MetricValue::Gauge(value) => Some(*value),
            MetricValue::Attribute(_) => None,
        }
    }

    pub fn as_attribute(&self) -> Option<&str> {
        match self {
            MetricValue::Attribute(value) => Some(value),
            MetricValue::Gauge(_) => None,
        }
    }
}

/// Key carrying the sample type next to the metrics of a sample
pub const EVENT_TYPE_KEY: &str = "event_type";

/// Key/value metrics attached to an entity
#[derive(Debug, Default)]
pub struct MetricSet {
    values: Mutex<BTreeMap<String, MetricValue>>,
}

impl MetricSet {
    pub fn set_attribute(&self, key: &str, value: impl Into<String>) -> Result<()> {
        self.set(key, MetricValue::Attribute(value.into()))
    }

    /// Gauges must be finite
    pub fn set_gauge(&self, key: &str, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(AgentError::MetricWrite {
                key: key.to_string(),
                reason: format!("gauge value {} is not finite", value),
            });
        }
        self.set(key, MetricValue::Gauge(value))
    }

    fn set(&self, key: &str, value: MetricValue) -> Result<()> {
        if key.trim().is_empty() {
            return Err(AgentError::MetricWrite {
                key: key.to_string(),
                reason: "metric key is empty".to_string(),
            });
        }
        if key == EVENT_TYPE_KEY {
            return Err(AgentError::MetricWrite {
                key: key.to_string(),
                reason: "metric key is reserved for the sample type".to_string(),
            });
        }

        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        if values.insert(key.to_string(), value).is_some() {
            debug!(key = %key, "Metric written twice in one cycle, keeping the last value");
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<MetricValue> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all metrics, ordered by key
    pub fn snapshot(&self) -> BTreeMap<String, MetricValue> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Inventory section of an entity: category -> key -> value
pub type Inventory = BTreeMap<String, BTreeMap<String, String>>;

/// One emitted unit of telemetry
#[derive(Debug)]
pub struct Entity {
    key: EntityKey,
    name: String,
    metrics: MetricSet,
    inventory: Mutex<Inventory>,
}

impl Entity {
    pub(crate) fn new(key: EntityKey, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            metrics: MetricSet::default(),
            inventory: Mutex::new(Inventory::new()),
        }
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn kind(&self) -> EntityKind {
        self.key.kind
    }

    pub fn id(&self) -> &str {
        &self.key.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &MetricSet {
        &self.metrics
    }

    pub fn set_inventory(&self, category: &str, key: &str, value: impl Into<String>) {
        self.inventory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(category.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    pub fn inventory(&self) -> Inventory {
        self.inventory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
