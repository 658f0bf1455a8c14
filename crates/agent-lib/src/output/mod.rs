//! Output entities, their metric sets, and the payload handed to the sink

mod entity;
mod payload;
mod registry;

pub use entity::{
    Entity, EntityKey, EntityKind, Inventory, MetricSet, MetricValue, EVENT_TYPE_KEY,
};
pub use payload::{
    EntityData, EntityHeader, IntegrationPayload, MemorySink, MetricSample, PayloadSink,
    StdoutSink,
};
pub use registry::EntityRegistry;
