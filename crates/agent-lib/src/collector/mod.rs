//! Collection of inventory objects into entities
//!
//! The driver runs one collection cycle; the loop schedules cycles, bounds
//! them with a timeout and publishes the resulting payloads.

mod datastores;
mod driver;
mod r#loop;


pub use datastores::{
    build_datastore, sanitize_entity_name, BuildContext, BuildStats, PERF_METRIC_PREFIX,
    TAGS_INVENTORY_CATEGORY, TAGS_PREFIX,
};
pub use driver::{CollectionDriver, CollectionDriverBuilder, CycleReport};
pub use r#loop::{
    CollectionConfig, CollectionLoop, CollectionLoopBuilder, CycleHistory, CycleState,
    CycleSummary,
};
