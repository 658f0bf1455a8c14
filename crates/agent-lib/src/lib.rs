//! Agent library for vSphere inventory and performance collection
//!
//! This crate provides the core functionality for:
//! - Batched performance queries bounded by vendor limits
//! - Tag collection and tag-based inclusion filtering
//! - Entity and metric set construction for datastores
//! - Collection cycles and the collection loop
//! - Health checks and observability

pub mod collector;
pub mod error;
pub mod health;
pub mod inventory;
pub mod models;
pub mod observability;
pub mod output;
pub mod performance;
pub mod settings;
pub mod tags;

pub use error::{AgentError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
pub use settings::AgentSettings;
