//! Inventory sources
//!
//! The inventory source lists datacenters and the objects they contain.
//! Opening a live session against vCenter or ESXi is left to the embedding
//! application; [`SnapshotSource`] serves a recorded inventory from disk.

mod snapshot;

pub use snapshot::{DatacenterSnapshot, InventorySnapshot, SnapshotSource};

use crate::error::Result;
use crate::models::{Datacenter, Datastore, ObjectRef};
use async_trait::async_trait;

/// Trait for inventory listing implementations
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// List every datacenter visible to the session
    async fn list_datacenters(&self) -> Result<Vec<Datacenter>>;

    /// List the datastores of one datacenter
    async fn list_datastores(&self, datacenter: &ObjectRef) -> Result<Vec<Datastore>>;
}
