//! Inventory snapshot served from a JSON file
//!
//! A snapshot carries the inventory listing, the tag attachments and the
//! latest performance samples, and implements all three collaborator traits.
//! A snapshot without a `tags` section behaves like a standalone ESXi host,
//! where the tag service is not available.

use super::InventorySource;
use crate::error::{AgentError, Result};
use crate::models::{Counter, Datacenter, Datastore, ObjectRef, PerfSample};
use crate::performance::{BatchLimits, PerformanceService};
use crate::tags::{TagService, TagSnapshot};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// One datacenter and its datastores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatacenterSnapshot {
    #[serde(flatten)]
    pub datacenter: Datacenter,
    #[serde(default)]
    pub datastores: Vec<Datastore>,
}

/// Recorded state of an inventory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventorySnapshot {
    #[serde(default)]
    pub datacenters: Vec<DatacenterSnapshot>,
    #[serde(default)]
    pub tags: Option<TagSnapshot>,
    #[serde(default)]
    pub performance: Vec<PerfSample>,
}

/// Inventory, tag and performance services backed by a snapshot
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    snapshot: InventorySnapshot,
    query_limits: Option<BatchLimits>,
}

impl SnapshotSource {
    pub fn new(snapshot: InventorySnapshot) -> Self {
        Self {
            snapshot,
            query_limits: None,
        }
    }

    /// Read a snapshot file
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| AgentError::Snapshot {
            path: path.to_path_buf(),
            source,
        })?;
        let source = Self::from_json(&raw)?;

        info!(
            path = %path.display(),
            datacenters = source.snapshot.datacenters.len(),
            samples = source.snapshot.performance.len(),
            "Loaded inventory snapshot"
        );
        Ok(source)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(raw)?))
    }

    /// Reject performance queries larger than `limits`, as the vendor API does
    pub fn with_query_limits(mut self, limits: BatchLimits) -> Self {
        self.query_limits = Some(limits);
        self
    }

    pub fn snapshot(&self) -> &InventorySnapshot {
        &self.snapshot
    }
}

#[async_trait]
impl InventorySource for SnapshotSource {
    async fn list_datacenters(&self) -> Result<Vec<Datacenter>> {
        Ok(self
            .snapshot
            .datacenters
            .iter()
            .map(|dc| dc.datacenter.clone())
            .collect())
    }

    async fn list_datastores(&self, datacenter: &ObjectRef) -> Result<Vec<Datastore>> {
        self.snapshot
            .datacenters
            .iter()
            .find(|dc| &dc.datacenter.reference == datacenter)
            .map(|dc| dc.datastores.clone())
            .ok_or_else(|| {
                AgentError::service_unavailable(
                    "inventory",
                    format!("datacenter {} not found", datacenter),
                )
            })
    }
}

#[async_trait]
impl TagService for SnapshotSource {
    async fn snapshot_tags(&self) -> Result<TagSnapshot> {
        self.snapshot.tags.clone().ok_or_else(|| {
            AgentError::service_unavailable("tag", "tagging is not available on this endpoint")
        })
    }
}

#[async_trait]
impl PerformanceService for SnapshotSource {
    async fn query(&self, objects: &[ObjectRef], counters: &[Counter]) -> Result<Vec<PerfSample>> {
        if let Some(limits) = self.query_limits {
            if objects.len() > limits.max_entities() || counters.len() > limits.max_counters() {
                return Err(AgentError::service_unavailable(
                    "performance",
                    format!(
                        "query for {} entities and {} counters exceeds the limit of {} x {}",
                        objects.len(),
                        counters.len(),
                        limits.max_entities(),
                        limits.max_counters()
                    ),
                ));
            }
        }

        let objects: HashSet<&ObjectRef> = objects.iter().collect();
        let counters: HashSet<&Counter> = counters.iter().collect();

        Ok(self
            .snapshot
            .performance
            .iter()
            .filter(|s| objects.contains(&s.object) && counters.contains(&s.counter))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DatastoreBacking, Tag};
    use std::fs;
    use tempfile::TempDir;

    const SNAPSHOT: &str = r#"{
        "datacenters": [
            {
                "ref": "datacenter-1",
                "name": "dc1",
                "datastores": [
                    {
                        "ref": "datastore-1",
                        "name": "nfs-01",
                        "type": "NFS",
                        "url": "ds:///vmfs/volumes/nfs-01/",
                        "overallStatus": "green",
                        "accessible": true,
                        "capacityBytes": 1073741824,
                        "backing": { "kind": "nas", "remote_host": "filer", "remote_path": "/export" }
                    }
                ]
            }
        ],
        "tags": { "datastore-1": [ { "category": "env", "value": "prod" } ] },
        "performance": [
            { "object": "datastore-1", "counter": "disk.used.latest", "value": 42.0,
              "instances": { "lun1": 10.0, "lun2": 32.0 } },
            { "object": "datastore-1", "counter": "disk.capacity.latest", "value": 7.0 }
        ]
    }"#;

    #[tokio::test]
    async fn test_snapshot_inventory() {
        let source = SnapshotSource::from_json(SNAPSHOT).unwrap();

        let datacenters = source.list_datacenters().await.unwrap();
        assert_eq!(datacenters.len(), 1);
        assert_eq!(datacenters[0].name, "dc1");

        let datastores = source
            .list_datastores(&ObjectRef::new("datacenter-1"))
            .await
            .unwrap();
        assert_eq!(datastores[0].fs_type, "NFS");
        assert!(matches!(datastores[0].backing, DatastoreBacking::Nas { .. }));

        assert!(source
            .list_datastores(&ObjectRef::new("datacenter-9"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_snapshot_tags() {
        let source = SnapshotSource::from_json(SNAPSHOT).unwrap();
        let tags = source.snapshot_tags().await.unwrap();
        assert_eq!(
            tags[&ObjectRef::new("datastore-1")],
            vec![Tag::new("env", "prod")]
        );

        let untagged = SnapshotSource::new(InventorySnapshot::default());
        assert!(untagged.snapshot_tags().await.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_query_scope_and_limits() {
        let source = SnapshotSource::from_json(SNAPSHOT)
            .unwrap()
            .with_query_limits(BatchLimits::new(1, 1).unwrap());

        let samples = source
            .query(
                &[ObjectRef::new("datastore-1")],
                &[Counter::new("disk.used.latest")],
            )
            .await
            .unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].instances["lun1"], 10.0);

        let too_big = source
            .query(
                &[ObjectRef::new("datastore-1")],
                &[
                    Counter::new("disk.used.latest"),
                    Counter::new("disk.capacity.latest"),
                ],
            )
            .await;
        assert!(too_big.is_err());
    }

    #[test]
    fn test_from_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("inventory.json");
        fs::write(&path, SNAPSHOT).unwrap();

        let source = SnapshotSource::from_path(&path).unwrap();
        assert_eq!(source.snapshot().performance.len(), 2);

        assert!(matches!(
            SnapshotSource::from_path(&dir.path().join("missing.json")),
            Err(AgentError::Snapshot { .. })
        ));

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            SnapshotSource::from_path(&path),
            Err(AgentError::SnapshotFormat(_))
        ));
    }
}
