//! Core data models for the vSphere agent

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque, stable reference to one inventory object (e.g. `datastore-42`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectRef(String);

impl ObjectRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Kinds of inventory objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Datacenter,
    Host,
    Vm,
    Datastore,
    Cluster,
    ResourcePool,
}

impl ObjectKind {
    /// Key used for this kind in counter catalogs
    pub fn catalog_key(&self) -> &'static str {
        match self {
            ObjectKind::Datacenter => "datacenter",
            ObjectKind::Host => "host",
            ObjectKind::Vm => "vm",
            ObjectKind::Datastore => "datastore",
            ObjectKind::Cluster => "cluster",
            ObjectKind::ResourcePool => "resource_pool",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Datacenter => write!(f, "Datacenter"),
            ObjectKind::Host => write!(f, "Host"),
            ObjectKind::Vm => write!(f, "Vm"),
            ObjectKind::Datastore => write!(f, "Datastore"),
            ObjectKind::Cluster => write!(f, "Cluster"),
            ObjectKind::ResourcePool => write!(f, "ResourcePool"),
        }
    }
}

/// A (category, value) tag attached to an inventory object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub category: String,
    pub value: String,
}

impl Tag {
    pub fn new(category: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            value: value.into(),
        }
    }
}

/// Named performance counter, e.g. `disk.used.latest`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Counter(String);

impl Counter {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Counter {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One performance sample returned by the performance service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfSample {
    pub object: ObjectRef,
    pub counter: Counter,
    /// Aggregate value; `None` when the service only reported instances
    #[serde(default)]
    pub value: Option<f64>,
    /// Per-instance values keyed by vendor instance key (LUN, NIC, ...)
    #[serde(default)]
    pub instances: BTreeMap<String, f64>,
}

impl PerfSample {
    pub fn aggregate(object: ObjectRef, counter: Counter, value: f64) -> Self {
        Self {
            object,
            counter,
            value: Some(value),
            instances: BTreeMap::new(),
        }
    }
}

/// Overall status reported by the inventory for a managed entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ManagedEntityStatus {
    Green,
    Yellow,
    Red,
    #[default]
    Gray,
}

impl fmt::Display for ManagedEntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagedEntityStatus::Green => write!(f, "green"),
            ManagedEntityStatus::Yellow => write!(f, "yellow"),
            ManagedEntityStatus::Red => write!(f, "red"),
            ManagedEntityStatus::Gray => write!(f, "gray"),
        }
    }
}

/// Datacenter as listed by the inventory source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datacenter {
    #[serde(rename = "ref")]
    pub reference: ObjectRef,
    pub name: String,
}

/// Storage backing of a datastore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatastoreBacking {
    Vmfs,
    Nas {
        remote_host: String,
        remote_path: String,
    },
    Vsan,
    Vvol,
    #[default]
    Other,
}

impl DatastoreBacking {
    /// Attributes specific to this backing kind
    pub fn attributes(&self) -> Vec<(&'static str, String)> {
        match self {
            DatastoreBacking::Nas {
                remote_host,
                remote_path,
            } => vec![
                ("nas.remoteHost", remote_host.clone()),
                ("nas.remotePath", remote_path.clone()),
            ],
            DatastoreBacking::Vmfs
            | DatastoreBacking::Vsan
            | DatastoreBacking::Vvol
            | DatastoreBacking::Other => Vec::new(),
        }
    }
}

/// Datastore summary as listed by the inventory source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datastore {
    #[serde(rename = "ref")]
    pub reference: ObjectRef,
    pub name: String,
    /// File system type (VMFS, NFS, vsan, ...)
    #[serde(rename = "type", default)]
    pub fs_type: String,
    pub url: String,
    #[serde(default)]
    pub overall_status: ManagedEntityStatus,
    #[serde(default)]
    pub accessible: bool,
    #[serde(default)]
    pub capacity_bytes: u64,
    #[serde(default)]
    pub free_space_bytes: u64,
    #[serde(default)]
    pub uncommitted_bytes: u64,
    #[serde(default)]
    pub vms: Vec<ObjectRef>,
    #[serde(default)]
    pub hosts: Vec<ObjectRef>,
    #[serde(default)]
    pub backing: DatastoreBacking,
}
