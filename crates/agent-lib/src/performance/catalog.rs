//! Catalog of performance counters requested per object kind
//!
//! A catalog file maps object kinds to counter levels, e.g. in TOML:
//!
//! ```toml
//! [datastore]
//! level1 = ["disk.used.latest", "disk.capacity.latest"]
//! level2 = ["datastore.numberReadAveraged.average"]
//! ```
//!
//! Counters up to the configured level are requested.

use crate::models::{Counter, ObjectKind};
use crate::settings::AgentSettings;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{info, warn};

const LEVEL_PREFIX: &str = "level";

/// Built-in datastore counters, by level
const DEFAULT_DATASTORE_COUNTERS: &[(u8, &str)] = &[
    (1, "disk.capacity.latest"),
    (1, "disk.provisioned.latest"),
    (1, "disk.used.latest"),
    (2, "datastore.numberReadAveraged.average"),
    (2, "datastore.numberWriteAveraged.average"),
    (3, "datastore.read.average"),
    (3, "datastore.write.average"),
];

/// Counters to request for each object kind, grouped by level
#[derive(Debug, Clone, Default)]
pub struct CounterCatalog {
    counters: HashMap<ObjectKind, BTreeMap<u8, Vec<Counter>>>,
}

impl CounterCatalog {
    /// Catalog shipped with the agent
    pub fn builtin() -> Self {
        let mut catalog = Self::default();
        for (level, name) in DEFAULT_DATASTORE_COUNTERS {
            catalog.add(ObjectKind::Datastore, *level, Counter::new(*name));
        }
        catalog
    }

    /// Load a catalog file; the format follows the file extension
    pub fn load(path: &Path) -> Result<Self> {
        let raw: HashMap<String, HashMap<String, Vec<String>>> = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .with_context(|| format!("Failed to read counter catalog {}", path.display()))?
            .try_deserialize()
            .with_context(|| format!("Invalid counter catalog {}", path.display()))?;

        let mut catalog = Self::default();
        for (kind_key, levels) in raw {
            let Some(kind) = parse_kind(&kind_key) else {
                warn!(kind = %kind_key, "Ignoring unknown object kind in counter catalog");
                continue;
            };

            // lowest level wins when a counter is listed twice
            let mut by_level: BTreeMap<u8, Vec<String>> = BTreeMap::new();
            for (level_key, names) in levels {
                let Some(level) = parse_level(&level_key) else {
                    warn!(kind = %kind_key, level = %level_key, "Ignoring invalid counter level");
                    continue;
                };
                by_level.entry(level).or_default().extend(names);
            }

            for (level, names) in by_level {
                for name in names {
                    catalog.add(kind, level, Counter::new(name));
                }
            }
        }

        info!(path = %path.display(), counters = catalog.len(), "Loaded counter catalog");
        Ok(catalog)
    }

    /// Catalog from `perf_metric_file`, or the built-in one
    pub fn from_settings(settings: &AgentSettings) -> Result<Self> {
        match &settings.perf_metric_file {
            Some(path) => Self::load(path),
            None => Ok(Self::builtin()),
        }
    }

    fn add(&mut self, kind: ObjectKind, level: u8, counter: Counter) {
        let levels = self.counters.entry(kind).or_default();
        if levels.values().flatten().any(|c| c == &counter) {
            return;
        }
        levels.entry(level).or_default().push(counter);
    }

    /// Counters for `kind` with level at most `max_level`, lowest level first
    pub fn counters(&self, kind: ObjectKind, max_level: u8) -> Vec<Counter> {
        self.counters
            .get(&kind)
            .map(|levels| {
                levels
                    .range(..=max_level)
                    .flat_map(|(_, counters)| counters.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total number of counters across kinds and levels
    pub fn len(&self) -> usize {
        self.counters
            .values()
            .flat_map(|levels| levels.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse_kind(key: &str) -> Option<ObjectKind> {
    [
        ObjectKind::Datacenter,
        ObjectKind::Host,
        ObjectKind::Vm,
        ObjectKind::Datastore,
        ObjectKind::Cluster,
        ObjectKind::ResourcePool,
    ]
    .into_iter()
    .find(|kind| kind.catalog_key().eq_ignore_ascii_case(key))
}

fn parse_level(key: &str) -> Option<u8> {
    let digits = key.to_ascii_lowercase();
    digits.strip_prefix(LEVEL_PREFIX)?.parse().ok()
}
