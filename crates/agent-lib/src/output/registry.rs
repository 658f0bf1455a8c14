//! Per-cycle entity table
//!
//! Every entity is keyed by `(kind, stable id)`. Creation goes through the
//! map's entry API, which holds the shard lock for that key, so concurrent
//! lookups of the same key always end up with the same entity.

use super::entity::{Entity, EntityKey, EntityKind};
use crate::error::{AgentError, Result};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Entities created during one collection cycle
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: DashMap<EntityKey, Arc<Entity>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the entity for `(kind, id)`, creating it on first use.
    /// Names and ids must not be empty.
    pub fn get_or_create(&self, kind: EntityKind, name: &str, id: &str) -> Result<Arc<Entity>> {
        if name.trim().is_empty() {
            return Err(AgentError::EntityCreation {
                kind: kind.to_string(),
                id: id.to_string(),
                reason: "entity name is empty".to_string(),
            });
        }
        if id.trim().is_empty() {
            return Err(AgentError::EntityCreation {
                kind: kind.to_string(),
                id: id.to_string(),
                reason: "entity id is empty".to_string(),
            });
        }

        let key = EntityKey {
            kind,
            id: id.to_string(),
        };

        let entity = self
            .entities
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(kind = %kind, id = %id, name = %name, "Creating entity");
                Arc::new(Entity::new(key, name))
            })
            .clone();

        if entity.name() != name {
            debug!(
                kind = %kind,
                id = %id,
                existing = %entity.name(),
                requested = %name,
                "Entity already exists under another name, reusing it"
            );
        }

        Ok(entity)
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> Option<Arc<Entity>> {
        let key = EntityKey {
            kind,
            id: id.to_string(),
        };
        self.entities.get(&key).map(|entry| Arc::clone(entry.value()))
    }

    /// All entities ordered by kind and id
    pub fn entities(&self) -> Vec<Arc<Entity>> {
        let mut entities: Vec<Arc<Entity>> = self
            .entities
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        entities.sort_by(|a, b| a.key().cmp(b.key()));
        entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
