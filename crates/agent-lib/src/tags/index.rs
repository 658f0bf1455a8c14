//! Frozen per-cycle index of tag attachments

use super::{TagService, TagSnapshot};
use crate::error::Result;
use crate::models::{ObjectRef, Tag};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Separator used when several tags of one category are attached to an object
const CATEGORY_VALUE_SEPARATOR: &str = "|";

/// Map of object reference to the set of tags attached to it
#[derive(Debug, Clone, Default)]
pub struct TagIndex {
    tags: HashMap<ObjectRef, BTreeSet<Tag>>,
}

impl TagIndex {
    /// Create an index with no tags
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the index from the tag service
    pub async fn load(service: &dyn TagService) -> Result<Self> {
        let snapshot = service.snapshot_tags().await?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Build the index from an already retrieved snapshot
    pub fn from_snapshot(snapshot: TagSnapshot) -> Self {
        let mut tags: HashMap<ObjectRef, BTreeSet<Tag>> = HashMap::with_capacity(snapshot.len());

        for (object, attached) in snapshot {
            tags.entry(object).or_default().extend(attached);
        }

        debug!(objects = tags.len(), "Loaded tag index");
        Self { tags }
    }

    /// Tags attached to an object; empty for unknown references
    pub fn tags_for(&self, object: &ObjectRef) -> impl Iterator<Item = &Tag> {
        self.tags.get(object).into_iter().flatten()
    }

    /// True if any tag of `object` equals any of `pairs`
    pub fn matches_any(&self, object: &ObjectRef, pairs: &[Tag]) -> bool {
        match self.tags.get(object) {
            Some(attached) => pairs.iter().any(|pair| attached.contains(pair)),
            None => false,
        }
    }

    /// Tags grouped by category, with multiple values joined by `|`
    pub fn tags_by_category(&self, object: &ObjectRef) -> BTreeMap<String, String> {
        let mut grouped: BTreeMap<String, Vec<&str>> = BTreeMap::new();
        for tag in self.tags_for(object) {
            grouped
                .entry(tag.category.clone())
                .or_default()
                .push(&tag.value);
        }

        grouped
            .into_iter()
            .map(|(category, values)| (category, values.join(CATEGORY_VALUE_SEPARATOR)))
            .collect()
    }

    /// Number of objects with at least one tag
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use async_trait::async_trait;

    fn snapshot() -> TagSnapshot {
        let mut snapshot = TagSnapshot::new();
        snapshot.insert(
            ObjectRef::new("datastore-1"),
            vec![Tag::new("env", "prod"), Tag::new("team", "storage")],
        );
        snapshot.insert(
            ObjectRef::new("datastore-2"),
            vec![Tag::new("env", "dev"), Tag::new("env", "qa")],
        );
        snapshot
    }

    struct FailingTagService;

    #[async_trait]
    impl TagService for FailingTagService {
        async fn snapshot_tags(&self) -> Result<TagSnapshot> {
            Err(AgentError::service_unavailable("tag", "connection refused"))
        }
    }

    #[test]
    fn test_tags_for_unknown_reference_is_empty() {
        let index = TagIndex::from_snapshot(snapshot());
        assert_eq!(index.tags_for(&ObjectRef::new("datastore-9")).count(), 0);
        assert_eq!(index.tags_for(&ObjectRef::new("datastore-1")).count(), 2);
    }

    #[test]
    fn test_matches_any() {
        let index = TagIndex::from_snapshot(snapshot());
        let pairs = vec![Tag::new("env", "prod"), Tag::new("dc", "eu")];

        assert!(index.matches_any(&ObjectRef::new("datastore-1"), &pairs));
        assert!(!index.matches_any(&ObjectRef::new("datastore-2"), &pairs));
        assert!(!index.matches_any(&ObjectRef::new("datastore-9"), &pairs));
        assert!(!index.matches_any(&ObjectRef::new("datastore-1"), &[]));
    }

    #[test]
    fn test_tags_by_category_joins_values() {
        let index = TagIndex::from_snapshot(snapshot());
        let grouped = index.tags_by_category(&ObjectRef::new("datastore-2"));

        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped["env"], "dev|qa");
    }

    #[test]
    fn test_duplicate_attachments_collapse() {
        let mut snapshot = TagSnapshot::new();
        snapshot.insert(
            ObjectRef::new("datastore-1"),
            vec![Tag::new("env", "prod"), Tag::new("env", "prod")],
        );
        let index = TagIndex::from_snapshot(snapshot);
        assert_eq!(index.tags_for(&ObjectRef::new("datastore-1")).count(), 1);
    }

    #[tokio::test]
    async fn test_load_propagates_service_error() {
        let result = TagIndex::load(&FailingTagService).await;
        assert!(matches!(
            result,
            Err(AgentError::ServiceUnavailable { .. })
        ));
    }
}
