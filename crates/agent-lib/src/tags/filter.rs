//! Tag-based inclusion filter

use super::TagIndex;
use crate::models::{ObjectRef, Tag};
use crate::settings::AgentSettings;
use tracing::warn;

/// Allow-list of `category=value` pairs. An object passes if it carries at
/// least one of the pairs, or if the filter is disabled.
#[derive(Debug, Clone, Default)]
pub struct InclusionFilter {
    pairs: Vec<Tag>,
    tag_collection_enabled: bool,
}

impl InclusionFilter {
    /// Parse a space-separated list such as `env=prod dc=eu`.
    /// Malformed entries are skipped with a warning.
    pub fn new(include_tags: &str, tag_collection_enabled: bool) -> Self {
        let mut pairs: Vec<Tag> = Vec::new();

        for entry in include_tags.split_whitespace() {
            match parse_pair(entry) {
                Some(tag) => {
                    if !pairs.contains(&tag) {
                        pairs.push(tag);
                    }
                }
                None => {
                    warn!(entry = %entry, "Ignoring malformed include_tags entry, expected category=value");
                }
            }
        }

        if !pairs.is_empty() && !tag_collection_enabled {
            warn!("include_tags is set but tag collection is disabled, filter will not be applied");
        }

        Self {
            pairs,
            tag_collection_enabled,
        }
    }

    pub fn from_settings(settings: &AgentSettings) -> Self {
        Self::new(&settings.include_tags, settings.tag_collection_enabled())
    }

    /// A filter that lets everything through
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn enabled(&self) -> bool {
        self.tag_collection_enabled && !self.pairs.is_empty()
    }

    /// Parsed pairs, in configuration order
    pub fn pairs(&self) -> &[Tag] {
        &self.pairs
    }

    pub fn allows(&self, object: &ObjectRef, index: &TagIndex) -> bool {
        if !self.enabled() {
            return true;
        }
        index.matches_any(object, &self.pairs)
    }
}

fn parse_pair(entry: &str) -> Option<Tag> {
    let mut parts = entry.split('=');
    let category = parts.next()?.trim();
    let value = parts.next()?.trim();

    if parts.next().is_some() || category.is_empty() || value.is_empty() {
        return None;
    }

    Some(Tag::new(category, value))
}
