//! Tag collection and tag-based inclusion filtering
//!
//! The tag index is loaded once per collection cycle from a snapshot of the
//! tag service and is read-only afterwards. The inclusion filter decides,
//! from that index, which objects are allowed into the output.

mod filter;
mod index;

pub use filter::InclusionFilter;
pub use index::TagIndex;

use crate::error::Result;
use crate::models::{ObjectRef, Tag};
use async_trait::async_trait;
use std::collections::HashMap;

/// Tag service snapshot: object reference to attached tags
pub type TagSnapshot = HashMap<ObjectRef, Vec<Tag>>;

/// Source of tag assignments
#[async_trait]
pub trait TagService: Send + Sync {
    /// Take a snapshot of every tag attachment visible to the session
    async fn snapshot_tags(&self) -> Result<TagSnapshot>;
}
