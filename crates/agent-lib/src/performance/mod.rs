//! Performance counter collection
//!
//! The performance service caps how many objects and how many counters one
//! query may name. The batcher splits requests into bounded chunks, runs them
//! on a small worker pool and merges the results back into one table keyed
//! by object and counter.

mod batcher;
mod catalog;

pub use batcher::{BatchLimits, ChunkError, ChunkFailure, PerfBatcher, PerfOutcome, PerfTable};
pub use catalog::CounterCatalog;

use crate::error::Result;
use crate::models::{Counter, ObjectRef, PerfSample};
use async_trait::async_trait;

/// Vendor performance API
#[async_trait]
pub trait PerformanceService: Send + Sync {
    /// Query the latest samples of `counters` for `objects`.
    /// Pairs without data are simply missing from the result.
    async fn query(&self, objects: &[ObjectRef], counters: &[Counter]) -> Result<Vec<PerfSample>>;
}
