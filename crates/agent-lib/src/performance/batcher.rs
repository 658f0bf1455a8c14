//! Bounded batching of performance queries
//!
//! Objects and counters are cut into consecutive chunks and every
//! (object chunk, counter chunk) pair becomes one query, so E objects and C
//! counters cost `ceil(E/m) * ceil(C/n)` queries. Each pair of the Cartesian
//! product is covered by exactly one query, which makes the merge a disjoint
//! union.

use super::PerformanceService;
use crate::error::{AgentError, Result};
use crate::models::{Counter, ObjectRef, PerfSample};
use crate::observability::AgentMetrics;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Upper bounds on one performance query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    max_entities: usize,
    max_counters: usize,
}

impl BatchLimits {
    /// Both limits must be at least 1
    pub fn new(max_entities: i64, max_counters: i64) -> Result<Self> {
        if max_entities < 1 {
            return Err(AgentError::invalid_config(format!(
                "batch_size_perf_entities must be at least 1, got {}",
                max_entities
            )));
        }
        if max_counters < 1 {
            return Err(AgentError::invalid_config(format!(
                "batch_size_perf_metrics must be at least 1, got {}",
                max_counters
            )));
        }

        Ok(Self {
            max_entities: max_entities as usize,
            max_counters: max_counters as usize,
        })
    }

    pub fn max_entities(&self) -> usize {
        self.max_entities
    }

    pub fn max_counters(&self) -> usize {
        self.max_counters
    }

    /// Number of queries needed for `objects` x `counters`
    pub fn query_count(&self, objects: usize, counters: usize) -> usize {
        objects.div_ceil(self.max_entities) * counters.div_ceil(self.max_counters)
    }
}

/// Why a chunk produced no data
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChunkError {
    #[error("query cancelled")]
    Cancelled,

    #[error("{0}")]
    Service(String),

    #[error("query task aborted")]
    Aborted,
}

/// A chunk whose query did not complete
#[derive(Debug, Clone)]
pub struct ChunkFailure {
    pub entity_chunk: usize,
    pub counter_chunk: usize,
    pub objects: Vec<ObjectRef>,
    pub counters: usize,
    pub error: ChunkError,
}

/// Merged performance samples, grouped by object
#[derive(Debug, Clone, Default)]
pub struct PerfTable {
    samples: HashMap<ObjectRef, Vec<PerfSample>>,
}

impl PerfTable {
    /// Samples for one object, empty if none were returned
    pub fn get(&self, object: &ObjectRef) -> &[PerfSample] {
        self.samples
            .get(object)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn sample(&self, object: &ObjectRef, counter: &Counter) -> Option<&PerfSample> {
        self.get(object).iter().find(|s| &s.counter == counter)
    }

    /// Number of (object, counter) entries
    pub fn len(&self) -> usize {
        self.samples.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of objects with at least one sample
    pub fn objects(&self) -> usize {
        self.samples.len()
    }

    /// Insert a sample, returning false if the pair is already present
    fn insert(&mut self, sample: PerfSample) -> bool {
        let entries = self.samples.entry(sample.object.clone()).or_default();
        if entries.iter().any(|s| s.counter == sample.counter) {
            return false;
        }
        entries.push(sample);
        true
    }
}

/// Result of one batched collection
#[derive(Debug, Default)]
pub struct PerfOutcome {
    pub table: PerfTable,
    /// Number of queries issued
    pub queries: usize,
    pub failures: Vec<ChunkFailure>,
}

impl PerfOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Error when every query failed at the service, meaning the
    /// performance service could not be reached at all. Cancelled or
    /// aborted chunks never count as unreachable.
    pub fn unreachable(&self) -> Option<AgentError> {
        if self.queries == 0 || self.failures.len() < self.queries {
            return None;
        }

        let mut reasons = self.failures.iter().map(|f| match &f.error {
            ChunkError::Service(reason) => Some(reason.as_str()),
            ChunkError::Cancelled | ChunkError::Aborted => None,
        });
        let first = reasons.next().flatten()?;
        if reasons.any(|r| r.is_none()) {
            return None;
        }

        Some(AgentError::service_unavailable(
            "performance",
            format!("all {} queries failed, first error: {}", self.queries, first),
        ))
    }

    /// Aggregated non-fatal warning describing the failed chunks
    pub fn warning(&self) -> Option<AgentError> {
        if self.failures.is_empty() {
            return None;
        }

        let chunks = self
            .failures
            .iter()
            .map(|f| {
                format!(
                    "entities[{}] x counters[{}]: {}",
                    f.entity_chunk, f.counter_chunk, f.error
                )
            })
            .collect::<Vec<_>>()
            .join("; ");

        Some(AgentError::PartialPerformanceData {
            failed: self.failures.len(),
            total: self.queries,
            chunks,
        })
    }
}

/// One (object chunk, counter chunk) query
struct ChunkQuery {
    entity_chunk: usize,
    counter_chunk: usize,
    objects: Vec<ObjectRef>,
    counters: Vec<Counter>,
}

impl ChunkQuery {
    fn failed(&self, error: ChunkError) -> ChunkFailure {
        ChunkFailure {
            entity_chunk: self.entity_chunk,
            counter_chunk: self.counter_chunk,
            objects: self.objects.clone(),
            counters: self.counters.len(),
            error,
        }
    }
}

/// Splits performance requests into bounded queries and merges the results
pub struct PerfBatcher {
    service: Arc<dyn PerformanceService>,
    limits: BatchLimits,
    workers: usize,
    metrics: AgentMetrics,
}

impl PerfBatcher {
    /// Create a batcher running at most `workers` queries at once
    pub fn new(service: Arc<dyn PerformanceService>, limits: BatchLimits, workers: usize) -> Self {
        Self {
            service,
            limits,
            workers: workers.max(1),
            metrics: AgentMetrics::new(),
        }
    }

    pub fn limits(&self) -> BatchLimits {
        self.limits
    }

    /// Fetch `counters` for `objects`.
    ///
    /// Failed or cancelled chunks are reported in the outcome; data from the
    /// chunks that completed is always kept.
    pub async fn get_metrics(
        &self,
        objects: &[ObjectRef],
        counters: &[Counter],
        cancel: &CancellationToken,
    ) -> PerfOutcome {
        let mut outcome = PerfOutcome::default();
        if objects.is_empty() || counters.is_empty() {
            return outcome;
        }

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        let mut queries: Vec<ChunkQuery> = Vec::new();

        for (entity_chunk, chunk_objects) in objects.chunks(self.limits.max_entities).enumerate() {
            for (counter_chunk, chunk_counters) in
                counters.chunks(self.limits.max_counters).enumerate()
            {
                let query = ChunkQuery {
                    entity_chunk,
                    counter_chunk,
                    objects: chunk_objects.to_vec(),
                    counters: chunk_counters.to_vec(),
                };

                let index = queries.len();
                let service = Arc::clone(&self.service);
                let semaphore = Arc::clone(&semaphore);
                let cancel = cancel.clone();
                let metrics = self.metrics.clone();
                let task_objects = query.objects.clone();
                let task_counters = query.counters.clone();

                tasks.spawn(async move {
                    let result = run_query(
                        service.as_ref(),
                        &semaphore,
                        &cancel,
                        &metrics,
                        &task_objects,
                        &task_counters,
                    )
                    .await;
                    (index, result)
                });
                queries.push(query);
            }
        }
        outcome.queries = queries.len();

        debug!(
            objects = objects.len(),
            counters = counters.len(),
            queries = outcome.queries,
            "Issued batched performance queries"
        );

        let mut results: Vec<(usize, std::result::Result<Vec<PerfSample>, ChunkError>)> =
            Vec::with_capacity(queries.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!(error = %e, "Performance query task failed"),
            }
        }

        // Merge in issue order so logs and failure lists are deterministic
        results.sort_by_key(|(index, _)| *index);
        let mut finished = vec![false; queries.len()];
        for (index, result) in results {
            finished[index] = true;
            match result {
                Ok(samples) => {
                    for sample in samples {
                        let (object, counter) = (sample.object.clone(), sample.counter.clone());
                        if !outcome.table.insert(sample) {
                            debug!(object = %object, counter = %counter, "Ignoring duplicate sample");
                        }
                    }
                }
                Err(error) => outcome.failures.push(queries[index].failed(error)),
            }
        }

        // Tasks that panicked never reported back
        for (index, query) in queries.iter().enumerate() {
            if !finished[index] {
                outcome.failures.push(query.failed(ChunkError::Aborted));
            }
        }

        self.metrics.inc_perf_queries(outcome.queries as u64);
        if !outcome.failures.is_empty() {
            self.metrics
                .inc_perf_query_failures(outcome.failures.len() as u64);
            for failure in &outcome.failures {
                warn!(
                    entity_chunk = failure.entity_chunk,
                    counter_chunk = failure.counter_chunk,
                    objects = failure.objects.len(),
                    counters = failure.counters,
                    error = %failure.error,
                    "Performance query chunk failed"
                );
            }
        }

        outcome
    }
}

async fn run_query(
    service: &dyn PerformanceService,
    semaphore: &Semaphore,
    cancel: &CancellationToken,
    metrics: &AgentMetrics,
    objects: &[ObjectRef],
    counters: &[Counter],
) -> std::result::Result<Vec<PerfSample>, ChunkError> {
    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ChunkError::Cancelled),
        permit = semaphore.acquire() => permit.map_err(|_| ChunkError::Aborted)?,
    };

    let start = Instant::now();
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ChunkError::Cancelled),
        result = service.query(objects, counters) => result,
    };
    metrics.observe_perf_query_latency(start.elapsed().as_secs_f64());

    match result {
        Ok(samples) => Ok(retain_in_scope(samples, objects, counters)),
        Err(e) => Err(ChunkError::Service(e.to_string())),
    }
}

/// Drop anything the service returned outside of the requested chunk
fn retain_in_scope(
    samples: Vec<PerfSample>,
    objects: &[ObjectRef],
    counters: &[Counter],
) -> Vec<PerfSample> {
    let objects: HashSet<&ObjectRef> = objects.iter().collect();
    let counters: HashSet<&Counter> = counters.iter().collect();

    samples
        .into_iter()
        .filter(|sample| {
            let in_scope = objects.contains(&sample.object) && counters.contains(&sample.counter);
            if !in_scope {
                debug!(
                    object = %sample.object,
                    counter = %sample.counter,
                    "Dropping sample outside of the requested chunk"
                );
            }
            in_scope
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mock service that returns `value = object index * 100 + counter index`
    /// for every requested pair and records the shape of each query
    struct MockPerfService {
        limits: BatchLimits,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fail_objects: Vec<ObjectRef>,
        missing: Vec<(ObjectRef, Counter)>,
        delay: Duration,
        seen: Mutex<Vec<(ObjectRef, Counter)>>,
    }

    impl MockPerfService {
        fn new(limits: BatchLimits) -> Self {
            Self {
                limits,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                fail_objects: Vec::new(),
                missing: Vec::new(),
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn value_for(object: &ObjectRef, counter: &Counter) -> f64 {
        let o: f64 = object.as_str()[1..].parse().unwrap();
        let c: f64 = counter.as_str()[1..].parse().unwrap();
        o * 100.0 + c
    }

    #[async_trait]
    impl PerformanceService for MockPerfService {
        async fn query(
            &self,
            objects: &[ObjectRef],
            counters: &[Counter],
        ) -> Result<Vec<PerfSample>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(objects.len() <= self.limits.max_entities());
            assert!(counters.len() <= self.limits.max_counters());

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if objects.iter().any(|o| self.fail_objects.contains(o)) {
                return Err(AgentError::service_unavailable("performance", "timeout"));
            }

            let mut samples = Vec::new();
            for object in objects {
                for counter in counters {
                    let pair = (object.clone(), counter.clone());
                    if self.missing.contains(&pair) {
                        continue;
                    }
                    self.seen.lock().unwrap().push(pair);
                    samples.push(PerfSample::aggregate(
                        object.clone(),
                        counter.clone(),
                        value_for(object, counter),
                    ));
                }
            }
            Ok(samples)
        }
    }

    fn objects(n: usize) -> Vec<ObjectRef> {
        (0..n).map(|i| ObjectRef::new(format!("o{}", i))).collect()
    }

    fn counters(n: usize) -> Vec<Counter> {
        (0..n).map(|i| Counter::new(format!("c{}", i))).collect()
    }

    #[test]
    fn test_batch_limits_reject_non_positive() {
        assert!(BatchLimits::new(0, 10).is_err());
        assert!(BatchLimits::new(10, 0).is_err());
        assert!(BatchLimits::new(-1, -1).is_err());
        assert!(BatchLimits::new(1, 1).is_ok());
    }

    #[test]
    fn test_query_count() {
        let limits = BatchLimits::new(2, 2).unwrap();
        assert_eq!(limits.query_count(5, 3), 6);
        assert_eq!(limits.query_count(0, 3), 0);
        assert_eq!(limits.query_count(4, 4), 4);
    }

    #[tokio::test]
    async fn test_five_objects_three_counters() {
        let limits = BatchLimits::new(2, 2).unwrap();
        let service = Arc::new(MockPerfService::new(limits));
        let batcher = PerfBatcher::new(service.clone(), limits, 4);

        let outcome = batcher
            .get_metrics(&objects(5), &counters(3), &CancellationToken::new())
            .await;

        assert_eq!(outcome.queries, 6);
        assert_eq!(service.calls(), 6);
        assert_eq!(outcome.table.len(), 15);
        assert!(outcome.is_complete());
        assert!(outcome.warning().is_none());

        let sample = outcome
            .table
            .sample(&ObjectRef::new("o3"), &Counter::new("c2"))
            .unwrap();
        assert_eq!(sample.value, Some(302.0));
    }

    #[tokio::test]
    async fn test_query_count_and_coverage_across_limits() {
        for (m, n) in [(1, 1), (1, 3), (2, 5), (3, 2), (7, 7), (50, 50)] {
            for (e, c) in [(1, 1), (4, 3), (7, 5), (10, 1)] {
                let limits = BatchLimits::new(m, n).unwrap();
                let service = Arc::new(MockPerfService::new(limits));
                let batcher = PerfBatcher::new(service.clone(), limits, 3);
                let objects = objects(e);
                let counters = counters(c);

                let outcome = batcher
                    .get_metrics(&objects, &counters, &CancellationToken::new())
                    .await;

                let expected_queries = e.div_ceil(m as usize) * c.div_ceil(n as usize);
                assert_eq!(outcome.queries, expected_queries, "m={} n={} e={} c={}", m, n, e, c);
                assert_eq!(service.calls(), expected_queries);
                assert_eq!(outcome.table.len(), e * c);

                // every pair was requested exactly once
                let seen = service.seen.lock().unwrap();
                let unique: HashSet<_> = seen.iter().collect();
                assert_eq!(unique.len(), seen.len());
                assert_eq!(seen.len(), e * c);
            }
        }
    }

    #[tokio::test]
    async fn test_missing_pairs_are_absent_not_zero() {
        let limits = BatchLimits::new(2, 2).unwrap();
        let mut service = MockPerfService::new(limits);
        service.missing = vec![(ObjectRef::new("o0"), Counter::new("c1"))];
        let batcher = PerfBatcher::new(Arc::new(service), limits, 2);

        let outcome = batcher
            .get_metrics(&objects(2), &counters(2), &CancellationToken::new())
            .await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.table.len(), 3);
        assert!(outcome
            .table
            .sample(&ObjectRef::new("o0"), &Counter::new("c1"))
            .is_none());
        // o0/c0 is a genuine zero
        assert_eq!(
            outcome
                .table
                .sample(&ObjectRef::new("o0"), &Counter::new("c0"))
                .unwrap()
                .value,
            Some(0.0)
        );
    }

    #[tokio::test]
    async fn test_failing_chunk_does_not_hide_other_chunks() {
        let limits = BatchLimits::new(2, 2).unwrap();
        let mut service = MockPerfService::new(limits);
        service.fail_objects = vec![ObjectRef::new("o2")];
        let batcher = PerfBatcher::new(Arc::new(service), limits, 2);

        let outcome = batcher
            .get_metrics(&objects(5), &counters(3), &CancellationToken::new())
            .await;

        assert_eq!(outcome.queries, 6);
        // o2 and o3 share an entity chunk, which spans two counter chunks
        assert_eq!(outcome.failures.len(), 2);
        assert!(outcome.failures.iter().all(|f| f.entity_chunk == 1));
        assert_eq!(outcome.table.len(), 9);
        assert!(outcome.table.get(&ObjectRef::new("o2")).is_empty());
        assert_eq!(outcome.table.get(&ObjectRef::new("o4")).len(), 3);

        match outcome.warning() {
            Some(AgentError::PartialPerformanceData { failed, total, .. }) => {
                assert_eq!(failed, 2);
                assert_eq!(total, 6);
            }
            other => panic!("unexpected warning: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_worker_pool_bounds_concurrency() {
        let limits = BatchLimits::new(1, 1).unwrap();
        let mut service = MockPerfService::new(limits);
        service.delay = Duration::from_millis(10);
        let service = Arc::new(service);
        let batcher = PerfBatcher::new(service.clone(), limits, 2);

        let outcome = batcher
            .get_metrics(&objects(4), &counters(2), &CancellationToken::new())
            .await;

        assert_eq!(outcome.queries, 8);
        assert!(service.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_cancelled_queries_keep_completed_chunks() {
        struct SlowSecondChunk;

        #[async_trait]
        impl PerformanceService for SlowSecondChunk {
            async fn query(
                &self,
                objects: &[ObjectRef],
                counters: &[Counter],
            ) -> Result<Vec<PerfSample>> {
                if objects[0].as_str() == "o1" {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                Ok(objects
                    .iter()
                    .flat_map(|o| {
                        counters
                            .iter()
                            .map(move |c| PerfSample::aggregate(o.clone(), c.clone(), 1.0))
                    })
                    .collect())
            }
        }

        let limits = BatchLimits::new(1, 5).unwrap();
        let batcher = PerfBatcher::new(Arc::new(SlowSecondChunk), limits, 2);
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            })
        };

        let outcome = batcher
            .get_metrics(&objects(2), &counters(2), &cancel)
            .await;
        canceller.await.unwrap();

        assert_eq!(outcome.queries, 2);
        assert_eq!(outcome.table.get(&ObjectRef::new("o0")).len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].error, ChunkError::Cancelled);
    }

    #[tokio::test]
    async fn test_out_of_scope_and_duplicate_samples_are_dropped() {
        struct Chatty;

        #[async_trait]
        impl PerformanceService for Chatty {
            async fn query(
                &self,
                objects: &[ObjectRef],
                counters: &[Counter],
            ) -> Result<Vec<PerfSample>> {
                let mut samples = vec![PerfSample::aggregate(
                    ObjectRef::new("stranger"),
                    counters[0].clone(),
                    9.0,
                )];
                for object in objects {
                    samples.push(PerfSample::aggregate(object.clone(), counters[0].clone(), 1.0));
                    samples.push(PerfSample::aggregate(object.clone(), counters[0].clone(), 2.0));
                }
                Ok(samples)
            }
        }

        let limits = BatchLimits::new(10, 10).unwrap();
        let batcher = PerfBatcher::new(Arc::new(Chatty), limits, 1);
        let outcome = batcher
            .get_metrics(&objects(2), &counters(1), &CancellationToken::new())
            .await;

        assert_eq!(outcome.table.len(), 2);
        assert!(outcome.table.get(&ObjectRef::new("stranger")).is_empty());
        assert_eq!(
            outcome
                .table
                .sample(&ObjectRef::new("o1"), &Counter::new("c0"))
                .unwrap()
                .value,
            Some(1.0)
        );
    }

    #[tokio::test]
    async fn test_instance_values_survive_merge() {
        struct Instanced;

        #[async_trait]
        impl PerformanceService for Instanced {
            async fn query(
                &self,
                objects: &[ObjectRef],
                counters: &[Counter],
            ) -> Result<Vec<PerfSample>> {
                let mut instances = BTreeMap::new();
                instances.insert("lun1".to_string(), 10.0);
                instances.insert("lun2".to_string(), 32.0);
                Ok(vec![PerfSample {
                    object: objects[0].clone(),
                    counter: counters[0].clone(),
                    value: Some(42.0),
                    instances,
                }])
            }
        }

        let limits = BatchLimits::new(1, 1).unwrap();
        let batcher = PerfBatcher::new(Arc::new(Instanced), limits, 1);
        let outcome = batcher
            .get_metrics(&objects(1), &counters(1), &CancellationToken::new())
            .await;

        let sample = outcome
            .table
            .sample(&ObjectRef::new("o0"), &Counter::new("c0"))
            .unwrap();
        assert_eq!(sample.value, Some(42.0));
        assert_eq!(sample.instances["lun2"], 32.0);
    }

    #[tokio::test]
    async fn test_empty_request_issues_no_queries() {
        let limits = BatchLimits::new(2, 2).unwrap();
        let service = Arc::new(MockPerfService::new(limits));
        let batcher = PerfBatcher::new(service.clone(), limits, 2);

        let outcome = batcher
            .get_metrics(&[], &counters(3), &CancellationToken::new())
            .await;

        assert_eq!(outcome.queries, 0);
        assert_eq!(service.calls(), 0);
        assert!(outcome.table.is_empty());
    }

    #[tokio::test]
    async fn test_stays_pending_until_cancelled() {
        let limits = BatchLimits::new(1, 1).unwrap();
        let mut service = MockPerfService::new(limits);
        service.delay = Duration::from_secs(30);
        let batcher = PerfBatcher::new(Arc::new(service), limits, 1);
        let cancel = CancellationToken::new();
        let (objects, counters) = (objects(2), counters(1));

        let mut task = tokio_test::task::spawn(batcher.get_metrics(&objects, &counters, &cancel));
        tokio_test::assert_pending!(task.poll());

        cancel.cancel();
        let outcome = loop {
            if let std::task::Poll::Ready(outcome) = task.poll() {
                break outcome;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };

        assert_eq!(outcome.queries, 2);
        assert!(outcome.table.is_empty());
        assert!(outcome
            .failures
            .iter()
            .all(|f| f.error == ChunkError::Cancelled));
    }

    #[tokio::test]
    async fn test_every_chunk_failing_means_unreachable() {
        let limits = BatchLimits::new(2, 2).unwrap();
        let mut service = MockPerfService::new(limits);
        service.fail_objects = objects(4);
        let batcher = PerfBatcher::new(Arc::new(service), limits, 2);

        let outcome = batcher
            .get_metrics(&objects(4), &counters(2), &CancellationToken::new())
            .await;

        assert_eq!(outcome.failures.len(), 2);
        assert!(matches!(
            outcome.unreachable(),
            Some(AgentError::ServiceUnavailable { ref service, .. }) if service == "performance"
        ));
    }

    #[tokio::test]
    async fn test_partial_or_cancelled_failures_are_not_unreachable() {
        let limits = BatchLimits::new(2, 2).unwrap();
        let mut service = MockPerfService::new(limits);
        service.fail_objects = vec![ObjectRef::new("o0")];
        let batcher = PerfBatcher::new(Arc::new(service), limits, 2);

        let partial = batcher
            .get_metrics(&objects(4), &counters(2), &CancellationToken::new())
            .await;
        assert_eq!(partial.failures.len(), 1);
        assert!(partial.unreachable().is_none());
        assert!(partial.warning().is_some());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let cancelled = batcher.get_metrics(&objects(4), &counters(2), &cancel).await;
        assert_eq!(cancelled.failures.len(), cancelled.queries);
        assert!(cancelled.unreachable().is_none());
    }
}
