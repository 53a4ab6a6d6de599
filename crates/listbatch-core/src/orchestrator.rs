//! Batch orchestrator
//!
//! Owns the build state for one batch cycle:
//! - Hands out per-collection queues that append to one ordered list
//! - Partitions the list into chunks bounded by the configured size
//! - Runs chunks one after another or all at once
//! - Aggregates chunk reports into a `BatchSummary`
//!
//! # Single use per batch cycle
//!
//! `execute` takes `&mut self`, so queues cannot be held across it and two
//! executions of one instance cannot overlap:
//!
//! ```rust,compile_fail
//! use listbatch_core::BatchOrchestrator;
//!
//! async fn misuse(orchestrator: &mut BatchOrchestrator) {
//!     let mut tasks = orchestrator.for_collection("Tasks");
//!     let running = orchestrator.execute();
//!     tasks.add(serde_json::json!({ "Title": "late" }));
//!     let _ = running.await;
//! }
//! ```
//!
//! Build a fresh orchestrator per batch when batches must run concurrently.

use crate::aggregator::aggregate;
use crate::backend::BatchBackend;
use crate::chunk::{partition, ChunkExecutor, ChunkReport, ChunkRunner};
use crate::config::EngineConfig;
use crate::error::BatchError;
use crate::operation::{Operation, OperationBody};
use crate::outcome::BatchSummary;
use crate::queue::OperationQueue;
use crate::retry::RetryingChunkRunner;
use crate::types::OperationId;
use futures::future::join_all;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Default)]
struct BuildState {
    operations: Vec<Operation>,
    sequence: u64,
}

/// Accumulates operations and executes them as chunked batches
pub struct BatchOrchestrator {
    config: EngineConfig,
    backend: Arc<dyn BatchBackend>,
    state: Mutex<BuildState>,
}

impl fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("config", &self.config)
            .field("pending", &self.state.lock().operations.len())
            .finish_non_exhaustive()
    }
}

impl BatchOrchestrator {
    /// Create an orchestrator with default configuration
    #[inline]
    #[must_use]
    pub fn new(backend: Arc<dyn BatchBackend>) -> Self {
        Self::with_config(backend, EngineConfig::default())
    }

    /// Create an orchestrator with explicit configuration
    #[inline]
    #[must_use]
    pub fn with_config(backend: Arc<dyn BatchBackend>, config: EngineConfig) -> Self {
        Self {
            config,
            backend,
            state: Mutex::new(BuildState::default()),
        }
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replace configuration for the next `execute`
    #[inline]
    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config;
    }

    /// Queue handle for `collection`
    pub fn for_collection(&self, collection: impl Into<String>) -> OperationQueue<'_> {
        OperationQueue::new(self, collection.into())
    }

    pub(crate) fn enqueue(&self, collection: &str, body: OperationBody) -> OperationId {
        let mut state = self.state.lock();
        state.sequence += 1;
        let id = OperationId::generate(collection, state.sequence);
        state.operations.push(Operation {
            id: id.clone(),
            collection: collection.to_string(),
            body,
        });
        id
    }

    /// Snapshot of queued operations, in submission order
    #[must_use]
    pub fn pending_operations(&self) -> Vec<Operation> {
        self.state.lock().operations.clone()
    }

    /// Number of queued operations
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().operations.len()
    }

    /// Whether nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard queued operations without executing them
    pub fn clear(&mut self) {
        let dropped = std::mem::take(&mut self.state.get_mut().operations).len();
        if dropped > 0 {
            tracing::info!(dropped, "discarded queued operations");
        }
    }

    fn runner(&self) -> Box<dyn ChunkRunner> {
        let executor = ChunkExecutor::new(Arc::clone(&self.backend));
        match self.config.active_retry_policy() {
            Some(policy) => Box::new(RetryingChunkRunner::new(executor, policy.clone())),
            None => Box::new(executor),
        }
    }

    /// Execute every queued operation
    ///
    /// Operation and chunk failures are reported in the summary, never as
    /// an `Err`. The build state is empty afterwards, so the instance can be
    /// reused for the next batch.
    ///
    /// # Errors
    /// - `BatchError::Config` if the configuration is invalid; queued
    ///   operations are kept so the caller can fix the config and retry
    pub async fn execute(&mut self) -> Result<BatchSummary, BatchError> {
        self.config.validate()?;

        let operations = std::mem::take(&mut self.state.get_mut().operations);
        if operations.is_empty() {
            tracing::debug!("execute called with no queued operations");
            return Ok(BatchSummary::empty());
        }

        let total = operations.len();
        let chunks = partition(operations, self.config.max_operations_per_chunk);
        let runner = self.runner();
        let started = Instant::now();

        tracing::info!(
            operations = total,
            chunks = chunks.len(),
            concurrent = self.config.concurrent_chunks,
            "executing batch"
        );

        let reports: Vec<ChunkReport> = if self.config.concurrent_chunks {
            join_all(
                chunks
                    .iter()
                    .enumerate()
                    .map(|(index, chunk)| runner.run_chunk(index, chunk)),
            )
            .await
        } else {
            let mut reports = Vec::with_capacity(chunks.len());
            for (index, chunk) in chunks.iter().enumerate() {
                reports.push(runner.run_chunk(index, chunk).await);
            }
            reports
        };

        let summary = aggregate(&reports);
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if summary.success {
            tracing::info!(
                operations = summary.total_operations,
                chunks = summary.chunk_count,
                elapsed_ms,
                "batch completed"
            );
        } else {
            tracing::warn!(
                operations = summary.total_operations,
                failed = summary.failed_operations,
                chunks = summary.chunk_count,
                elapsed_ms,
                "batch completed with failures"
            );
        }

        Ok(summary)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::backend::{BatchBackend, BatchContext, CollectionHandle, PendingOutcome};
    use crate::error::{RegistrationError, TransportError};
    use crate::operation::OperationRequest;
    use crate::types::OperationId;

    /// Backend that accepts nothing; for build-phase tests
    pub(crate) struct NullBackend;

    struct NullContext;

    impl BatchBackend for NullBackend {
        fn collection(&self, name: &str) -> Result<CollectionHandle, RegistrationError> {
            Err(RegistrationError::UnknownCollection(name.to_string()))
        }

        fn open_batch(&self) -> Box<dyn BatchContext> {
            Box::new(NullContext)
        }
    }

    #[async_trait::async_trait]
    impl BatchContext for NullContext {
        fn register(
            &mut self,
            _collection: &CollectionHandle,
            _operation_id: &OperationId,
            _request: &OperationRequest,
        ) -> Result<PendingOutcome, RegistrationError> {
            Err(RegistrationError::Unsupported("null backend".to_string()))
        }

        async fn commit(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }
}

#[cfg(test)]
impl BatchOrchestrator {
    pub(crate) fn detached() -> Self {
        Self::new(Arc::new(test_support::NullBackend))
    }
}
