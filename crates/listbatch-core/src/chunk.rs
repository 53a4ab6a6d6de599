//! Chunk partitioning and execution
//!
//! A chunk is an order-preserving slice of the batch that maps to one
//! network round trip. `ChunkExecutor` drives a chunk through
//! `Building -> Committing -> Settled`:
//! - Building: open one context and register every operation; local
//!   failures are recorded and registration moves on
//! - Committing: one `commit` call for everything registered
//! - Settled: read each pending outcome, or fail every registered
//!   operation with the transport error if the commit itself failed

use crate::backend::{BatchBackend, BatchContext, PendingOutcome};
use crate::error::TransportError;
use crate::operation::{Operation, OperationBody};
use crate::outcome::{FailureCause, OperationOutcome};
use crate::types::OperationKind;
use std::fmt;
use std::sync::Arc;

/// Split operations into chunks of at most `max` items, keeping order
///
/// Chunk `k` holds `operations[k*max .. (k+1)*max]`.
///
/// # Panics
/// Panics if `max` is zero; `EngineConfig::validate` rules that out.
#[must_use]
pub fn partition(operations: Vec<Operation>, max: usize) -> Vec<Vec<Operation>> {
    assert!(max > 0, "chunk size must be greater than zero");
    let mut chunks = Vec::with_capacity(operations.len().div_ceil(max));
    let mut iter = operations.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(max).collect());
    }
    chunks
}

/// Lifecycle of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPhase {
    /// Registering operations
    Building,
    /// Network call in flight
    Committing,
    /// Every outcome known
    Settled,
}

impl fmt::Display for ChunkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChunkPhase::Building => "building",
            ChunkPhase::Committing => "committing",
            ChunkPhase::Settled => "settled",
        };
        f.write_str(label)
    }
}

/// Outcomes of one chunk, in operation order
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkReport {
    /// Position of the chunk in the batch
    pub index: usize,
    /// One outcome per operation in the chunk
    pub outcomes: Vec<OperationOutcome>,
    /// Set when the commit failed as a whole
    pub transport_error: Option<TransportError>,
    /// Commit attempts made, including retries
    pub attempts: u32,
}

impl ChunkReport {
    /// Report for a chunk settled on the first attempt
    #[must_use]
    pub fn new(index: usize, outcomes: Vec<OperationOutcome>) -> Self {
        Self {
            index,
            outcomes,
            transport_error: None,
            attempts: 1,
        }
    }

    /// With transport error
    #[must_use]
    pub fn with_transport_error(mut self, error: TransportError) -> Self {
        self.transport_error = Some(error);
        self
    }

    /// Number of failed outcomes
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_success()).count()
    }
}

/// Runs one chunk to completion
///
/// Never fails: every failure mode ends up in the report's outcomes.
#[async_trait::async_trait]
pub trait ChunkRunner: Send + Sync {
    /// Execute `operations` as chunk number `index`
    async fn run_chunk(&self, index: usize, operations: &[Operation]) -> ChunkReport;
}

enum Slot<'a> {
    Done(OperationOutcome),
    Pending {
        operation: &'a Operation,
        kind: OperationKind,
        pending: PendingOutcome,
    },
}

/// Default chunk runner over a `BatchBackend`
#[derive(Clone)]
pub struct ChunkExecutor {
    backend: Arc<dyn BatchBackend>,
}

impl fmt::Debug for ChunkExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkExecutor").finish_non_exhaustive()
    }
}

impl ChunkExecutor {
    /// Create an executor over `backend`
    #[inline]
    #[must_use]
    pub fn new(backend: Arc<dyn BatchBackend>) -> Self {
        Self { backend }
    }

    fn register<'a>(&self, context: &mut dyn BatchContext, operation: &'a Operation) -> Slot<'a> {
        let local_failure = |cause: FailureCause, message: String| {
            Slot::Done(OperationOutcome::failed(
                operation.id.clone(),
                operation.collection.clone(),
                operation.kind(),
                cause,
                message,
            ))
        };

        let request = match &operation.body {
            OperationBody::Ready(request) => request,
            OperationBody::Rejected { error, .. } => {
                return local_failure(FailureCause::LocalValidation, error.to_string());
            }
        };

        if let Err(error) = request.check() {
            return local_failure(FailureCause::LocalValidation, error.to_string());
        }

        let registered = self
            .backend
            .collection(&operation.collection)
            .and_then(|handle| context.register(&handle, &operation.id, request));

        match registered {
            Ok(pending) => Slot::Pending {
                operation,
                kind: request.kind(),
                pending,
            },
            Err(error) => {
                tracing::debug!(operation_id = %operation.id, %error, "registration refused");
                local_failure(FailureCause::LocalValidation, error.to_string())
            }
        }
    }
}

#[async_trait::async_trait]
impl ChunkRunner for ChunkExecutor {
    async fn run_chunk(&self, index: usize, operations: &[Operation]) -> ChunkReport {
        tracing::debug!(
            chunk = index,
            phase = %ChunkPhase::Building,
            size = operations.len(),
            "registering chunk"
        );

        let mut context = self.backend.open_batch();
        let slots: Vec<Slot<'_>> = operations
            .iter()
            .map(|operation| self.register(context.as_mut(), operation))
            .collect();

        let registered = slots
            .iter()
            .filter(|slot| matches!(slot, Slot::Pending { .. }))
            .count();

        // nothing to send; skip the round trip
        let commit_result = if registered == 0 {
            tracing::debug!(chunk = index, "no operations registered, commit skipped");
            Ok(())
        } else {
            tracing::debug!(chunk = index, phase = %ChunkPhase::Committing, registered, "committing chunk");
            context.commit().await
        };
        drop(context);

        let mut outcomes = Vec::with_capacity(slots.len());
        for slot in slots {
            let outcome = match slot {
                Slot::Done(outcome) => outcome,
                Slot::Pending {
                    operation,
                    kind,
                    pending,
                } => match &commit_result {
                    Err(error) => OperationOutcome::failed(
                        operation.id.clone(),
                        operation.collection.clone(),
                        Some(kind),
                        FailureCause::ChunkTransport,
                        error.message.clone(),
                    ),
                    Ok(()) => match pending.try_settled() {
                        Ok(data) => OperationOutcome::succeeded(
                            operation.id.clone(),
                            operation.collection.clone(),
                            Some(kind),
                            data,
                        ),
                        Err(error) => OperationOutcome::failed(
                            operation.id.clone(),
                            operation.collection.clone(),
                            Some(kind),
                            FailureCause::Operation,
                            error.message,
                        ),
                    },
                },
            };
            outcomes.push(outcome);
        }

        let mut report = ChunkReport::new(index, outcomes);
        match commit_result {
            Ok(()) => {
                tracing::debug!(
                    chunk = index,
                    phase = %ChunkPhase::Settled,
                    failed = report.failed_count(),
                    "chunk settled"
                );
            }
            Err(error) => {
                tracing::warn!(
                    chunk = index,
                    phase = %ChunkPhase::Settled,
                    registered,
                    error = %error,
                    "chunk commit failed; registered operations marked failed"
                );
                report = report.with_transport_error(error);
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{outcome_channel, CollectionHandle, OutcomeSlot};
    use crate::error::{OperationError, RegistrationError};
    use crate::operation::{OperationDraft, OperationRequest};
    use crate::types::{OperationId, RecordId};
    use parking_lot::Mutex;
    use serde_json::json;

    fn add(n: usize) -> Operation {
        Operation {
            id: OperationId::from(format!("Tasks_{n}").as_str()),
            collection: "Tasks".into(),
            body: OperationBody::Ready(OperationRequest::Add {
                payload: json!({ "n": n }),
            }),
        }
    }

    #[test]
    fn partition_five_by_two() {
        let ops: Vec<Operation> = (0..5).map(add).collect();
        let sizes: Vec<usize> = partition(ops, 2).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn partition_of_nothing_is_empty() {
        assert!(partition(Vec::new(), 3).is_empty());
    }

    /// Backend that rejects updates of record 13 and can fail its commit
    struct ScriptedBackend {
        fail_commit: bool,
        commits: Arc<Mutex<usize>>,
    }

    struct ScriptedContext {
        fail_commit: bool,
        commits: Arc<Mutex<usize>>,
        slots: Vec<(OperationRequest, OutcomeSlot)>,
    }

    impl BatchBackend for ScriptedBackend {
        fn collection(&self, name: &str) -> Result<CollectionHandle, RegistrationError> {
            if name == "Missing" {
                Err(RegistrationError::UnknownCollection(name.into()))
            } else {
                Ok(CollectionHandle::new(name, name.to_lowercase()))
            }
        }

        fn open_batch(&self) -> Box<dyn BatchContext> {
            Box::new(ScriptedContext {
                fail_commit: self.fail_commit,
                commits: Arc::clone(&self.commits),
                slots: Vec::new(),
            })
        }
    }

    #[async_trait::async_trait]
    impl BatchContext for ScriptedContext {
        fn register(
            &mut self,
            _collection: &CollectionHandle,
            _operation_id: &OperationId,
            request: &OperationRequest,
        ) -> Result<PendingOutcome, RegistrationError> {
            let (slot, pending) = outcome_channel();
            self.slots.push((request.clone(), slot));
            Ok(pending)
        }

        async fn commit(&mut self) -> Result<(), TransportError> {
            *self.commits.lock() += 1;
            if self.fail_commit {
                return Err(TransportError::new("socket hang up"));
            }
            for (request, slot) in self.slots.drain(..) {
                if request.record_id() == Some(RecordId(13)) {
                    slot.reject(OperationError::new("record is locked"));
                } else {
                    slot.resolve(json!({ "ok": true }));
                }
            }
            Ok(())
        }
    }

    fn executor(fail_commit: bool) -> (ChunkExecutor, Arc<Mutex<usize>>) {
        let commits = Arc::new(Mutex::new(0));
        let backend = ScriptedBackend {
            fail_commit,
            commits: Arc::clone(&commits),
        };
        (ChunkExecutor::new(Arc::new(backend)), commits)
    }

    fn rejected_update() -> Operation {
        Operation {
            id: OperationId::from("Tasks_bad"),
            collection: "Tasks".into(),
            body: OperationBody::from(OperationDraft::new("update").with_payload(json!({}))),
        }
    }

    #[tokio::test]
    async fn local_failure_does_not_block_siblings() {
        let (executor, commits) = executor(false);
        let ops = vec![add(0), rejected_update(), add(2)];

        let report = executor.run_chunk(0, &ops).await;

        assert_eq!(*commits.lock(), 1);
        assert!(report.outcomes[0].is_success());
        assert!(!report.outcomes[1].is_success());
        assert_eq!(report.outcomes[1].failure(), Some(FailureCause::LocalValidation));
        assert!(report.outcomes[1].error_message().unwrap().contains("recordId"));
        assert!(report.outcomes[2].is_success());
    }

    #[tokio::test]
    async fn backend_rejection_is_an_operation_failure() {
        let (executor, _) = executor(false);
        let ops = vec![
            add(0),
            Operation {
                id: OperationId::from("Tasks_13"),
                collection: "Tasks".into(),
                body: OperationBody::Ready(OperationRequest::Delete {
                    record_id: RecordId(13),
                    concurrency_token: None,
                }),
            },
        ];

        let report = executor.run_chunk(0, &ops).await;

        assert!(report.transport_error.is_none());
        assert_eq!(report.outcomes[1].failure(), Some(FailureCause::Operation));
        assert_eq!(report.outcomes[1].error_message(), Some("record is locked"));
    }

    #[tokio::test]
    async fn transport_failure_fails_registered_only() {
        let (executor, _) = executor(true);
        let ops = vec![add(0), rejected_update(), add(2)];

        let report = executor.run_chunk(4, &ops).await;

        assert_eq!(report.index, 4);
        assert!(report.transport_error.is_some());
        assert_eq!(report.outcomes[0].failure(), Some(FailureCause::ChunkTransport));
        assert_eq!(report.outcomes[0].error_message(), Some("socket hang up"));
        assert_eq!(report.outcomes[1].failure(), Some(FailureCause::LocalValidation));
        assert_eq!(report.outcomes[2].failure(), Some(FailureCause::ChunkTransport));
    }

    #[tokio::test]
    async fn unknown_collection_fails_locally() {
        let (executor, _) = executor(false);
        let mut op = add(0);
        op.collection = "Missing".into();

        let report = executor.run_chunk(0, &[op, add(1)]).await;

        assert!(report.outcomes[0]
            .error_message()
            .unwrap()
            .contains("collection not found"));
        assert!(report.outcomes[1].is_success());
    }

    #[tokio::test]
    async fn all_local_failures_skip_commit() {
        let (executor, commits) = executor(false);
        let report = executor.run_chunk(0, &[rejected_update()]).await;
        assert_eq!(*commits.lock(), 0);
        assert_eq!(report.failed_count(), 1);
    }

    /// Backend whose commit succeeds but keeps every slot open
    struct HoardingBackend {
        held: Arc<Mutex<Vec<OutcomeSlot>>>,
    }

    struct HoardingContext {
        held: Arc<Mutex<Vec<OutcomeSlot>>>,
    }

    impl BatchBackend for HoardingBackend {
        fn collection(&self, name: &str) -> Result<CollectionHandle, RegistrationError> {
            Ok(CollectionHandle::new(name, name.to_lowercase()))
        }

        fn open_batch(&self) -> Box<dyn BatchContext> {
            Box::new(HoardingContext {
                held: Arc::clone(&self.held),
            })
        }
    }

    #[async_trait::async_trait]
    impl BatchContext for HoardingContext {
        fn register(
            &mut self,
            _collection: &CollectionHandle,
            _operation_id: &OperationId,
            _request: &OperationRequest,
        ) -> Result<PendingOutcome, RegistrationError> {
            let (slot, pending) = outcome_channel();
            self.held.lock().push(slot);
            Ok(pending)
        }

        async fn commit(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn slots_left_open_after_commit_fail_without_hanging() {
        let held = Arc::new(Mutex::new(Vec::new()));
        let executor = ChunkExecutor::new(Arc::new(HoardingBackend {
            held: Arc::clone(&held),
        }));

        let report = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            executor.run_chunk(0, &[add(0), add(1)]),
        )
        .await
        .expect("chunk must settle once commit returns");

        assert_eq!(held.lock().len(), 2);
        assert!(report.transport_error.is_none());
        assert!(report.outcomes.iter().all(|o| {
            o.failure() == Some(FailureCause::Operation)
                && o.error_message() == Some("operation was not resolved by the backend")
        }));
    }
}
