//! Testing utilities for listbatch workspace
//!
//! Shared stub backends, fixtures, and helpers.

#![allow(missing_docs)]

use listbatch_core::{
    outcome_channel, BatchBackend, BatchContext, BatchOrchestrator, CollectionHandle,
    OperationError, OperationId, OperationRequest, OutcomeSlot, PendingOutcome,
    RegistrationError, TransportError,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// One observed `commit` call
#[derive(Debug, Clone)]
pub struct CommitRecord {
    /// Order in which the commit was started (0-based)
    pub sequence: usize,
    pub operation_ids: Vec<OperationId>,
    pub collections: Vec<String>,
    pub started_at: Instant,
    pub finished_at: Instant,
    pub failed: bool,
}

#[derive(Debug, Default)]
struct Script {
    failing_commits: HashMap<usize, String>,
    rejected_records: HashMap<u64, String>,
    unknown_collections: HashSet<String>,
    commit_delay: Duration,
    delay_overrides: HashMap<usize, Duration>,
}

#[derive(Debug, Default)]
struct RecorderState {
    script: Mutex<Script>,
    commits: Mutex<Vec<CommitRecord>>,
    next_sequence: AtomicUsize,
    contexts_opened: AtomicUsize,
}

/// Scriptable backend that records every commit
///
/// By default every operation succeeds and echoes its id and collection.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    state: Arc<RecorderState>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `sequence`-th commit (0-based, in start order) with a transport error
    #[must_use]
    pub fn failing_commit(self, sequence: usize, message: &str) -> Self {
        self.state
            .script
            .lock()
            .failing_commits
            .insert(sequence, message.to_string());
        self
    }

    /// Reject every operation addressing `record_id`
    #[must_use]
    pub fn rejecting_record(self, record_id: u64, message: &str) -> Self {
        self.state
            .script
            .lock()
            .rejected_records
            .insert(record_id, message.to_string());
        self
    }

    /// Refuse to resolve `name`
    #[must_use]
    pub fn without_collection(self, name: &str) -> Self {
        self.state
            .script
            .lock()
            .unknown_collections
            .insert(name.to_string());
        self
    }

    /// Delay every commit by `delay`
    #[must_use]
    pub fn with_commit_delay(self, delay: Duration) -> Self {
        self.state.script.lock().commit_delay = delay;
        self
    }

    /// Delay the `sequence`-th commit by `delay` instead of the default
    #[must_use]
    pub fn with_commit_delay_for(self, sequence: usize, delay: Duration) -> Self {
        self.state
            .script
            .lock()
            .delay_overrides
            .insert(sequence, delay);
        self
    }

    /// Shared handle, ready to hand to an orchestrator
    pub fn shared(&self) -> Arc<dyn BatchBackend> {
        Arc::new(self.clone())
    }

    /// Commits observed so far, in the order they finished
    pub fn commits(&self) -> Vec<CommitRecord> {
        self.state.commits.lock().clone()
    }

    /// Commits ordered by start sequence
    pub fn commits_by_start(&self) -> Vec<CommitRecord> {
        let mut commits = self.commits();
        commits.sort_by_key(|c| c.sequence);
        commits
    }

    /// Number of contexts opened
    pub fn contexts_opened(&self) -> usize {
        self.state.contexts_opened.load(Ordering::SeqCst)
    }
}

impl BatchBackend for RecordingBackend {
    fn collection(&self, name: &str) -> Result<CollectionHandle, RegistrationError> {
        if self.state.script.lock().unknown_collections.contains(name) {
            return Err(RegistrationError::UnknownCollection(name.to_string()));
        }
        Ok(CollectionHandle::new(name, name.to_lowercase()))
    }

    fn open_batch(&self) -> Box<dyn BatchContext> {
        self.state.contexts_opened.fetch_add(1, Ordering::SeqCst);
        Box::new(RecordingContext {
            state: Arc::clone(&self.state),
            registered: Vec::new(),
        })
    }
}

struct Registered {
    id: OperationId,
    collection: String,
    request: OperationRequest,
    slot: OutcomeSlot,
}

struct RecordingContext {
    state: Arc<RecorderState>,
    registered: Vec<Registered>,
}

#[async_trait::async_trait]
impl BatchContext for RecordingContext {
    fn register(
        &mut self,
        collection: &CollectionHandle,
        operation_id: &OperationId,
        request: &OperationRequest,
    ) -> Result<PendingOutcome, RegistrationError> {
        let (slot, pending) = outcome_channel();
        self.registered.push(Registered {
            id: operation_id.clone(),
            collection: collection.name().to_string(),
            request: request.clone(),
            slot,
        });
        Ok(pending)
    }

    async fn commit(&mut self) -> Result<(), TransportError> {
        let sequence = self.state.next_sequence.fetch_add(1, Ordering::SeqCst);
        let started_at = Instant::now();
        let (delay, failure, rejected) = {
            let script = self.state.script.lock();
            (
                script
                    .delay_overrides
                    .get(&sequence)
                    .copied()
                    .unwrap_or(script.commit_delay),
                script.failing_commits.get(&sequence).cloned(),
                script.rejected_records.clone(),
            )
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let registered = std::mem::take(&mut self.registered);
        let record = CommitRecord {
            sequence,
            operation_ids: registered.iter().map(|r| r.id.clone()).collect(),
            collections: registered.iter().map(|r| r.collection.clone()).collect(),
            started_at,
            finished_at: Instant::now(),
            failed: failure.is_some(),
        };
        self.state.commits.lock().push(record);

        if let Some(message) = failure {
            return Err(TransportError::new(message));
        }

        for entry in registered {
            let rejection = entry
                .request
                .record_id()
                .and_then(|id| rejected.get(&id.value()));
            match rejection {
                Some(message) => entry
                    .slot
                    .reject(OperationError::new(message.clone()).with_status(409)),
                None => entry.slot.resolve(json!({
                    "operationId": entry.id,
                    "collection": entry.collection,
                    "kind": entry.request.kind(),
                })),
            }
        }
        Ok(())
    }
}

/// Payload with a single `title` field
pub fn title(value: &str) -> Value {
    json!({ "title": value })
}

/// Queue `count` adds against `collection`
pub fn queue_adds(orchestrator: &BatchOrchestrator, collection: &str, count: usize) {
    let mut queue = orchestrator.for_collection(collection);
    for n in 0..count {
        queue.add(title(&format!("item {n}")));
    }
}
