//! In-memory list store backend
//!
//! `MemoryListStore` behaves like a remote list service behind a batch
//! endpoint: registration only queues work, `commit` applies the queued
//! operations in order as one round trip, and each operation succeeds or
//! fails on its own. Nothing is rolled back when a sibling fails.

use crate::list::{ListState, StoredRecord};
use listbatch_core::{
    outcome_channel, BatchBackend, BatchContext, CollectionHandle, OperationError, OperationId,
    OperationRequest, OutcomeSlot, PendingOutcome, RegistrationError, TransportError,
    SERVER_OPERATION_CAP,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use ulid::Ulid;

/// Errors from seeding records outside a batch
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    /// No list with this name
    #[error("list not found: {0}")]
    UnknownList(String),

    /// Seed fields were not a JSON object
    #[error("seed record for list {list} must be a JSON object")]
    NotAnObject {
        /// Target list
        list: String,
    },
}

/// Store behavior knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Operations accepted in one commit
    pub operation_cap: usize,
    /// Simulated round-trip latency per commit
    pub latency: Duration,
}

impl StoreOptions {
    /// With operation cap
    #[inline]
    #[must_use]
    pub fn with_operation_cap(mut self, cap: usize) -> Self {
        self.operation_cap = cap;
        self
    }

    /// With simulated latency
    #[inline]
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            operation_cap: SERVER_OPERATION_CAP,
            latency: Duration::ZERO,
        }
    }
}

#[derive(Debug)]
struct StoreInner {
    options: StoreOptions,
    lists: Mutex<HashMap<String, ListState>>,
    injected_failures: Mutex<VecDeque<String>>,
    commits: AtomicU64,
}

/// In-process list store implementing `BatchBackend`
///
/// Cloning shares the underlying lists.
#[derive(Debug, Clone)]
pub struct MemoryListStore {
    inner: Arc<StoreInner>,
}

fn list_key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl MemoryListStore {
    /// Create an empty store with default options
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(StoreOptions::default())
    }

    /// Create an empty store
    #[must_use]
    pub fn with_options(options: StoreOptions) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                options,
                lists: Mutex::new(HashMap::new()),
                injected_failures: Mutex::new(VecDeque::new()),
                commits: AtomicU64::new(0),
            }),
        }
    }

    /// Get options
    #[inline]
    #[must_use]
    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    /// Create a list, or return the existing one with the same name
    ///
    /// List names are case-insensitive.
    pub fn create_list(&self, name: &str, required_fields: &[&str]) -> CollectionHandle {
        let mut lists = self.inner.lists.lock();
        let list = lists.entry(list_key(name)).or_insert_with(|| {
            tracing::debug!(list = name, "creating list");
            ListState::new(Ulid::new().to_string(), name, required_fields)
        });
        CollectionHandle::new(list.name.clone(), list.key.clone())
    }

    /// Insert a record directly, outside any batch
    ///
    /// # Errors
    /// - `SeedError::UnknownList` if the list does not exist
    /// - `SeedError::NotAnObject` if `fields` is not a JSON object
    pub fn seed(
        &self,
        list: &str,
        fields: Value,
        path: Option<&str>,
    ) -> Result<StoredRecord, SeedError> {
        let Value::Object(fields) = fields else {
            return Err(SeedError::NotAnObject {
                list: list.to_string(),
            });
        };
        let mut lists = self.inner.lists.lock();
        let state = lists
            .get_mut(&list_key(list))
            .ok_or_else(|| SeedError::UnknownList(list.to_string()))?;
        Ok(state.insert(fields, path).clone())
    }

    /// Get a record
    #[must_use]
    pub fn record(&self, list: &str, id: u64) -> Option<StoredRecord> {
        self.inner
            .lists
            .lock()
            .get(&list_key(list))
            .and_then(|state| state.record(id).cloned())
    }

    /// All records of a list, ordered by id
    #[must_use]
    pub fn records(&self, list: &str) -> Vec<StoredRecord> {
        self.inner
            .lists
            .lock()
            .get(&list_key(list))
            .map(|state| state.records().cloned().collect())
            .unwrap_or_default()
    }

    /// Names of all lists, sorted
    #[must_use]
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .lists
            .lock()
            .values()
            .map(|state| state.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Make the next commit fail at the transport level
    pub fn fail_next_commit(&self, message: impl Into<String>) {
        self.inner.injected_failures.lock().push_back(message.into());
    }

    /// Commits attempted so far, including failed ones
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.inner.commits.load(Ordering::SeqCst)
    }
}

impl Default for MemoryListStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchBackend for MemoryListStore {
    fn collection(&self, name: &str) -> Result<CollectionHandle, RegistrationError> {
        self.inner
            .lists
            .lock()
            .get(&list_key(name))
            .map(|state| CollectionHandle::new(state.name.clone(), state.key.clone()))
            .ok_or_else(|| RegistrationError::UnknownCollection(name.to_string()))
    }

    fn open_batch(&self) -> Box<dyn BatchContext> {
        Box::new(MemoryBatch {
            inner: Arc::clone(&self.inner),
            queued: Vec::new(),
        })
    }
}

struct Queued {
    collection: CollectionHandle,
    request: OperationRequest,
    slot: OutcomeSlot,
}

/// One pending round trip against a `MemoryListStore`
struct MemoryBatch {
    inner: Arc<StoreInner>,
    queued: Vec<Queued>,
}

#[async_trait::async_trait]
impl BatchContext for MemoryBatch {
    fn register(
        &mut self,
        collection: &CollectionHandle,
        operation_id: &OperationId,
        request: &OperationRequest,
    ) -> Result<PendingOutcome, RegistrationError> {
        tracing::trace!(%operation_id, list = collection.name(), kind = %request.kind(), "queued");
        let (slot, pending) = outcome_channel();
        self.queued.push(Queued {
            collection: collection.clone(),
            request: request.clone(),
            slot,
        });
        Ok(pending)
    }

    async fn commit(&mut self) -> Result<(), TransportError> {
        self.inner.commits.fetch_add(1, Ordering::SeqCst);

        let latency = self.inner.options.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if let Some(message) = self.inner.injected_failures.lock().pop_front() {
            return Err(TransportError::new(message));
        }

        let cap = self.inner.options.operation_cap;
        if self.queued.len() > cap {
            return Err(TransportError::new(format!(
                "batch request contains {} operations; the server accepts at most {cap} per request",
                self.queued.len()
            )));
        }

        let queued = std::mem::take(&mut self.queued);
        let applied = queued.len();
        let mut lists = self.inner.lists.lock();
        for entry in queued {
            let result = match lists.get_mut(&list_key(entry.collection.name())) {
                Some(state) if state.key == entry.collection.key() => state.apply(&entry.request),
                _ => Err(OperationError::new(format!(
                    "List '{}' does not exist at this site.",
                    entry.collection.name()
                ))
                .with_status(404)),
            };
            entry.slot.settle(result);
        }
        tracing::debug!(applied, "memory batch committed");
        Ok(())
    }
}
