//! Backend adapter seam
//!
//! The engine never talks to the network itself. A `BatchBackend` resolves
//! collection handles and opens `BatchContext`s; each context collects
//! registered operations and performs exactly one round trip on `commit`.
//!
//! Registration hands back a [`PendingOutcome`] per operation. The backend
//! keeps the matching [`OutcomeSlot`] and settles it while committing, so the
//! outcome is a value the caller awaits rather than a side effect.

use crate::error::{OperationError, RegistrationError, TransportError};
use crate::operation::OperationRequest;
use crate::types::OperationId;
use serde_json::Value;
use tokio::sync::oneshot;

/// Resolved reference to a named collection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionHandle {
    name: String,
    key: String,
}

impl CollectionHandle {
    /// Create a handle; `key` is whatever the backend uses to address the collection
    #[inline]
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
        }
    }

    /// Collection name as requested by the caller
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend-specific key
    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

type SlotResult = Result<Value, OperationError>;

/// Backend half of a per-operation result
#[derive(Debug)]
pub struct OutcomeSlot(oneshot::Sender<SlotResult>);

impl OutcomeSlot {
    /// Settle the operation as successful
    pub fn resolve(self, data: Value) {
        // receiver gone means the chunk was abandoned; nothing to report to
        let _ = self.0.send(Ok(data));
    }

    /// Settle the operation as failed
    pub fn reject(self, error: OperationError) {
        let _ = self.0.send(Err(error));
    }

    /// Settle with a ready-made result
    pub fn settle(self, result: SlotResult) {
        let _ = self.0.send(result);
    }
}

/// Engine half of a per-operation result
#[derive(Debug)]
pub struct PendingOutcome(oneshot::Receiver<SlotResult>);

impl PendingOutcome {
    /// Wait for the backend to settle the operation
    ///
    /// # Errors
    /// Returns the backend's `OperationError`, or an error noting the slot
    /// was dropped without being settled.
    pub async fn settled(self) -> Result<Value, OperationError> {
        match self.0.await {
            Ok(result) => result,
            Err(_) => Err(unresolved()),
        }
    }

    /// Read the outcome without waiting
    ///
    /// Used once `commit` has returned, when every slot must already be
    /// settled. A slot still held open by the backend counts as unresolved.
    ///
    /// # Errors
    /// Returns the backend's `OperationError`, or an error noting the slot
    /// was never settled.
    pub fn try_settled(mut self) -> Result<Value, OperationError> {
        match self.0.try_recv() {
            Ok(result) => result,
            Err(oneshot::error::TryRecvError::Empty | oneshot::error::TryRecvError::Closed) => {
                Err(unresolved())
            }
        }
    }
}

fn unresolved() -> OperationError {
    OperationError::new("operation was not resolved by the backend")
}

/// Create a connected slot / pending pair
#[must_use]
pub fn outcome_channel() -> (OutcomeSlot, PendingOutcome) {
    let (tx, rx) = oneshot::channel();
    (OutcomeSlot(tx), PendingOutcome(rx))
}

/// Deferred-execution context covering one network round trip
#[async_trait::async_trait]
pub trait BatchContext: Send {
    /// Register an operation for the next commit
    ///
    /// # Errors
    /// Returns `RegistrationError` if the backend refuses the operation; the
    /// context stays usable for the remaining operations.
    fn register(
        &mut self,
        collection: &CollectionHandle,
        operation_id: &OperationId,
        request: &OperationRequest,
    ) -> Result<PendingOutcome, RegistrationError>;

    /// Dispatch every registered operation in one network call
    ///
    /// # Errors
    /// Returns `TransportError` if the call fails as a whole.
    async fn commit(&mut self) -> Result<(), TransportError>;
}

/// Injected capability performing the remote batch calls
pub trait BatchBackend: Send + Sync {
    /// Resolve a collection by name
    ///
    /// # Errors
    /// Returns `RegistrationError::UnknownCollection` if the backend knows no
    /// such collection.
    fn collection(&self, name: &str) -> Result<CollectionHandle, RegistrationError>;

    /// Open a fresh context for one chunk
    fn open_batch(&self) -> Box<dyn BatchContext>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn resolved_slot_yields_data() {
        let (slot, pending) = outcome_channel();
        slot.resolve(json!({"id": 1}));
        assert_eq!(pending.settled().await.unwrap(), json!({"id": 1}));
    }

    #[tokio::test]
    async fn rejected_slot_yields_error() {
        let (slot, pending) = outcome_channel();
        slot.reject(OperationError::new("conflict").with_status(412));
        let err = pending.settled().await.unwrap_err();
        assert_eq!(err.status, Some(412));
    }

    #[test]
    fn settled_slot_reads_without_waiting() {
        let (slot, pending) = outcome_channel();
        slot.resolve(json!({"id": 2}));
        assert_eq!(pending.try_settled().unwrap(), json!({"id": 2}));
    }

    #[test]
    fn slot_held_open_is_unresolved() {
        let (slot, pending) = outcome_channel();
        let err = pending.try_settled().unwrap_err();
        assert!(err.message.contains("not resolved"));
        drop(slot);
    }

    #[tokio::test]
    async fn dropped_slot_is_unresolved() {
        let (slot, pending) = outcome_channel();
        drop(slot);
        let err = pending.settled().await.unwrap_err();
        assert!(err.message.contains("not resolved"));
    }
}
