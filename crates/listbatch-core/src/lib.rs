//! listbatch Core - chunked batch writes against list-based stores
//!
//! Accumulates add / update / delete / validated writes against named
//! collections and executes them through an injected backend:
//! - Operations are queued per collection into one ordered list
//! - The list is split into chunks no larger than the server's per-call cap
//! - Each chunk is one network round trip; failures stay isolated to the
//!   operation (or, for transport failures, the chunk) that caused them
//! - Every operation id maps to exactly one outcome in the `BatchSummary`
//!
//! # Example
//!
//! ```rust,ignore
//! use listbatch_core::{BatchOrchestrator, EngineConfig};
//! use serde_json::json;
//!
//! # async fn example(backend: std::sync::Arc<dyn listbatch_core::BatchBackend>) -> Result<(), Box<dyn std::error::Error>> {
//! let mut batch = BatchOrchestrator::with_config(backend, EngineConfig::new());
//!
//! batch
//!     .for_collection("Tasks")
//!     .add(json!({ "Title": "A" }))
//!     .update(5, json!({ "Title": "B" }), None);
//! batch.for_collection("Docs").delete(10, None);
//!
//! let summary = batch.execute().await?;
//! if !summary.success {
//!     for failed in &summary.errors {
//!         println!("{}: {:?}", failed.operation_id(), failed.error_message());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod aggregator;
pub mod backend;
pub mod chunk;
pub mod config;
pub mod error;
pub mod operation;
pub mod orchestrator;
pub mod outcome;
pub mod queue;
pub mod retry;
pub mod types;

// Re-exports for convenience
pub use aggregator::aggregate;
pub use backend::{
    outcome_channel, BatchBackend, BatchContext, CollectionHandle, OutcomeSlot, PendingOutcome,
};
pub use chunk::{partition, ChunkExecutor, ChunkPhase, ChunkReport, ChunkRunner};
pub use config::{EngineConfig, RetryPolicy, DEFAULT_MAX_OPERATIONS_PER_CHUNK, SERVER_OPERATION_CAP};
pub use error::{
    BatchError, ConfigError, LocalValidationError, OperationError, RegistrationError,
    TransportError,
};
pub use operation::{Operation, OperationBody, OperationDraft, OperationRequest};
pub use orchestrator::BatchOrchestrator;
pub use outcome::{BatchSummary, FailureCause, OperationOutcome};
pub use queue::OperationQueue;
pub use retry::RetryingChunkRunner;
pub use types::{FieldValue, OperationId, OperationKind, RecordId};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for building and running batches
    pub use crate::{
        BatchBackend, BatchOrchestrator, BatchSummary, EngineConfig, FieldValue, OperationDraft,
        OperationOutcome, RetryPolicy,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
