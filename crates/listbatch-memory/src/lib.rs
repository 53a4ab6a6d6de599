//! listbatch Memory - in-process list store backend
//!
//! A reference `BatchBackend` that keeps lists in memory:
//! - Records with auto-incrementing ids, folder paths and ETags
//! - Concurrency tokens checked on update and delete (`*` matches any)
//! - Required-field validation for the validate-and-write operations
//! - The per-request operation cap of the real batch endpoint
//! - Optional simulated latency and injected transport failures
//!
//! # Example
//!
//! ```rust,ignore
//! use listbatch_core::BatchOrchestrator;
//! use listbatch_memory::MemoryListStore;
//! use std::sync::Arc;
//!
//! let store = MemoryListStore::new();
//! store.create_list("Tasks", &["Title"]);
//!
//! let mut batch = BatchOrchestrator::new(Arc::new(store.clone()));
//! batch.for_collection("Tasks").add(serde_json::json!({ "Title": "A" }));
//! let summary = batch.execute().await?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod list;
mod store;

pub use list::{FieldResult, StoredRecord};
pub use store::{MemoryListStore, SeedError, StoreOptions};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
