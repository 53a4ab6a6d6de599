//! Batch plan files
//!
//! A plan is a JSON document describing the lists to create, the records
//! to seed them with, and the operations to run:
//!
//! ```json
//! {
//!   "collections": [{ "name": "Tasks", "requiredFields": ["Title"], "records": [{ "Title": "a" }] }],
//!   "operations": [
//!     { "collection": "Tasks", "kind": "update", "recordId": 1, "payload": { "Title": "b" } },
//!     { "collection": "Tasks", "kind": "delete", "recordId": 1, "concurrencyToken": "*" }
//!   ]
//! }
//! ```

use anyhow::{Context, Result};
use listbatch_core::{
    partition, BatchOrchestrator, EngineConfig, Operation, OperationBody, OperationDraft,
};
use listbatch_memory::{MemoryListStore, StoreOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// List to create before the batch runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPlan {
    /// List name
    pub name: String,
    /// Fields that must be non-blank on validated writes
    #[serde(default)]
    pub required_fields: Vec<String>,
    /// Records seeded before the batch runs, ids assigned from 1
    #[serde(default)]
    pub records: Vec<Value>,
}

/// One planned operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedOperation {
    /// Target list
    pub collection: String,
    /// The operation itself
    #[serde(flatten)]
    pub draft: OperationDraft,
}

/// Store simulation settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorePlan {
    /// Round-trip latency per commit
    pub latency_ms: u64,
    /// Operations accepted per commit; the store default when unset
    pub operation_cap: Option<usize>,
    /// Transport failures returned by the first commits, in order
    pub fail_commits: Vec<String>,
}

/// A complete batch plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Lists to create
    #[serde(default)]
    pub collections: Vec<CollectionPlan>,
    /// Operations in submission order
    #[serde(default)]
    pub operations: Vec<PlannedOperation>,
    /// Engine settings; flags and `--config` take precedence
    #[serde(default)]
    pub engine: Option<EngineConfig>,
    /// Store simulation settings
    #[serde(default)]
    pub store: StorePlan,
}

impl Plan {
    /// Parse a plan from JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid plan document")
    }

    /// Load a plan from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plan {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("in plan {}", path.display()))
    }

    /// Build a store holding the plan's lists and seed records
    pub fn build_store(&self) -> Result<MemoryListStore> {
        let mut options =
            StoreOptions::default().with_latency(Duration::from_millis(self.store.latency_ms));
        if let Some(cap) = self.store.operation_cap {
            options = options.with_operation_cap(cap);
        }

        let store = MemoryListStore::with_options(options);
        for collection in &self.collections {
            let required: Vec<&str> = collection.required_fields.iter().map(String::as_str).collect();
            store.create_list(&collection.name, &required);
            for record in &collection.records {
                store
                    .seed(&collection.name, record.clone(), None)
                    .with_context(|| format!("failed to seed list {}", collection.name))?;
            }
        }
        for message in &self.store.fail_commits {
            store.fail_next_commit(message.clone());
        }
        Ok(store)
    }

    /// Queue every planned operation on `orchestrator`
    pub fn queue(&self, orchestrator: &BatchOrchestrator) {
        for planned in &self.operations {
            orchestrator
                .for_collection(planned.collection.as_str())
                .push_draft(planned.draft.clone());
        }
    }

    /// Names of lists the plan creates
    #[must_use]
    pub fn declared_collections(&self) -> BTreeSet<&str> {
        self.collections.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Local problem found by `check`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanIssue {
    /// Position in the plan's operation list
    pub index: usize,
    /// Target list
    pub collection: String,
    /// What is wrong
    pub message: String,
}

/// Result of checking a plan without executing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    /// Operations in the plan
    pub total_operations: usize,
    /// Sizes of the chunks the batch would be split into
    pub chunk_sizes: Vec<usize>,
    /// Operations that would fail before reaching the store
    pub issues: Vec<PlanIssue>,
}

impl CheckReport {
    /// Whether every operation would reach the store
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check drafts locally and compute the chunk layout
///
/// # Errors
/// Returns an error if `config` is invalid.
pub fn check(plan: &Plan, config: &EngineConfig) -> Result<CheckReport> {
    config.validate()?;

    let declared: BTreeSet<String> = plan
        .declared_collections()
        .into_iter()
        .map(str::to_lowercase)
        .collect();

    let issues = plan
        .operations
        .iter()
        .enumerate()
        .filter_map(|(index, planned)| {
            let message = match OperationBody::from(planned.draft.clone()) {
                OperationBody::Rejected { error, .. } => Some(error.to_string()),
                OperationBody::Ready(request) => request.check().err().map(|e| e.to_string()),
            }
            .or_else(|| {
                (!declared.contains(&planned.collection.trim().to_lowercase()))
                    .then(|| format!("collection not found: {}", planned.collection))
            })?;
            Some(PlanIssue {
                index,
                collection: planned.collection.clone(),
                message,
            })
        })
        .collect();

    let chunk_sizes = partition(preview(plan), config.max_operations_per_chunk)
        .iter()
        .map(Vec::len)
        .collect();

    Ok(CheckReport {
        total_operations: plan.operations.len(),
        chunk_sizes,
        issues,
    })
}

/// Operations as the orchestrator would hold them, for display
#[must_use]
pub fn preview(plan: &Plan) -> Vec<Operation> {
    let scratch = BatchOrchestrator::new(std::sync::Arc::new(MemoryListStore::new()));
    plan.queue(&scratch);
    scratch.pending_operations()
}
