//! Per-operation outcomes and the batch summary

use crate::types::{OperationId, OperationKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Granularity at which a failed operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureCause {
    /// Rejected before any network call
    LocalValidation,
    /// Rejected individually by the backend
    Operation,
    /// Containing chunk's network call failed
    ChunkTransport,
}

/// Result of one submitted operation
///
/// `data` is present exactly when `success` is true, `error_message` exactly
/// when it is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "OutcomeRecord")]
pub struct OperationOutcome {
    operation_id: OperationId,
    collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<OperationKind>,
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<FailureCause>,
}

/// Wire form of an outcome, checked before it becomes an `OperationOutcome`
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutcomeRecord {
    operation_id: OperationId,
    collection: String,
    #[serde(default)]
    kind: Option<OperationKind>,
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    failure: Option<FailureCause>,
}

impl TryFrom<OutcomeRecord> for OperationOutcome {
    type Error = String;

    fn try_from(record: OutcomeRecord) -> Result<Self, Self::Error> {
        match (record.success, record.error_message, record.failure) {
            (true, None, None) => Ok(Self::succeeded(
                record.operation_id,
                record.collection,
                record.kind,
                record.data.unwrap_or(Value::Null),
            )),
            (false, Some(message), Some(cause)) if record.data.is_none() => Ok(Self::failed(
                record.operation_id,
                record.collection,
                record.kind,
                cause,
                message,
            )),
            (true, ..) => Err(format!(
                "successful outcome {} must not carry errorMessage or failure",
                record.operation_id
            )),
            (false, ..) => Err(format!(
                "failed outcome {} needs errorMessage and failure and no data",
                record.operation_id
            )),
        }
    }
}

impl OperationOutcome {
    /// Successful outcome carrying the backend's data
    #[must_use]
    pub fn succeeded(
        operation_id: OperationId,
        collection: impl Into<String>,
        kind: Option<OperationKind>,
        data: Value,
    ) -> Self {
        Self {
            operation_id,
            collection: collection.into(),
            kind,
            success: true,
            data: Some(data),
            error_message: None,
            failure: None,
        }
    }

    /// Failed outcome
    #[must_use]
    pub fn failed(
        operation_id: OperationId,
        collection: impl Into<String>,
        kind: Option<OperationKind>,
        cause: FailureCause,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation_id,
            collection: collection.into(),
            kind,
            success: false,
            data: None,
            error_message: Some(message.into()),
            failure: Some(cause),
        }
    }

    #[inline]
    #[must_use]
    pub fn operation_id(&self) -> &OperationId {
        &self.operation_id
    }

    #[inline]
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Kind, absent only for drafts with an unrecognized kind label
    #[inline]
    #[must_use]
    pub fn kind(&self) -> Option<OperationKind> {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    #[inline]
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn failure(&self) -> Option<FailureCause> {
        self.failure
    }
}

/// Aggregate result of one `execute` call
///
/// `successful_operations + failed_operations == total_operations` and
/// `success == (failed_operations == 0)` hold for every summary built by
/// [`crate::aggregator::aggregate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    /// True when no operation failed
    pub success: bool,
    /// Operations submitted
    pub total_operations: usize,
    /// Operations that succeeded
    pub successful_operations: usize,
    /// Operations that failed
    pub failed_operations: usize,
    /// Chunks dispatched
    pub chunk_count: usize,
    /// Every outcome, in submission order
    pub outcomes: Vec<OperationOutcome>,
    /// Failed subset of `outcomes`, in submission order
    pub errors: Vec<OperationOutcome>,
}

impl BatchSummary {
    /// Summary of a batch with nothing to do
    #[must_use]
    pub fn empty() -> Self {
        Self {
            success: true,
            total_operations: 0,
            successful_operations: 0,
            failed_operations: 0,
            chunk_count: 0,
            outcomes: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Look up the outcome for an operation id
    #[must_use]
    pub fn outcome(&self, id: &OperationId) -> Option<&OperationOutcome> {
        self.outcomes.iter().find(|o| o.operation_id() == id)
    }

    /// Ids of failed operations, for selective retry
    #[must_use]
    pub fn failed_ids(&self) -> Vec<&OperationId> {
        self.errors.iter().map(OperationOutcome::operation_id).collect()
    }

    /// Failed outcomes grouped by collection name
    #[must_use]
    pub fn failures_by_collection(&self) -> BTreeMap<&str, Vec<&OperationOutcome>> {
        let mut grouped: BTreeMap<&str, Vec<&OperationOutcome>> = BTreeMap::new();
        for outcome in &self.errors {
            grouped.entry(outcome.collection()).or_default().push(outcome);
        }
        grouped
    }
}

impl Default for BatchSummary {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_carries_data_only() {
        let outcome = OperationOutcome::succeeded(
            OperationId::from("a"),
            "Tasks",
            Some(OperationKind::Add),
            json!({"id": 1}),
        );
        assert!(outcome.is_success());
        assert!(outcome.data().is_some());
        assert!(outcome.error_message().is_none());
        assert!(outcome.failure().is_none());
    }

    #[test]
    fn failure_carries_message_only() {
        let outcome = OperationOutcome::failed(
            OperationId::from("a"),
            "Tasks",
            None,
            FailureCause::LocalValidation,
            "bad",
        );
        assert!(!outcome.is_success());
        assert!(outcome.data().is_none());
        assert_eq!(outcome.error_message(), Some("bad"));
    }

    #[test]
    fn outcome_serializes_camel_case_without_absent_fields() {
        let outcome = OperationOutcome::failed(
            OperationId::from("Tasks_1_0"),
            "Tasks",
            Some(OperationKind::Delete),
            FailureCause::ChunkTransport,
            "connection reset",
        );
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["operationId"], "Tasks_1_0");
        assert_eq!(value["errorMessage"], "connection reset");
        assert_eq!(value["failure"], "chunkTransport");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn empty_summary_is_successful() {
        let summary = BatchSummary::empty();
        assert!(summary.success);
        assert_eq!(summary.total_operations, 0);
        assert!(summary.outcomes.is_empty());
        assert!(summary.errors.is_empty());
    }

    #[test]
    fn serialized_outcomes_read_back() {
        let ok = OperationOutcome::succeeded(
            OperationId::from("a"),
            "Tasks",
            Some(OperationKind::Add),
            Value::Null,
        );
        let failed = OperationOutcome::failed(
            OperationId::from("b"),
            "Docs",
            None,
            FailureCause::ChunkTransport,
            "socket hang up",
        );

        for outcome in [ok, failed] {
            let text = serde_json::to_string(&outcome).unwrap();
            let back: OperationOutcome = serde_json::from_str(&text).unwrap();
            assert_eq!(back, outcome);
        }
    }

    #[test]
    fn contradictory_outcome_is_refused() {
        let both = json!({
            "operationId": "a",
            "collection": "Tasks",
            "success": true,
            "data": {},
            "errorMessage": "conflict",
            "failure": "operation"
        });
        let err = serde_json::from_value::<OperationOutcome>(both).unwrap_err();
        assert!(err.to_string().contains("must not carry errorMessage"));

        let silent_failure = json!({ "operationId": "b", "collection": "Tasks", "success": false });
        assert!(serde_json::from_value::<OperationOutcome>(silent_failure).is_err());
    }
}
