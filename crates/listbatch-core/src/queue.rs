//! Per-collection operation queue
//!
//! A thin builder handle over the orchestrator's build state. Every mutator
//! appends straight into the orchestrator's ordered operation list, so
//! nothing depends on the order in which collections are requested.

use crate::operation::{OperationBody, OperationDraft, OperationRequest};
use crate::orchestrator::BatchOrchestrator;
use crate::types::{FieldValue, OperationId, RecordId};
use serde_json::Value;

/// Fluent builder for operations against one collection
#[derive(Debug)]
pub struct OperationQueue<'a> {
    orchestrator: &'a BatchOrchestrator,
    collection: String,
    last: Option<OperationId>,
}

impl<'a> OperationQueue<'a> {
    pub(crate) fn new(orchestrator: &'a BatchOrchestrator, collection: String) -> Self {
        Self {
            orchestrator,
            collection,
            last: None,
        }
    }

    fn push(&mut self, body: OperationBody) -> &mut Self {
        let id = self.orchestrator.enqueue(&self.collection, body);
        self.last = Some(id);
        self
    }

    fn push_request(&mut self, request: OperationRequest) -> &mut Self {
        self.push(OperationBody::Ready(request))
    }

    /// Collection this queue writes to
    #[inline]
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Id of the last operation queued through this handle
    #[inline]
    #[must_use]
    pub fn last_operation_id(&self) -> Option<&OperationId> {
        self.last.as_ref()
    }

    /// Queue a record creation
    pub fn add(&mut self, payload: Value) -> &mut Self {
        self.push_request(OperationRequest::Add { payload })
    }

    /// Queue a record update; the token is passed through untouched
    pub fn update(
        &mut self,
        record_id: u64,
        payload: Value,
        concurrency_token: Option<&str>,
    ) -> &mut Self {
        self.push_request(OperationRequest::Update {
            record_id: RecordId(record_id),
            payload,
            concurrency_token: concurrency_token.map(str::to_string),
        })
    }

    /// Queue a record deletion; the token is passed through untouched
    pub fn delete(&mut self, record_id: u64, concurrency_token: Option<&str>) -> &mut Self {
        self.push_request(OperationRequest::Delete {
            record_id: RecordId(record_id),
            concurrency_token: concurrency_token.map(str::to_string),
        })
    }

    /// Queue a validated creation under a folder path
    pub fn add_validate_by_path(
        &mut self,
        form_fields: Vec<FieldValue>,
        path: impl Into<String>,
    ) -> &mut Self {
        self.push_request(OperationRequest::ValidateAddByPath {
            form_fields,
            path: path.into(),
        })
    }

    /// Queue a validated update of an existing record
    pub fn validate_update_by_id(
        &mut self,
        record_id: u64,
        form_fields: Vec<FieldValue>,
    ) -> &mut Self {
        self.push_request(OperationRequest::ValidateUpdateById {
            record_id: RecordId(record_id),
            form_fields,
        })
    }

    /// Queue a loosely typed operation
    ///
    /// Drafts missing a field their kind requires still get an id; they fail
    /// locally when the batch runs without affecting other operations.
    pub fn push_draft(&mut self, draft: OperationDraft) -> &mut Self {
        self.push(OperationBody::from(draft))
    }
}

#[cfg(test)]
mod tests {
    use crate::operation::OperationBody;
    use crate::types::{FieldValue, OperationKind};
    use crate::{BatchOrchestrator, OperationDraft};
    use serde_json::json;

    #[test]
    fn mutators_chain_and_append_in_order() {
        let orchestrator = BatchOrchestrator::detached();
        orchestrator
            .for_collection("Tasks")
            .add(json!({"Title": "A"}))
            .update(5, json!({"Title": "B"}), Some("\"2\""))
            .delete(6, None)
            .add_validate_by_path(vec![FieldValue::new("Title", "C")], "/Tasks/Archive")
            .validate_update_by_id(7, vec![FieldValue::new("Status", "Done")]);

        let kinds: Vec<_> = orchestrator
            .pending_operations()
            .iter()
            .map(|op| op.kind().unwrap())
            .collect();
        assert_eq!(kinds, OperationKind::ALL.to_vec());
    }

    #[test]
    fn last_operation_id_tracks_handle() {
        let orchestrator = BatchOrchestrator::detached();
        let mut tasks = orchestrator.for_collection("Tasks");
        assert!(tasks.last_operation_id().is_none());
        tasks.add(json!({}));
        let first = tasks.last_operation_id().cloned().unwrap();
        tasks.add(json!({}));
        assert_ne!(tasks.last_operation_id(), Some(&first));
    }

    #[test]
    fn draft_with_missing_field_is_kept_as_rejected() {
        let orchestrator = BatchOrchestrator::detached();
        orchestrator
            .for_collection("Tasks")
            .push_draft(OperationDraft::new("delete"));

        let pending = orchestrator.pending_operations();
        assert_eq!(pending.len(), 1);
        assert!(matches!(pending[0].body, OperationBody::Rejected { .. }));
    }

    #[test]
    fn interleaved_collections_are_never_dropped() {
        let orchestrator = BatchOrchestrator::detached();
        let mut tasks = orchestrator.for_collection("Tasks");
        let mut docs = orchestrator.for_collection("Docs");
        tasks.add(json!({"n": 1}));
        docs.delete(10, None);
        tasks.add(json!({"n": 2}));

        let collections: Vec<String> = orchestrator
            .pending_operations()
            .into_iter()
            .map(|op| op.collection)
            .collect();
        assert_eq!(collections, vec!["Tasks", "Docs", "Tasks"]);
    }
}
