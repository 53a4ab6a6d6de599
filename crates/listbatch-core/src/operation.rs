//! Operation model
//!
//! `OperationRequest` is the typed form: one variant per kind, each carrying
//! exactly the fields that kind needs. `OperationDraft` is the loosely typed
//! form produced by plan files and upstream JSON; converting a draft performs
//! the required-field checks.

use crate::error::LocalValidationError;
use crate::types::{FieldValue, OperationId, OperationKind, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A write against one collection, with exactly the fields its kind requires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OperationRequest {
    /// Create a record
    Add { payload: Value },
    /// Merge a payload into a record
    Update {
        record_id: RecordId,
        payload: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        concurrency_token: Option<String>,
    },
    /// Remove a record
    Delete {
        record_id: RecordId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        concurrency_token: Option<String>,
    },
    /// Validate fields and create a record under `path`
    ValidateAddByPath {
        form_fields: Vec<FieldValue>,
        path: String,
    },
    /// Validate fields and write them to a record
    ValidateUpdateById {
        record_id: RecordId,
        form_fields: Vec<FieldValue>,
    },
}

impl OperationRequest {
    /// Kind of this request
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::Add { .. } => OperationKind::Add,
            OperationRequest::Update { .. } => OperationKind::Update,
            OperationRequest::Delete { .. } => OperationKind::Delete,
            OperationRequest::ValidateAddByPath { .. } => OperationKind::ValidateAddByPath,
            OperationRequest::ValidateUpdateById { .. } => OperationKind::ValidateUpdateById,
        }
    }

    /// Target record, for kinds that address an existing record
    #[must_use]
    pub fn record_id(&self) -> Option<RecordId> {
        match self {
            OperationRequest::Update { record_id, .. }
            | OperationRequest::Delete { record_id, .. }
            | OperationRequest::ValidateUpdateById { record_id, .. } => Some(*record_id),
            OperationRequest::Add { .. } | OperationRequest::ValidateAddByPath { .. } => None,
        }
    }

    /// Concurrency token passed through to the backend
    #[must_use]
    pub fn concurrency_token(&self) -> Option<&str> {
        match self {
            OperationRequest::Update {
                concurrency_token, ..
            }
            | OperationRequest::Delete {
                concurrency_token, ..
            } => concurrency_token.as_deref(),
            _ => None,
        }
    }

    /// Shape checks the type system cannot express
    ///
    /// Run at registration time, before the request reaches the backend.
    ///
    /// # Errors
    /// - `PayloadNotObject` if an add/update payload is not a JSON object
    /// - `EmptyField` if a validate operation has no fields or an empty path
    pub fn check(&self) -> Result<(), LocalValidationError> {
        let kind = self.kind();
        match self {
            OperationRequest::Add { payload } | OperationRequest::Update { payload, .. } => {
                if payload.is_object() {
                    Ok(())
                } else {
                    Err(LocalValidationError::PayloadNotObject { kind })
                }
            }
            OperationRequest::Delete { .. } => Ok(()),
            OperationRequest::ValidateAddByPath { form_fields, path } => {
                if form_fields.is_empty() {
                    Err(LocalValidationError::EmptyField {
                        kind,
                        field: "formFields",
                    })
                } else if path.trim().is_empty() {
                    Err(LocalValidationError::EmptyField { kind, field: "path" })
                } else {
                    Ok(())
                }
            }
            OperationRequest::ValidateUpdateById { form_fields, .. } => {
                if form_fields.is_empty() {
                    Err(LocalValidationError::EmptyField {
                        kind,
                        field: "formFields",
                    })
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Loosely typed operation as it arrives from JSON
///
/// Every field but `kind` is optional; `TryFrom<OperationDraft>` decides
/// whether the combination is valid for the kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDraft {
    /// Kind label (`add`, `update`, `delete`, `validateAddByPath`, `validateUpdateById`)
    pub kind: String,
    /// Target record
    #[serde(default)]
    pub record_id: Option<u64>,
    /// Payload for add/update
    #[serde(default)]
    pub payload: Option<Value>,
    /// Fields for the validate operations
    #[serde(default)]
    pub form_fields: Option<Vec<FieldValue>>,
    /// Folder path for `validateAddByPath`
    #[serde(default)]
    pub path: Option<String>,
    /// Concurrency token for update/delete
    #[serde(default)]
    pub concurrency_token: Option<String>,
}

impl OperationDraft {
    /// Create a draft of the given kind with no fields
    #[inline]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// With record id
    #[inline]
    #[must_use]
    pub fn with_record_id(mut self, record_id: u64) -> Self {
        self.record_id = Some(record_id);
        self
    }

    /// With payload
    #[inline]
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// With form fields
    #[inline]
    #[must_use]
    pub fn with_form_fields(mut self, form_fields: Vec<FieldValue>) -> Self {
        self.form_fields = Some(form_fields);
        self
    }

    /// With folder path
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// With concurrency token
    #[inline]
    #[must_use]
    pub fn with_concurrency_token(mut self, token: impl Into<String>) -> Self {
        self.concurrency_token = Some(token.into());
        self
    }

    /// Parsed kind, if the label is recognized
    #[must_use]
    pub fn parsed_kind(&self) -> Option<OperationKind> {
        self.kind.parse().ok()
    }
}

fn required<T>(
    value: Option<T>,
    kind: OperationKind,
    field: &'static str,
) -> Result<T, LocalValidationError> {
    value.ok_or(LocalValidationError::MissingField { kind, field })
}

impl TryFrom<OperationDraft> for OperationRequest {
    type Error = LocalValidationError;

    fn try_from(draft: OperationDraft) -> Result<Self, Self::Error> {
        let kind: OperationKind = draft
            .kind
            .parse()
            .map_err(LocalValidationError::UnsupportedKind)?;

        let request = match kind {
            OperationKind::Add => OperationRequest::Add {
                payload: required(draft.payload, kind, "payload")?,
            },
            OperationKind::Update => OperationRequest::Update {
                record_id: RecordId(required(draft.record_id, kind, "recordId")?),
                payload: required(draft.payload, kind, "payload")?,
                concurrency_token: draft.concurrency_token,
            },
            OperationKind::Delete => OperationRequest::Delete {
                record_id: RecordId(required(draft.record_id, kind, "recordId")?),
                concurrency_token: draft.concurrency_token,
            },
            OperationKind::ValidateAddByPath => OperationRequest::ValidateAddByPath {
                form_fields: required(draft.form_fields, kind, "formFields")?,
                path: required(draft.path, kind, "path")?,
            },
            OperationKind::ValidateUpdateById => OperationRequest::ValidateUpdateById {
                record_id: RecordId(required(draft.record_id, kind, "recordId")?),
                form_fields: required(draft.form_fields, kind, "formFields")?,
            },
        };

        Ok(request)
    }
}

/// Body of a queued operation
#[derive(Debug, Clone, PartialEq)]
pub enum OperationBody {
    /// Ready to register with the backend
    Ready(OperationRequest),
    /// Draft that failed conversion; fails locally when its chunk runs
    Rejected {
        /// Kind, if the label was recognized
        kind: Option<OperationKind>,
        /// Why the draft was rejected
        error: LocalValidationError,
    },
}

impl From<OperationDraft> for OperationBody {
    fn from(draft: OperationDraft) -> Self {
        let kind = draft.parsed_kind();
        match OperationRequest::try_from(draft) {
            Ok(request) => OperationBody::Ready(request),
            Err(error) => OperationBody::Rejected { kind, error },
        }
    }
}

/// One queued write against a named collection
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Correlation id, unique within the build session
    pub id: OperationId,
    /// Target collection name
    pub collection: String,
    /// Request or local rejection
    pub body: OperationBody,
}

impl Operation {
    /// Kind of the operation, if known
    #[must_use]
    pub fn kind(&self) -> Option<OperationKind> {
        match &self.body {
            OperationBody::Ready(request) => Some(request.kind()),
            OperationBody::Rejected { kind, .. } => *kind,
        }
    }

    /// Typed request, if the operation is registrable
    #[must_use]
    pub fn request(&self) -> Option<&OperationRequest> {
        match &self.body {
            OperationBody::Ready(request) => Some(request),
            OperationBody::Rejected { .. } => None,
        }
    }
}
