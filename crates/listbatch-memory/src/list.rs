//! List state and record-level write semantics

use listbatch_core::{FieldValue, OperationError, OperationRequest, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

const REQUIRED_FIELD_MESSAGE: &str = "You must specify a value for this required field.";

/// A record as stored in a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    /// Record id, unique within the list
    pub id: u64,
    /// Quoted version tag, e.g. `"3"`
    pub etag: String,
    /// Folder path holding the record
    pub path: String,
    /// Field values
    pub fields: Map<String, Value>,
    #[serde(skip)]
    version: u64,
}

impl StoredRecord {
    fn new(id: u64, path: String, fields: Map<String, Value>) -> Self {
        Self {
            id,
            etag: etag(1),
            path,
            fields,
            version: 1,
        }
    }

    fn bump(&mut self) {
        self.version += 1;
        self.etag = etag(self.version);
    }

    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn etag(version: u64) -> String {
    format!("\"{version}\"")
}

/// Per-field outcome of a validated write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldResult {
    /// Internal field name
    pub field_name: String,
    /// Submitted value
    pub field_value: String,
    /// Whether the value was refused
    pub has_exception: bool,
    /// Reason the value was refused
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl FieldResult {
    fn ok(field: &FieldValue) -> Self {
        Self {
            field_name: field.name.clone(),
            field_value: field.value.clone(),
            has_exception: false,
            error_message: None,
        }
    }

    fn required(name: &str, value: &str) -> Self {
        Self {
            field_name: name.to_string(),
            field_value: value.to_string(),
            has_exception: true,
            error_message: Some(REQUIRED_FIELD_MESSAGE.to_string()),
        }
    }
}

#[derive(Debug)]
pub(crate) struct ListState {
    pub(crate) key: String,
    pub(crate) name: String,
    root: String,
    required_fields: Vec<String>,
    records: BTreeMap<u64, StoredRecord>,
    next_id: u64,
}

impl ListState {
    pub(crate) fn new(key: String, name: &str, required_fields: &[&str]) -> Self {
        Self {
            key,
            name: name.to_string(),
            root: format!("/Lists/{name}"),
            required_fields: required_fields.iter().map(|f| (*f).to_string()).collect(),
            records: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub(crate) fn record(&self, id: u64) -> Option<&StoredRecord> {
        self.records.get(&id)
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &StoredRecord> {
        self.records.values()
    }

    pub(crate) fn insert(
        &mut self,
        fields: Map<String, Value>,
        path: Option<&str>,
    ) -> &StoredRecord {
        let id = self.next_id;
        self.next_id += 1;
        let path = self.resolve_path(path);
        self.records
            .entry(id)
            .or_insert_with(|| StoredRecord::new(id, path, fields))
    }

    fn resolve_path(&self, path: Option<&str>) -> String {
        match path.map(str::trim) {
            None | Some("") => self.root.clone(),
            Some(p) if p.starts_with('/') => p.trim_end_matches('/').to_string(),
            Some(p) => format!("{}/{}", self.root, p.trim_matches('/')),
        }
    }

    fn existing_mut(&mut self, id: RecordId) -> Result<&mut StoredRecord, OperationError> {
        self.records.get_mut(&id.value()).ok_or_else(|| {
            OperationError::new(format!(
                "Item {id} does not exist in list '{}'. It may have been deleted by another user.",
                self.name
            ))
            .with_status(404)
        })
    }

    fn validate_fields(&self, form_fields: &[FieldValue], creating: bool) -> Vec<FieldResult> {
        let mut results: Vec<FieldResult> = form_fields
            .iter()
            .map(|field| {
                if self.is_required(&field.name) && field.value.trim().is_empty() {
                    FieldResult::required(&field.name, &field.value)
                } else {
                    FieldResult::ok(field)
                }
            })
            .collect();

        if creating {
            for required in &self.required_fields {
                if !form_fields.iter().any(|f| &f.name == required) {
                    results.push(FieldResult::required(required, ""));
                }
            }
        }
        results
    }

    fn is_required(&self, name: &str) -> bool {
        self.required_fields.iter().any(|f| f == name)
    }

    /// Apply one request; the returned value becomes the operation's data
    pub(crate) fn apply(&mut self, request: &OperationRequest) -> Result<Value, OperationError> {
        match request {
            OperationRequest::Add { payload } => {
                let fields = object(payload)?;
                Ok(self.insert(fields, None).to_value())
            }
            OperationRequest::Update {
                record_id,
                payload,
                concurrency_token,
            } => {
                let fields = object(payload)?;
                let record = self.existing_mut(*record_id)?;
                check_token(record, concurrency_token.as_deref())?;
                record.fields.extend(fields);
                record.bump();
                Ok(record.to_value())
            }
            OperationRequest::Delete {
                record_id,
                concurrency_token,
            } => {
                let record = self.existing_mut(*record_id)?;
                check_token(record, concurrency_token.as_deref())?;
                self.records.remove(&record_id.value());
                Ok(json!({ "id": record_id, "deleted": true }))
            }
            OperationRequest::ValidateAddByPath { form_fields, path } => {
                let results = self.validate_fields(form_fields, true);
                reject_exceptions(&results)?;
                let record = self.insert(field_map(form_fields), Some(path));
                Ok(json!({ "id": record.id, "path": record.path, "fieldResults": results }))
            }
            OperationRequest::ValidateUpdateById {
                record_id,
                form_fields,
            } => {
                let results = self.validate_fields(form_fields, false);
                // existence is checked before field validation
                self.existing_mut(*record_id)?;
                reject_exceptions(&results)?;
                let record = self.existing_mut(*record_id)?;
                record.fields.extend(field_map(form_fields));
                record.bump();
                Ok(json!({ "id": record.id, "fieldResults": results }))
            }
        }
    }
}

fn object(payload: &Value) -> Result<Map<String, Value>, OperationError> {
    payload
        .as_object()
        .cloned()
        .ok_or_else(|| OperationError::new("Payload must be a JSON object.").with_status(400))
}

fn field_map(form_fields: &[FieldValue]) -> Map<String, Value> {
    form_fields
        .iter()
        .map(|f| (f.name.clone(), Value::String(f.value.clone())))
        .collect()
}

fn check_token(record: &StoredRecord, token: Option<&str>) -> Result<(), OperationError> {
    match token {
        None | Some("*") => Ok(()),
        Some(token) if token == record.etag => Ok(()),
        Some(token) => Err(OperationError::new(format!(
            "The request ETag value '{token}' does not match the object's ETag value '{}'.",
            record.etag
        ))
        .with_status(412)),
    }
}

fn reject_exceptions(results: &[FieldResult]) -> Result<(), OperationError> {
    let messages: Vec<String> = results
        .iter()
        .filter(|r| r.has_exception)
        .map(|r| {
            format!(
                "{}: {}",
                r.field_name,
                r.error_message.as_deref().unwrap_or("invalid value")
            )
        })
        .collect();
    if messages.is_empty() {
        Ok(())
    } else {
        Err(OperationError::new(messages.join("; ")).with_status(400))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list() -> ListState {
        ListState::new("key".into(), "Tasks", &["Title"])
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn add_assigns_sequential_ids() {
        let mut list = list();
        let first = list.apply(&OperationRequest::Add { payload: json!({"Title": "a"}) }).unwrap();
        let second = list.apply(&OperationRequest::Add { payload: json!({"Title": "b"}) }).unwrap();
        assert_eq!(first["id"], 1);
        assert_eq!(second["id"], 2);
        assert_eq!(second["path"], "/Lists/Tasks");
    }

    #[test]
    fn update_with_stale_etag_is_rejected() {
        let mut list = list();
        list.insert(fields(json!({"Title": "a"})), None);
        list.apply(&OperationRequest::Update {
            record_id: RecordId(1),
            payload: json!({"Title": "b"}),
            concurrency_token: Some("\"1\"".into()),
        })
        .unwrap();

        let err = list
            .apply(&OperationRequest::Update {
                record_id: RecordId(1),
                payload: json!({"Title": "c"}),
                concurrency_token: Some("\"1\"".into()),
            })
            .unwrap_err();

        assert_eq!(err.status, Some(412));
        assert_eq!(list.record(1).unwrap().fields["Title"], "b");
    }

    #[test]
    fn wildcard_token_always_matches() {
        let mut list = list();
        list.insert(fields(json!({"Title": "a"})), None);
        let result = list.apply(&OperationRequest::Delete {
            record_id: RecordId(1),
            concurrency_token: Some("*".into()),
        });
        assert!(result.is_ok());
        assert!(list.record(1).is_none());
    }

    #[test]
    fn delete_missing_record_is_not_found() {
        let err = list()
            .apply(&OperationRequest::Delete {
                record_id: RecordId(9),
                concurrency_token: None,
            })
            .unwrap_err();
        assert_eq!(err.status, Some(404));
    }

    #[test]
    fn validate_add_reports_missing_required_field() {
        let mut list = list();
        let err = list
            .apply(&OperationRequest::ValidateAddByPath {
                form_fields: vec![FieldValue::new("Status", "Open")],
                path: "Archive".into(),
            })
            .unwrap_err();
        assert!(err.message.starts_with("Title: You must specify"));
        assert_eq!(list.records().count(), 0);
    }

    #[test]
    fn validate_add_places_record_under_folder() {
        let mut list = list();
        let data = list
            .apply(&OperationRequest::ValidateAddByPath {
                form_fields: vec![FieldValue::new("Title", "x")],
                path: "Archive/2024".into(),
            })
            .unwrap();
        assert_eq!(data["path"], "/Lists/Tasks/Archive/2024");
        assert_eq!(data["fieldResults"][0]["hasException"], false);
    }

    #[test]
    fn validate_update_rejects_blank_required_value() {
        let mut list = list();
        list.insert(fields(json!({"Title": "a"})), None);
        let err = list
            .apply(&OperationRequest::ValidateUpdateById {
                record_id: RecordId(1),
                form_fields: vec![FieldValue::new("Title", " ")],
            })
            .unwrap_err();
        assert_eq!(err.status, Some(400));
        assert_eq!(list.record(1).unwrap().etag, "\"1\"");
    }

    #[test]
    fn validate_update_bumps_etag() {
        let mut list = list();
        list.insert(fields(json!({"Title": "a"})), None);
        list.apply(&OperationRequest::ValidateUpdateById {
            record_id: RecordId(1),
            form_fields: vec![FieldValue::new("Status", "Done")],
        })
        .unwrap();
        let record = list.record(1).unwrap();
        assert_eq!(record.etag, "\"2\"");
        assert_eq!(record.fields["Status"], "Done");
    }
}
