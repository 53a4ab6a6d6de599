//! Core identifier and value types
//!
//! Defines the small vocabulary shared by every layer of the engine:
//! - Operation identifiers used to correlate submissions with outcomes
//! - Record identifiers in a remote collection
//! - Pre-formatted form field values
//! - The closed set of operation kinds

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier assigned to an operation when it is queued
///
/// Built from the collection name, a monotonically increasing counter and a
/// millisecond timestamp, so ids are distinct within one build session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    /// Generate an id for the `sequence`-th operation queued against `collection`
    #[inline]
    #[must_use]
    pub fn generate(collection: &str, sequence: u64) -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        Self(format!("{collection}_{sequence}_{millis}"))
    }

    /// Borrow the id as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Record identifier inside a remote collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl RecordId {
    /// Get the numeric value
    #[inline]
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One pre-formatted field for the validate-and-write operations
///
/// Values arrive already marshalled to the store's string form; the engine
/// never interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    /// Internal field name
    pub name: String,
    /// Formatted value
    pub value: String,
}

impl FieldValue {
    /// Create a new field value
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Operation kinds understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    /// Create a record from a payload
    Add,
    /// Merge a payload into an existing record
    Update,
    /// Remove a record
    Delete,
    /// Validate form fields and create a record under a folder path
    ValidateAddByPath,
    /// Validate form fields and write them to an existing record
    ValidateUpdateById,
}

impl OperationKind {
    /// All kinds, in declaration order
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Add,
        OperationKind::Update,
        OperationKind::Delete,
        OperationKind::ValidateAddByPath,
        OperationKind::ValidateUpdateById,
    ];

    /// Wire label of this kind
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Add => "add",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::ValidateAddByPath => "validateAddByPath",
            OperationKind::ValidateUpdateById => "validateUpdateById",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    /// Parse a kind label, ignoring case; `addValidateByPath` is accepted as
    /// an alias of `validateAddByPath`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "add" => Ok(OperationKind::Add),
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            "validateaddbypath" | "addvalidatebypath" => Ok(OperationKind::ValidateAddByPath),
            "validateupdatebyid" => Ok(OperationKind::ValidateUpdateById),
            _ => Err(s.to_string()),
        }
    }
}
