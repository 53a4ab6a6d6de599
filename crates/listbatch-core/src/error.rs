//! Error types for the batch engine
//!
//! Failures are split by the granularity at which they strike:
//! - Local validation of a single operation (never leaves `execute`)
//! - Per-operation rejection by the backend
//! - Transport failure of a whole chunk's network call
//! - Invalid engine configuration (the only error `execute` returns)

use crate::types::OperationKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Operation rejected before any network call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocalValidationError {
    /// A field required by the kind is absent
    #[error("{kind} operation is missing required field `{field}`")]
    MissingField {
        kind: OperationKind,
        field: &'static str,
    },

    /// Kind label not recognized
    #[error("unsupported operation kind `{0}`")]
    UnsupportedKind(String),

    /// Payload present but not a JSON object
    #[error("{kind} payload must be a JSON object")]
    PayloadNotObject { kind: OperationKind },

    /// Required field present but empty
    #[error("{kind} operation has an empty `{field}`")]
    EmptyField {
        kind: OperationKind,
        field: &'static str,
    },
}

/// Backend refused to register an operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// Collection name could not be resolved
    #[error("collection not found: {0}")]
    UnknownCollection(String),

    /// Backend does not support the operation
    #[error("unsupported by backend: {0}")]
    Unsupported(String),

    /// Operation failed local checks
    #[error(transparent)]
    Invalid(#[from] LocalValidationError),
}

/// Backend resolved one operation with a failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct OperationError {
    /// Error message reported by the store
    pub message: String,
    /// Status code, when the store reports one
    pub status: Option<u16>,
}

impl OperationError {
    /// Create an error without status
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    /// Attach a status code
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// Network call for a whole chunk failed before per-operation resolution
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    /// Error message from the transport
    pub message: String,
}

impl TransportError {
    /// Create a transport error
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Engine configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Chunk size must be at least one
    #[error("maxOperationsPerChunk must be greater than zero")]
    ZeroChunkSize,

    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config text is not valid TOML for `EngineConfig`
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Layered keys do not form a valid `EngineConfig`
    #[error("invalid config value: {0}")]
    Value(#[from] serde_json::Error),
}

/// Errors returned by `BatchOrchestrator::execute`
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// Configuration rejected before anything was dispatched
    #[error("invalid engine configuration: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_names_the_field() {
        let err = LocalValidationError::MissingField {
            kind: OperationKind::Update,
            field: "recordId",
        };
        assert_eq!(
            err.to_string(),
            "update operation is missing required field `recordId`"
        );
    }

    #[test]
    fn registration_error_is_transparent_over_validation() {
        let err: RegistrationError = LocalValidationError::UnsupportedKind("merge".into()).into();
        assert_eq!(err.to_string(), "unsupported operation kind `merge`");
    }

    #[test]
    fn batch_error_wraps_config() {
        let err: BatchError = ConfigError::ZeroChunkSize.into();
        assert!(err.to_string().contains("maxOperationsPerChunk"));
    }
}
