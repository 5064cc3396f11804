//! Error types module
//!
//! Transformation failures carry a classification that decides how they
//! propagate: validation and decode problems are permanent and surface to the
//! caller, while storage I/O is transient and eligible for the job manager's
//! retry policy.

use serde::Serialize;

use crate::models::operation::OperationKind;

/// Rejection of an operation spec or a whole pipeline before anything runs.
///
/// `kind` is `None` for pipeline-level problems (empty input, over-long
/// pipeline); otherwise it names the offending operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub kind: Option<OperationKind>,
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn for_operation(kind: OperationKind, field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            field,
            reason: reason.into(),
        }
    }

    pub fn for_pipeline(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            kind: None,
            field,
            reason: reason.into(),
        }
    }
}

/// Classified transformation failure.
///
/// Only the `Storage` class is retryable: dimension and cost ceilings do not
/// change between attempts, and corrupt sources stay corrupt.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransformError {
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("failed to decode source image: {0}")]
    DecodeFailure(String),

    #[error("resource limit exceeded: {0}")]
    ResourceExceeded(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl TransformError {
    /// Machine-readable error class recorded on failed jobs.
    pub fn class(&self) -> &'static str {
        match self {
            TransformError::UnsupportedOperation(_) => "unsupported_operation",
            TransformError::InvalidParameters(_) => "invalid_parameters",
            TransformError::DecodeFailure(_) => "decode_failure",
            TransformError::ResourceExceeded(_) => "resource_exceeded",
            TransformError::Storage(_) => "storage_error",
        }
    }

    /// Whether the job manager may retry a job that failed with this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransformError::Storage(_))
    }
}
