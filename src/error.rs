//! Error types
//!
//! Domain errors surfaced by the event handler. Benign outcomes (a missing
//! review pipeline, an execution with no recorded pull request) are not
//! errors and never appear here.

use thiserror::Error;

/// Errors that abort the handling of one inbound event
#[derive(Debug, Error)]
pub enum ValidatorError {
    /// Inbound envelope or detail payload could not be decoded
    #[error("Failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Envelope carries a detail type this handler does not understand
    #[error("Unsupported event detail type: {0}")]
    UnsupportedDetailType(String),

    /// A decoded payload lacks a field the handler cannot do without
    #[error("{what} is missing {field}")]
    MissingField {
        what: &'static str,
        field: &'static str,
    },

    /// Execution record components would corrupt the composite key
    #[error("Invalid execution record: {0}")]
    InvalidRecord(String),

    /// Source control, pipeline or store call failed
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl ValidatorError {
    /// Whether the error was caused by the inbound payload rather than a collaborator
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            ValidatorError::Decode { .. }
                | ValidatorError::UnsupportedDetailType(_)
                | ValidatorError::MissingField { .. }
        )
    }
}

/// Failure reported by (or while talking to) an external service
#[derive(Debug, Clone, Error)]
#[error("{service} {operation} failed: {message}")]
pub struct UpstreamError {
    /// Service name (codecommit, codepipeline, s3)
    pub service: &'static str,
    /// API operation name
    pub operation: &'static str,
    /// HTTP status, if a response was received
    pub status: Option<u16>,
    /// Service error code (e.g. `PipelineNotFoundException`)
    pub code: Option<String>,
    /// Human readable message
    pub message: String,
}

impl UpstreamError {
    /// Create an error for a request that never produced a response
    pub fn transport(
        service: &'static str,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            service,
            operation,
            status: None,
            code: None,
            message: message.into(),
        }
    }

    /// Create an error from a service error response
    pub fn service(
        service: &'static str,
        operation: &'static str,
        status: u16,
        code: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            service,
            operation,
            status: Some(status),
            code,
            message: message.into(),
        }
    }

    /// Check the service error code
    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}
