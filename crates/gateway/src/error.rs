//! Loader and HTTP error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::ErrorKind;
use thiserror::Error;

/// Failure of a single key in a batch load.
///
/// Cloned to every caller waiting on the same batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The downstream answered but did not return this key.
    #[error("{resource} not found: {key}")]
    NotFound { resource: &'static str, key: String },

    /// The downstream call failed; every key of the batch gets this error.
    #[error("{resource} service error: {message}")]
    Downstream {
        resource: &'static str,
        message: String,
    },

    /// The downstream returned a client error status.
    #[error("{resource} service rejected the request ({status}): {message}")]
    Rejected {
        resource: &'static str,
        status: u16,
        message: String,
    },

    /// The batch was abandoned before it produced a result.
    #[error("batch for {0} was cancelled")]
    Cancelled(&'static str),
}

impl LoadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoadError::NotFound { .. } => ErrorKind::NotFound,
            LoadError::Rejected { status: 400, .. } => ErrorKind::InvalidInput,
            LoadError::Rejected { status: 404, .. } => ErrorKind::NotFound,
            LoadError::Downstream { .. } | LoadError::Rejected { .. } => {
                ErrorKind::ServiceUnavailable
            }
            LoadError::Cancelled(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LoadError::NotFound { .. })
    }
}

/// Gateway error rendered as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }
}

impl From<LoadError> for ApiError {
    fn from(err: LoadError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.kind.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(kind = %self.kind, error = %self.message, "gateway request failed");
        }
        let body = serde_json::json!({ "error": self.message });
        (status, axum::Json(body)).into_response()
    }
}
