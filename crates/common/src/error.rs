//! Error taxonomy shared by all services.

use serde::{Deserialize, Serialize};

/// Category of a failure, independent of the crate that produced it.
///
/// Domain errors expose a `kind()` so the HTTP layers can map any of them
/// onto a status code without knowing every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed request or failed validation.
    InvalidInput,
    /// The aggregate does not exist.
    NotFound,
    /// Illegal state transition or uniqueness violation.
    Conflict,
    /// A provider or downstream service failed; the call can be retried.
    ServiceUnavailable,
    /// Local persistence failure.
    Database,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// HTTP status code conventionally used for this kind.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::InvalidInput => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::ServiceUnavailable => 503,
            ErrorKind::Database | ErrorKind::Internal => 500,
        }
    }

    /// Returns true if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::ServiceUnavailable | ErrorKind::Database)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Database => "database_error",
            ErrorKind::Internal => "internal_server_error",
        };
        f.write_str(name)
    }
}
