//! HTTP handlers of the order and payment services.

pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;

use std::str::FromStr;

use crate::error::ApiError;

/// Parses a path or query id, answering 400 on malformed input.
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid {what}: {raw}")))
}

/// Parses every id of a batch request.
pub(crate) fn parse_ids<T: FromStr>(raw: &[String], what: &str) -> Result<Vec<T>, ApiError> {
    raw.iter().map(|id| parse_id(id, what)).collect()
}
