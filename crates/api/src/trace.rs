//! Trace id propagation from incoming requests.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use event_bus::TraceId;

/// Header carrying the caller's trace id.
pub const TRACE_HEADER: &str = "x-trace-id";

/// Trace id of the current request.
///
/// Taken from the `x-trace-id` header when present, otherwise freshly
/// generated. Events published while handling the request carry it.
#[derive(Debug, Clone)]
pub struct RequestTrace(pub TraceId);

impl<S: Send + Sync> FromRequestParts<S> for RequestTrace {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let trace_id = parts
            .headers
            .get(TRACE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(TraceId::from_string)
            .unwrap_or_else(TraceId::new);
        Ok(Self(trace_id))
    }
}
