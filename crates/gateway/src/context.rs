//! Per-request context: the caller's credential and a fresh loader set.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::client::Downstreams;
use crate::loaders::Loaders;
use crate::routes::GatewayState;

/// The caller's `Authorization` header value, forwarded verbatim downstream.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

/// State scoped to one incoming request.
#[derive(Clone)]
pub struct RequestContext {
    pub token: Option<AuthToken>,
    pub downstreams: Downstreams,
    pub loaders: Arc<Loaders>,
}

impl RequestContext {
    pub fn new(state: &GatewayState, token: Option<AuthToken>) -> Self {
        let loaders = Loaders::new(&state.downstreams, token.clone(), state.loader_config);
        Self {
            token,
            downstreams: state.downstreams.clone(),
            loaders: Arc::new(loaders),
        }
    }
}

/// Middleware that attaches a new [`RequestContext`] to every request.
pub async fn attach_request_context(
    State(state): State<Arc<GatewayState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(AuthToken::new);
    let context = RequestContext::new(&state, token);
    request.extensions_mut().insert(context);
    next.run(request).await
}
