//! Aggregation gateway.
//!
//! The gateway serves orders joined with their user and payment. Joins go
//! through request-scoped [`BatchLoader`]s, so resolving N orders costs one
//! downstream batch call per entity kind instead of N calls.

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod loader;
pub mod loaders;
pub mod model;
pub mod resolvers;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use client::{DownstreamClient, Downstreams};
pub use config::GatewayConfig;
pub use context::{AuthToken, RequestContext};
pub use error::{ApiError, LoadError};
pub use loader::{BatchFn, BatchLoader, LoaderConfig};
pub use loaders::Loaders;
pub use routes::GatewayState;

/// Creates the gateway router.
pub fn create_app(state: Arc<GatewayState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics))
        .with_state(metrics_handle);

    let api = Router::new()
        .route("/api/v1/orders", get(routes::list_orders))
        .route("/api/v1/orders/{id}", get(routes::get_order))
        .route_layer(middleware::from_fn_with_state(
            state,
            context::attach_request_context,
        ));

    Router::new()
        .route("/health", get(routes::health))
        .merge(api)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
