//! HTTP surfaces of the order and payment services.
//!
//! Each service gets its own router (`create_order_app`,
//! `create_payment_app`) over a generic repository, so the binaries can pick
//! PostgreSQL or the in-memory store at startup and the tests can drive the
//! routers without a network.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod routes;
pub mod trace;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use metrics_exporter_prometheus::PrometheusHandle;
use orders::{OrderRepository, OrderService};
use payments::{PaymentRepository, PaymentService};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use bootstrap::Messaging;
pub use config::{PaymentConfig, ProviderKind, ServiceConfig};
pub use error::ApiError;

/// Creates the order service router.
pub fn create_order_app<R: OrderRepository + 'static>(
    service: Arc<OrderService<R>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::orders;

    let api = Router::new()
        .route(
            "/api/v1/orders",
            post(orders::create::<R>).get(orders::list::<R>),
        )
        .route("/api/v1/orders/batch", post(orders::batch::<R>))
        .route("/api/v1/orders/{id}", get(orders::get::<R>))
        .route("/api/v1/orders/{id}/status", patch(orders::update_status::<R>))
        .with_state(service);

    with_common_routes(api, metrics_handle)
}

/// Creates the payment service router.
pub fn create_payment_app<R: PaymentRepository + 'static>(
    service: Arc<PaymentService<R>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::payments;

    let api = Router::new()
        .route(
            "/api/v1/payments",
            post(payments::create::<R>).get(payments::list::<R>),
        )
        .route("/api/v1/payments/batch", post(payments::batch::<R>))
        .route(
            "/api/v1/payments/by-order/batch",
            post(payments::batch_by_order::<R>),
        )
        .route(
            "/api/v1/payments/order/{order_id}",
            get(payments::get_by_order::<R>),
        )
        .route("/api/v1/payments/{id}", get(payments::get::<R>))
        .route("/api/v1/payments/{id}/process", post(payments::process::<R>))
        .route("/api/v1/payments/{id}/refund", post(payments::refund::<R>))
        .with_state(service);

    with_common_routes(api, metrics_handle)
}

fn with_common_routes(api: Router, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
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
