//! Order service entry point.

use std::sync::Arc;

use api::bootstrap::{self, Messaging};
use api::config::ServiceConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use orders::{
    CONSUMER_QUEUE, InMemoryOrderRepository, OrderRepository, OrderService,
    PostgresOrderRepository, SUBSCRIPTIONS, order_dispatcher,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    bootstrap::init_tracing();

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let config = ServiceConfig::from_env(8081, "order-service");

    match config.database_url.as_deref() {
        Some(url) => {
            let repository = PostgresOrderRepository::connect(url)
                .await
                .expect("failed to connect to database");
            repository
                .run_migrations()
                .await
                .expect("failed to run migrations");
            run(config, repository, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set; orders are kept in memory");
            run(config, InMemoryOrderRepository::new(), metrics_handle).await;
        }
    }
}

async fn run<R: OrderRepository + 'static>(
    config: ServiceConfig,
    repository: R,
    metrics_handle: PrometheusHandle,
) {
    let messaging = Messaging::connect(&config).await;
    let service = Arc::new(OrderService::new(repository, messaging.publisher()));

    let shutdown = CancellationToken::new();
    let consumer = messaging
        .start_consumer(
            CONSUMER_QUEUE,
            SUBSCRIPTIONS,
            order_dispatcher(service.clone()),
            shutdown.clone(),
        )
        .await;

    let app = api::create_order_app(service, metrics_handle);

    let addr = config.addr();
    tracing::info!(
        %addr,
        service = %config.service_name,
        events = messaging.is_connected(),
        "starting order service"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(bootstrap::shutdown_signal())
        .await
        .expect("server error");

    bootstrap::stop_consumer(&shutdown, consumer).await;
    messaging.close().await;
    tracing::info!("order service shut down gracefully");
}
