//! Payment service entry point.

use std::sync::Arc;
use std::time::Duration;

use api::bootstrap::{self, Messaging};
use api::config::{PaymentConfig, ProviderKind};
use metrics_exporter_prometheus::PrometheusHandle;
use payments::{
    CONSUMER_QUEUE, InMemoryPaymentRepository, MockPaymentProvider, PaymentProvider,
    PaymentRepository, PaymentService, PostgresPaymentRepository, SUBSCRIPTIONS, StripeProvider,
    payment_dispatcher,
};
use tokio_util::sync::CancellationToken;

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    bootstrap::init_tracing();

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let config = PaymentConfig::from_env();

    match config.service.database_url.as_deref() {
        Some(url) => {
            let repository = PostgresPaymentRepository::connect(url)
                .await
                .expect("failed to connect to database");
            repository
                .run_migrations()
                .await
                .expect("failed to run migrations");
            run(config, repository, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set; payments are kept in memory");
            run(config, InMemoryPaymentRepository::new(), metrics_handle).await;
        }
    }
}

fn build_provider(config: &PaymentConfig) -> Option<Arc<dyn PaymentProvider>> {
    match config.provider {
        ProviderKind::None => None,
        ProviderKind::Mock => Some(Arc::new(MockPaymentProvider::new())),
        ProviderKind::Stripe => {
            let provider = StripeProvider::new(
                config.stripe_secret_key.clone().unwrap_or_default(),
                config.stripe_api_base.clone(),
                PROVIDER_TIMEOUT,
            )
            .expect("invalid Stripe provider configuration");
            Some(Arc::new(provider))
        }
    }
}

async fn run<R: PaymentRepository + 'static>(
    config: PaymentConfig,
    repository: R,
    metrics_handle: PrometheusHandle,
) {
    let messaging = Messaging::connect(&config.service).await;

    let mut service = PaymentService::new(repository, messaging.publisher())
        .with_settlement_delay(config.settlement_delay);
    if let Some(provider) = build_provider(&config) {
        service = service.with_provider(provider);
    }
    let service = Arc::new(service);

    let shutdown = CancellationToken::new();
    let consumer = messaging
        .start_consumer(
            CONSUMER_QUEUE,
            SUBSCRIPTIONS,
            payment_dispatcher(service.clone()),
            shutdown.clone(),
        )
        .await;

    let app = api::create_payment_app(service.clone(), metrics_handle);

    let addr = config.service.addr();
    tracing::info!(
        %addr,
        service = %config.service.service_name,
        provider = service.provider_name().unwrap_or("none"),
        events = messaging.is_connected(),
        "starting payment service"
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
    tracing::info!("payment service shut down gracefully");
}
