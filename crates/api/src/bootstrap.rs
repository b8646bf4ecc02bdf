//! Process-level wiring shared by the service binaries.

use std::sync::Arc;

use event_bus::{AmqpBus, EventDispatcher, EventPublisher, MessageBus, declare_subscription};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::ServiceConfig;

/// Installs the global subscriber: `RUST_LOG` filter (default `info`), JSON
/// lines when `LOG_FORMAT=json`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Broker connection of a service, or its absence.
///
/// An unset `AMQP_URL` or an unreachable broker never stops the service: it
/// runs with a disabled publisher and no consumer.
pub struct Messaging {
    bus: Option<AmqpBus>,
    exchange: String,
    service: String,
}

impl Messaging {
    /// Connects to the configured broker and declares the exchange.
    pub async fn connect(config: &ServiceConfig) -> Self {
        let bus = match config.amqp_url.as_deref() {
            None => {
                tracing::info!("AMQP_URL not set; events are disabled");
                None
            }
            Some(url) => match AmqpBus::connect(url).await {
                Ok(bus) => declare_exchange_or_close(bus, &config.exchange).await,
                Err(e) => {
                    tracing::warn!(error = %e, "message bus unavailable; events are disabled");
                    None
                }
            },
        };

        Self {
            bus,
            exchange: config.exchange.clone(),
            service: config.service_name.clone(),
        }
    }

    /// A service without a broker.
    pub fn disabled(config: &ServiceConfig) -> Self {
        Self {
            bus: None,
            exchange: config.exchange.clone(),
            service: config.service_name.clone(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.bus.is_some()
    }

    /// Publisher stamped with this service's name.
    pub fn publisher(&self) -> EventPublisher {
        match &self.bus {
            Some(bus) => {
                EventPublisher::new(Arc::new(bus.clone()), &self.exchange, &self.service)
            }
            None => EventPublisher::disabled(&self.service),
        }
    }

    /// Declares `queue` bound to `patterns` and starts `dispatcher` on it.
    ///
    /// Returns `None` when there is no broker or the queue cannot be declared.
    pub async fn start_consumer(
        &self,
        queue: &str,
        patterns: &[&str],
        dispatcher: EventDispatcher,
        shutdown: CancellationToken,
    ) -> Option<JoinHandle<event_bus::Result<()>>> {
        let bus = self.bus.as_ref()?;
        let handle = match declare_subscription(bus, &self.exchange, queue, patterns).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(%queue, error = %e, "queue declaration failed; consumer not started");
                return None;
            }
        };

        tracing::info!(%queue, ?patterns, "consumer started");
        Some(dispatcher.start(Arc::new(bus.clone()), handle, shutdown))
    }

    /// Closes the broker connection, if any.
    pub async fn close(self) {
        if let Some(bus) = self.bus
            && let Err(e) = bus.close().await
        {
            tracing::warn!(error = %e, "error closing broker connection");
        }
    }
}

/// Declares `exchange` on a fresh connection. The connection is closed and
/// dropped when the declaration fails.
async fn declare_exchange_or_close<B: MessageBus>(bus: B, exchange: &str) -> Option<B> {
    match bus.declare_exchange(exchange).await {
        Ok(()) => Some(bus),
        Err(e) => {
            tracing::warn!(%exchange, error = %e, "exchange declaration failed; events are disabled");
            if let Err(e) = bus.close().await {
                tracing::warn!(error = %e, "error closing broker connection");
            }
            None
        }
    }
}

/// Cancels the consumer loop and waits for it to finish.
pub async fn stop_consumer(
    shutdown: &CancellationToken,
    consumer: Option<JoinHandle<event_bus::Result<()>>>,
) {
    shutdown.cancel();
    let Some(consumer) = consumer else {
        return;
    };
    match consumer.await {
        Ok(Ok(())) => tracing::info!("consumer stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "consumer stopped with error"),
        Err(e) => tracing::error!(error = %e, "consumer task panicked"),
    }
}
