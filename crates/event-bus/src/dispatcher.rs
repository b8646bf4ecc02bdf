//! Consumer side of the bus: routes decoded envelopes to handlers by event
//! type and settles each delivery according to the outcome.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{DeliveryStream, EventEnvelope, MessageBus, QueueHandle, Result, TraceId};

/// Error type returned by handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Handler failure that redelivery cannot fix, such as a payload that does
/// not decode into the expected event. The message is dropped, not requeued.
#[derive(Debug, thiserror::Error)]
#[error("unprocessable event: {0}")]
pub struct Unprocessable(pub String);

/// First wait before re-subscribing after the delivery stream failed.
const RESTART_BACKOFF: Duration = Duration::from_millis(100);
/// Upper bound of the doubling wait between re-subscribe attempts.
const MAX_RESTART_BACKOFF: Duration = Duration::from_secs(5);
/// Consecutive failed re-subscribe attempts before the consumer gives up.
const MAX_RESTART_ATTEMPTS: u32 = 8;

/// Delivery metadata passed to a handler alongside the envelope.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// Trace id of the consumed envelope; events published while handling
    /// should carry it forward.
    pub trace_id: TraceId,
    pub routing_key: String,
    pub redelivered: bool,
}

/// Reacts to one event type.
///
/// Returning `Ok` acknowledges the message. Returning `Err` requeues it, so
/// handlers must be idempotent and must return `Ok` for events that are
/// already reflected in their state. An [`Unprocessable`] error drops the
/// message instead.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &HandlerContext,
        envelope: &EventEnvelope,
    ) -> std::result::Result<(), HandlerError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(HandlerContext, EventEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(
        &self,
        ctx: &HandlerContext,
        envelope: &EventEnvelope,
    ) -> std::result::Result<(), HandlerError> {
        (self.0)(ctx.clone(), envelope.clone()).await
    }
}

/// Wraps an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(HandlerContext, EventEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// How a delivery is settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Remove the message from the queue.
    Ack,
    /// Put the message back for redelivery.
    Requeue,
    /// Discard the message without redelivery.
    Drop,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Ack => "ack",
            Disposition::Requeue => "requeue",
            Disposition::Drop => "drop",
        }
    }
}

/// Maps event types to handlers for one consumer queue.
///
/// Settlement rules:
/// - body is not a valid envelope: drop (redelivering cannot fix it)
/// - no handler registered for the type: ack, with a warning
/// - handler returned [`Unprocessable`]: drop
/// - handler failed otherwise: requeue
/// - handler succeeded: ack
#[derive(Clone)]
pub struct EventDispatcher {
    name: String,
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    /// Creates a dispatcher; `name` is used as consumer tag and in logs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers the handler for an event type, replacing any previous one.
    pub fn register(mut self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.insert(event_type.into(), handler);
        self
    }

    /// Event types with a registered handler, sorted.
    pub fn event_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Decodes one message body, runs the matching handler and decides how
    /// the delivery must be settled.
    pub async fn dispatch(&self, data: &[u8], routing_key: &str, redelivered: bool) -> Disposition {
        let envelope = match EventEnvelope::from_bytes(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(consumer = %self.name, %routing_key, error = %e, "undecodable message dropped");
                record("unknown", Disposition::Drop);
                return Disposition::Drop;
            }
        };

        let Some(handler) = self.handlers.get(&envelope.event_type) else {
            tracing::warn!(
                consumer = %self.name,
                event_type = %envelope.event_type,
                %routing_key,
                "no handler registered, acknowledging"
            );
            record(self.event_label(&envelope.event_type), Disposition::Ack);
            return Disposition::Ack;
        };

        let ctx = HandlerContext {
            trace_id: envelope.trace_id.clone(),
            routing_key: routing_key.to_string(),
            redelivered,
        };

        let disposition = match handler.handle(&ctx, &envelope).await {
            Ok(()) => {
                tracing::debug!(
                    consumer = %self.name,
                    event_type = %envelope.event_type,
                    trace_id = %ctx.trace_id,
                    "event handled"
                );
                Disposition::Ack
            }
            Err(e) if e.is::<Unprocessable>() => {
                tracing::error!(
                    consumer = %self.name,
                    event_type = %envelope.event_type,
                    trace_id = %ctx.trace_id,
                    error = %e,
                    "unprocessable event dropped"
                );
                Disposition::Drop
            }
            Err(e) => {
                tracing::error!(
                    consumer = %self.name,
                    event_type = %envelope.event_type,
                    trace_id = %ctx.trace_id,
                    redelivered,
                    error = %e,
                    "handler failed, requeueing"
                );
                Disposition::Requeue
            }
        };
        record(self.event_label(&envelope.event_type), disposition);
        disposition
    }

    /// Metric label for an event type: the type itself when a handler is
    /// registered for it, `unknown` otherwise, so wire values cannot grow
    /// the label set.
    fn event_label<'a>(&'a self, event_type: &'a str) -> &'a str {
        if self.handlers.contains_key(event_type) {
            event_type
        } else {
            "unknown"
        }
    }

    /// Consumes `queue` until the stream ends or `shutdown` is cancelled.
    ///
    /// Messages are processed one at a time and each is settled before the
    /// next is taken. When the delivery stream fails the consumer subscribes
    /// again with a doubling backoff; it returns the error only after
    /// `MAX_RESTART_ATTEMPTS` consecutive failed attempts.
    pub async fn run(
        self,
        bus: Arc<dyn MessageBus>,
        queue: QueueHandle,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut deliveries = bus.consume(&queue, &self.name).await?;
        tracing::info!(consumer = %self.name, queue = %queue.name(), event_types = ?self.event_types(), "consumer started");

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = deliveries.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    tracing::error!(consumer = %self.name, error = %e, "delivery stream error; restarting consumer");
                    metrics::counter!("consumer_restarts_total", "consumer" => self.name.clone())
                        .increment(1);
                    match self.resubscribe(bus.as_ref(), &queue, &shutdown).await? {
                        Some(stream) => {
                            deliveries = stream;
                            continue;
                        }
                        None => break,
                    }
                }
                None => break,
            };

            let disposition = self
                .dispatch(&delivery.data, &delivery.routing_key, delivery.redelivered)
                .await;

            let settled = match disposition {
                Disposition::Ack => delivery.ack().await,
                Disposition::Requeue => delivery.nack(true).await,
                Disposition::Drop => delivery.nack(false).await,
            };
            if let Err(e) = settled {
                tracing::error!(consumer = %self.name, error = %e, "failed to settle delivery");
            }
        }

        tracing::info!(consumer = %self.name, "consumer stopped");
        Ok(())
    }

    /// Starts a new delivery stream on `queue`, waiting between attempts.
    ///
    /// Returns `Ok(None)` if `shutdown` is cancelled while waiting.
    async fn resubscribe(
        &self,
        bus: &dyn MessageBus,
        queue: &QueueHandle,
        shutdown: &CancellationToken,
    ) -> Result<Option<DeliveryStream>> {
        let mut backoff = RESTART_BACKOFF;
        let mut attempt = 1;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(None),
                _ = tokio::time::sleep(backoff) => {}
            }
            match bus.consume(queue, &self.name).await {
                Ok(stream) => {
                    tracing::info!(consumer = %self.name, attempt, "consumer resubscribed");
                    return Ok(Some(stream));
                }
                Err(e) if attempt >= MAX_RESTART_ATTEMPTS => {
                    tracing::error!(consumer = %self.name, attempt, error = %e, "consumer giving up");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(consumer = %self.name, attempt, error = %e, "resubscribe failed");
                    attempt += 1;
                    backoff = (backoff * 2).min(MAX_RESTART_BACKOFF);
                }
            }
        }
    }

    /// Spawns [`EventDispatcher::run`] on the runtime.
    pub fn start(
        self,
        bus: Arc<dyn MessageBus>,
        queue: QueueHandle,
        shutdown: CancellationToken,
    ) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run(bus, queue, shutdown))
    }
}

fn record(event_type: &str, disposition: Disposition) {
    metrics::counter!(
        "events_consumed_total",
        "event_type" => event_type.to_string(),
        "outcome" => disposition.as_str()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn envelope_bytes(event_type: &str) -> Vec<u8> {
        EventEnvelope::builder()
            .event_type(event_type)
            .service("payment-service")
            .trace_id(TraceId::from_string("trace-42"))
            .payload_raw(serde_json::json!({"order_id": "o-1"}))
            .build()
            .unwrap()
            .to_bytes()
            .unwrap()
    }

    fn counting(counter: Arc<AtomicUsize>, fail: bool) -> Arc<dyn EventHandler> {
        handler_fn(move |_ctx, _envelope| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if fail {
                    Err::<(), HandlerError>("boom".into())
                } else {
                    Ok(())
                }
            }
        })
    }

    #[tokio::test]
    async fn success_acks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher =
            EventDispatcher::new("test").register("payment.success", counting(calls.clone(), false));

        let disposition = dispatcher
            .dispatch(&envelope_bytes("payment.success"), "payment-service.payment.success", false)
            .await;

        assert_eq!(disposition, Disposition::Ack);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_error_requeues() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher =
            EventDispatcher::new("test").register("payment.failed", counting(calls.clone(), true));

        let disposition = dispatcher
            .dispatch(&envelope_bytes("payment.failed"), "payment-service.payment.failed", false)
            .await;

        assert_eq!(disposition, Disposition::Requeue);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_type_acks_without_calling_handlers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher =
            EventDispatcher::new("test").register("payment.success", counting(calls.clone(), false));

        let disposition = dispatcher
            .dispatch(&envelope_bytes("user.deleted"), "user-service.user.deleted", false)
            .await;

        assert_eq!(disposition, Disposition::Ack);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn undecodable_body_drops() {
        let dispatcher = EventDispatcher::new("test");
        let disposition = dispatcher.dispatch(b"{not json", "x.y", false).await;
        assert_eq!(disposition, Disposition::Drop);
    }

    #[tokio::test]
    async fn context_carries_trace_and_redelivery_flag() {
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let sink = seen.clone();
        let dispatcher = EventDispatcher::new("test").register(
            "payment.success",
            handler_fn(move |ctx, _envelope| {
                let sink = sink.clone();
                async move {
                    *sink.lock() = Some(ctx);
                    Ok(())
                }
            }),
        );

        dispatcher
            .dispatch(&envelope_bytes("payment.success"), "payment-service.payment.success", true)
            .await;

        let ctx = seen.lock().clone().unwrap();
        assert_eq!(ctx.trace_id.as_str(), "trace-42");
        assert_eq!(ctx.routing_key, "payment-service.payment.success");
        assert!(ctx.redelivered);
    }

    #[tokio::test]
    async fn unprocessable_error_drops() {
        let dispatcher = EventDispatcher::new("test").register(
            "payment.success",
            handler_fn(|_, _| async {
                Err::<(), HandlerError>(Unprocessable("missing order_id".into()).into())
            }),
        );

        let disposition = dispatcher
            .dispatch(&envelope_bytes("payment.success"), "payment-service.payment.success", false)
            .await;
        assert_eq!(disposition, Disposition::Drop);
    }

    #[test]
    fn metric_label_is_bounded_by_registered_types() {
        let dispatcher = EventDispatcher::new("test")
            .register("payment.success", handler_fn(|_, _| async { Ok(()) }));

        assert_eq!(dispatcher.event_label("payment.success"), "payment.success");
        assert_eq!(dispatcher.event_label("user.deleted"), "unknown");
        assert_eq!(dispatcher.event_label(&"x".repeat(1000)), "unknown");
    }

    /// Wraps an in-memory bus; the first `fail_streams` subscriptions yield a
    /// stream error, and after that `consume` fails `fail_consumes` times.
    struct FlakyBus {
        inner: crate::InMemoryBus,
        fail_streams: AtomicUsize,
        fail_consumes: AtomicUsize,
        consumes: AtomicUsize,
    }

    impl FlakyBus {
        fn new(inner: crate::InMemoryBus, fail_streams: usize, fail_consumes: usize) -> Self {
            Self {
                inner,
                fail_streams: AtomicUsize::new(fail_streams),
                fail_consumes: AtomicUsize::new(fail_consumes),
                consumes: AtomicUsize::new(0),
            }
        }

        fn take(counter: &AtomicUsize) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl MessageBus for FlakyBus {
        async fn declare_exchange(&self, name: &str) -> Result<()> {
            self.inner.declare_exchange(name).await
        }

        async fn declare_queue(&self, name: &str) -> Result<QueueHandle> {
            self.inner.declare_queue(name).await
        }

        async fn bind_queue(&self, queue: &QueueHandle, exchange: &str, pattern: &str) -> Result<()> {
            self.inner.bind_queue(queue, exchange, pattern).await
        }

        async fn publish(&self, exchange: &str, routing_key: &str, envelope: &EventEnvelope) -> Result<()> {
            self.inner.publish(exchange, routing_key, envelope).await
        }

        async fn consume(&self, queue: &QueueHandle, consumer_tag: &str) -> Result<DeliveryStream> {
            self.consumes.fetch_add(1, Ordering::SeqCst);
            if Self::take(&self.fail_streams) {
                let failed = futures_util::stream::once(async {
                    Err(crate::BusError::Consume("channel closed".into()))
                });
                return Ok(Box::pin(failed));
            }
            if Self::take(&self.fail_consumes) {
                return Err(crate::BusError::Consume("connection refused".into()));
            }
            self.inner.consume(queue, consumer_tag).await
        }

        async fn close(&self) -> Result<()> {
            MessageBus::close(&self.inner).await
        }
    }

    async fn flaky_bus(fail_streams: usize, fail_consumes: usize) -> (Arc<FlakyBus>, QueueHandle) {
        let bus = FlakyBus::new(crate::InMemoryBus::new(), fail_streams, fail_consumes);
        let queue = crate::declare_subscription(&bus, "events", "test.events", &["#"])
            .await
            .unwrap();
        (Arc::new(bus), queue)
    }

    #[tokio::test(start_paused = true)]
    async fn stream_error_restarts_consumer() {
        let (bus, queue) = flaky_bus(1, 2).await;
        bus.inner
            .publish_raw("events", "payment-service.payment.success", envelope_bytes("payment.success"))
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let shutdown = CancellationToken::new();
        let consumer = EventDispatcher::new("test")
            .register("payment.success", counting(calls.clone(), false))
            .start(bus.clone(), queue, shutdown.clone());

        while bus.inner.queue_stats("test.events").unwrap().acked == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        // One failed stream, two refused subscriptions, then a working one.
        assert_eq!(bus.consumes.load(Ordering::SeqCst), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        shutdown.cancel();
        consumer.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn consumer_gives_up_after_repeated_failures() {
        let (bus, queue) = flaky_bus(1, usize::MAX).await;
        let result = EventDispatcher::new("test")
            .run(bus.clone(), queue, CancellationToken::new())
            .await;

        assert!(matches!(result, Err(crate::BusError::Consume(_))));
        assert_eq!(
            bus.consumes.load(Ordering::SeqCst),
            1 + MAX_RESTART_ATTEMPTS as usize
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_restart_backoff() {
        let (bus, queue) = flaky_bus(1, usize::MAX).await;
        let shutdown = CancellationToken::new();
        let consumer = EventDispatcher::new("test").start(bus.clone(), queue, shutdown.clone());

        tokio::time::sleep(RESTART_BACKOFF / 2).await;
        shutdown.cancel();

        consumer.await.unwrap().unwrap();
        assert_eq!(bus.consumes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn event_types_are_sorted() {
        let noop = handler_fn(|_, _| async { Ok(()) });
        let dispatcher = EventDispatcher::new("test")
            .register("user.created", noop.clone())
            .register("payment.failed", noop.clone())
            .register("payment.success", noop);

        assert_eq!(
            dispatcher.event_types(),
            vec!["payment.failed", "payment.success", "user.created"]
        );
    }
}
