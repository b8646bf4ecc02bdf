//! Consumers of payment and user events.

use std::sync::Arc;

use async_trait::async_trait;
use common::ErrorKind;
use event_bus::{
    EventDispatcher, EventEnvelope, EventHandler, HandlerContext, HandlerError, Unprocessable,
    handler_fn,
};

use crate::order::events::{PAYMENT_FAILED, PAYMENT_SUCCESS, USER_CREATED};
use crate::{OrderRepository, OrderService, OrderStatus, PaymentOutcome};

/// Durable queue of the order service.
pub const CONSUMER_QUEUE: &str = "order-service.events";

/// Routing-key patterns bound to [`CONSUMER_QUEUE`].
pub const SUBSCRIPTIONS: &[&str] = &[
    "payment-service.payment.success",
    "payment-service.payment.failed",
    "user-service.user.created",
];

/// Builds the dispatcher for the order service's queue.
pub fn order_dispatcher<R>(service: Arc<OrderService<R>>) -> EventDispatcher
where
    R: OrderRepository + 'static,
{
    EventDispatcher::new("order-service")
        .register(
            PAYMENT_SUCCESS,
            Arc::new(PaymentOutcomeHandler {
                service: service.clone(),
                target: OrderStatus::Confirmed,
            }),
        )
        .register(
            PAYMENT_FAILED,
            Arc::new(PaymentOutcomeHandler {
                service,
                target: OrderStatus::Cancelled,
            }),
        )
        .register(
            USER_CREATED,
            // Users are not mirrored locally; the event is only acknowledged.
            handler_fn(|ctx, _envelope| async move {
                tracing::debug!(trace_id = %ctx.trace_id, "user.created received");
                Ok(())
            }),
        )
}

/// Applies a payment outcome to the order it belongs to.
///
/// The status write is an assignment, so a redelivered event finds the order
/// already in `target` and succeeds without side effects.
struct PaymentOutcomeHandler<R: OrderRepository> {
    service: Arc<OrderService<R>>,
    target: OrderStatus,
}

#[async_trait]
impl<R: OrderRepository + 'static> EventHandler for PaymentOutcomeHandler<R> {
    async fn handle(
        &self,
        ctx: &HandlerContext,
        envelope: &EventEnvelope,
    ) -> Result<(), HandlerError> {
        let outcome: PaymentOutcome = envelope
            .decode()
            .map_err(|e| Unprocessable(format!("malformed {} payload: {e}", envelope.event_type)))?;

        match self
            .service
            .update_status(outcome.order_id, self.target, &ctx.trace_id)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::Conflict => {
                tracing::warn!(
                    order_id = %outcome.order_id,
                    event_type = %envelope.event_type,
                    error = %e,
                    "stale payment event ignored"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
