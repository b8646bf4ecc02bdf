//! Consumer of order events.

use std::sync::Arc;

use async_trait::async_trait;
use common::ErrorKind;
use event_bus::{
    EventDispatcher, EventEnvelope, EventHandler, HandlerContext, HandlerError, Unprocessable,
};

use crate::payment::events::ORDER_CREATED;
use crate::{CreatePayment, OrderPlaced, PaymentMethod, PaymentRepository, PaymentService};

/// Durable queue of the payment service.
pub const CONSUMER_QUEUE: &str = "payment-service.events";

/// Routing-key patterns bound to [`CONSUMER_QUEUE`].
pub const SUBSCRIPTIONS: &[&str] = &["order-service.order.created"];

/// Builds the dispatcher for the payment service's queue.
pub fn payment_dispatcher<R>(service: Arc<PaymentService<R>>) -> EventDispatcher
where
    R: PaymentRepository + 'static,
{
    EventDispatcher::new("payment-service")
        .register(ORDER_CREATED, Arc::new(OrderCreatedHandler { service }))
}

/// Opens a pending card payment for every new order.
///
/// A redelivered event finds the payment already there; the resulting
/// conflict counts as handled.
struct OrderCreatedHandler<R: PaymentRepository> {
    service: Arc<PaymentService<R>>,
}

#[async_trait]
impl<R: PaymentRepository + 'static> EventHandler for OrderCreatedHandler<R> {
    async fn handle(
        &self,
        ctx: &HandlerContext,
        envelope: &EventEnvelope,
    ) -> Result<(), HandlerError> {
        let order: OrderPlaced = envelope
            .decode()
            .map_err(|e| Unprocessable(format!("malformed {} payload: {e}", envelope.event_type)))?;

        let mut cmd = CreatePayment::new(order.order_id, order.user_id, order.total_amount)
            .with_method(PaymentMethod::Card);
        if let Some(currency) = order.currency {
            cmd = cmd.with_currency(currency);
        }

        match self.service.create_payment(cmd).await {
            Ok(payment) => {
                tracing::info!(
                    trace_id = %ctx.trace_id,
                    order_id = %order.order_id,
                    payment_id = %payment.id,
                    "payment opened for order"
                );
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::Conflict => {
                tracing::debug!(order_id = %order.order_id, "payment already exists for order");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::InvalidInput => Err(Unprocessable(format!(
                "order {} cannot become a payment: {e}",
                order.order_id
            ))
            .into()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use common::{OrderId, UserId};
    use event_bus::{Disposition, EventPublisher};
    use rust_decimal::Decimal;

    use super::*;
    use crate::{InMemoryPaymentRepository, PaymentStatus};

    fn service() -> Arc<PaymentService<InMemoryPaymentRepository>> {
        Arc::new(PaymentService::new(
            InMemoryPaymentRepository::new(),
            EventPublisher::disabled("payment-service"),
        ))
    }

    fn order_created(order_id: OrderId, total: &str) -> Vec<u8> {
        EventEnvelope::builder()
            .event_type(ORDER_CREATED)
            .service("order-service")
            .payload_raw(serde_json::json!({
                "order_id": order_id,
                "user_id": UserId::new(),
                "total_amount": total,
                "currency": "EUR",
                "status": "pending",
                "created_at": "2024-01-01T00:00:00Z"
            }))
            .build()
            .unwrap()
            .to_bytes()
            .unwrap()
    }

    #[tokio::test]
    async fn test_order_created_opens_one_payment() {
        let service = service();
        let dispatcher = payment_dispatcher(service.clone());
        let order_id = OrderId::new();
        let bytes = order_created(order_id, "64.97");

        for redelivered in [false, true] {
            let disposition = dispatcher
                .dispatch(&bytes, "order-service.order.created", redelivered)
                .await;
            assert_eq!(disposition, Disposition::Ack);
        }

        assert_eq!(service.repository().len(), 1);
        let payment = service.get_payment_by_order(order_id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount, Decimal::new(6497, 2));
        assert_eq!(payment.currency, "EUR");
        assert_eq!(payment.method, PaymentMethod::Card);
    }

    #[tokio::test]
    async fn test_zero_total_is_dropped_without_payment() {
        let service = service();
        let dispatcher = payment_dispatcher(service.clone());

        let disposition = dispatcher
            .dispatch(
                &order_created(OrderId::new(), "0"),
                "order-service.order.created",
                false,
            )
            .await;
        assert_eq!(disposition, Disposition::Drop);
        assert!(service.repository().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped() {
        let dispatcher = payment_dispatcher(service());
        let bytes = EventEnvelope::builder()
            .event_type(ORDER_CREATED)
            .service("order-service")
            .payload_raw(serde_json::json!({"order_id": 42}))
            .build()
            .unwrap()
            .to_bytes()
            .unwrap();

        assert_eq!(
            dispatcher
                .dispatch(&bytes, "order-service.order.created", false)
                .await,
            Disposition::Drop
        );
    }
}
