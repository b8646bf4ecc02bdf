//! Order service: persistence plus event publication.

use chrono::Utc;
use common::OrderId;
use event_bus::{EventPublisher, TraceId};

use crate::order::events::{ORDER_CREATED, ORDER_STATUS_CHANGED};
use crate::{
    CreateOrder, ListOrders, Order, OrderCreated, OrderError, OrderRepository, OrderStatus,
    OrderStatusChanged, Result,
};

/// Service for managing orders.
///
/// Publishing happens after the write commits. A failed publish is logged and
/// counted but never fails the operation, so an event can be lost; consumers
/// must not assume they see every change.
pub struct OrderService<R: OrderRepository> {
    repository: R,
    publisher: EventPublisher,
}

impl<R: OrderRepository> OrderService<R> {
    /// Creates a new order service.
    pub fn new(repository: R, publisher: EventPublisher) -> Self {
        Self {
            repository,
            publisher,
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// Validates and stores a new order, then emits `order.created`.
    #[tracing::instrument(skip(self, cmd), fields(user_id = %cmd.user_id))]
    pub async fn create_order(&self, cmd: CreateOrder, trace_id: &TraceId) -> Result<Order> {
        let order = Order::create(cmd)?;
        self.repository.insert(&order).await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id, total = %order.total_amount, "order created");

        self.publish(ORDER_CREATED, &OrderCreated::from(&order), trace_id)
            .await;
        Ok(order)
    }

    /// Moves an order to `status` along the allowed transition graph.
    ///
    /// Updating to the current status succeeds without writing or emitting
    /// anything, which makes redelivered payment events harmless.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        trace_id: &TraceId,
    ) -> Result<Order> {
        let mut order = self
            .repository
            .find(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))?;

        let changed_at = Utc::now();
        let Some(old_status) = order.transition_to(status, changed_at)? else {
            tracing::debug!(%order_id, %status, "order already in requested status");
            return Ok(order);
        };

        self.repository
            .update_status(order_id, status, changed_at)
            .await?;

        metrics::counter!(
            "order_status_changes_total",
            "from" => old_status.as_str(),
            "to" => status.as_str()
        )
        .increment(1);
        tracing::info!(%order_id, from = %old_status, to = %status, "order status changed");

        let event = OrderStatusChanged {
            order_id,
            user_id: order.user_id,
            old_status,
            new_status: status,
            changed_at,
        };
        self.publish(ORDER_STATUS_CHANGED, &event, trace_id).await;
        Ok(order)
    }

    /// Loads an order by ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.repository
            .find(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }

    /// Lists orders matching the query, returning the page and the total.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, query: &ListOrders) -> Result<(Vec<Order>, u64)> {
        self.repository.list(query).await
    }

    /// Loads several orders at once. Unknown ids are skipped.
    #[tracing::instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn get_orders_batch(&self, ids: &[OrderId]) -> Result<Vec<Order>> {
        self.repository.find_many(ids).await
    }

    async fn publish<T: serde::Serialize>(&self, event_type: &str, payload: &T, trace_id: &TraceId) {
        if let Err(e) = self.publisher.publish(event_type, payload, trace_id).await {
            tracing::warn!(%event_type, %trace_id, error = %e, "event not published");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common::UserId;
    use event_bus::{InMemoryBus, MessageBus};
    use rust_decimal::Decimal;

    use super::*;
    use crate::{InMemoryOrderRepository, NewOrderItem};

    async fn service_with_bus() -> (OrderService<InMemoryOrderRepository>, InMemoryBus) {
        let bus = InMemoryBus::new();
        bus.declare_exchange("events").await.unwrap();
        let publisher = EventPublisher::new(Arc::new(bus.clone()), "events", "order-service");
        (
            OrderService::new(InMemoryOrderRepository::new(), publisher),
            bus,
        )
    }

    fn cmd() -> CreateOrder {
        CreateOrder::new(
            UserId::new(),
            vec![
                NewOrderItem::new("SKU-001", "Widget", 2, Decimal::new(1000, 2)),
                NewOrderItem::new("SKU-002", "Gadget", 1, Decimal::new(550, 2)),
            ],
            "1 Main St",
        )
    }

    #[tokio::test]
    async fn test_create_order_emits_order_created() {
        let (service, bus) = service_with_bus().await;
        let trace = TraceId::from_string("trace-1");

        let order = service.create_order(cmd(), &trace).await.unwrap();
        assert_eq!(order.total_amount, Decimal::new(2550, 2));

        let published = bus.published_of_type(ORDER_CREATED);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].routing_key(), "order-service.order.created");
        assert_eq!(published[0].trace_id, trace);

        let event: OrderCreated = published[0].decode().unwrap();
        assert_eq!(event, OrderCreated::from(&order));
    }

    #[tokio::test]
    async fn test_create_order_succeeds_without_bus() {
        let service = OrderService::new(
            InMemoryOrderRepository::new(),
            EventPublisher::disabled("order-service"),
        );
        let order = service.create_order(cmd(), &TraceId::new()).await.unwrap();
        assert_eq!(service.get_order(order.id).await.unwrap(), order);
    }

    #[tokio::test]
    async fn test_invalid_order_is_not_stored_or_published() {
        let (service, bus) = service_with_bus().await;
        let mut bad = cmd();
        bad.items[1].quantity = 0;

        let result = service.create_order(bad, &TraceId::new()).await;
        assert!(matches!(result, Err(OrderError::InvalidQuantity { .. })));
        assert!(service.repository().is_empty());
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn test_update_status_emits_only_on_change() {
        let (service, bus) = service_with_bus().await;
        let order = service.create_order(cmd(), &TraceId::new()).await.unwrap();

        let updated = service
            .update_status(order.id, OrderStatus::Confirmed, &TraceId::new())
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Confirmed);

        let again = service
            .update_status(order.id, OrderStatus::Confirmed, &TraceId::new())
            .await
            .unwrap();
        assert_eq!(again.status, OrderStatus::Confirmed);

        let changes = bus.published_of_type(ORDER_STATUS_CHANGED);
        assert_eq!(changes.len(), 1);
        let event: OrderStatusChanged = changes[0].decode().unwrap();
        assert_eq!(event.old_status, OrderStatus::Pending);
        assert_eq!(event.new_status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_update_status_rejects_illegal_transition() {
        let (service, _bus) = service_with_bus().await;
        let order = service.create_order(cmd(), &TraceId::new()).await.unwrap();

        let result = service
            .update_status(order.id, OrderStatus::Delivered, &TraceId::new())
            .await;
        assert!(matches!(result, Err(OrderError::InvalidTransition { .. })));
        assert_eq!(
            service.get_order(order.id).await.unwrap().status,
            OrderStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_update_status_unknown_order() {
        let (service, _bus) = service_with_bus().await;
        let result = service
            .update_status(OrderId::new(), OrderStatus::Confirmed, &TraceId::new())
            .await;
        assert!(matches!(result, Err(OrderError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_orders_batch() {
        let (service, _bus) = service_with_bus().await;
        let a = service.create_order(cmd(), &TraceId::new()).await.unwrap();
        let b = service.create_order(cmd(), &TraceId::new()).await.unwrap();

        let found = service
            .get_orders_batch(&[b.id, OrderId::new(), a.id])
            .await
            .unwrap();
        let mut ids: Vec<OrderId> = found.iter().map(|o| o.id).collect();
        ids.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(ids, expected);
    }
}
