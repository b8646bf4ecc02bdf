//! End-to-end order/payment choreography over one in-memory broker.
//!
//! Both services run their real consumers: `order.created` opens a payment,
//! processing it emits `payment.success` or `payment.failed`, and the order
//! service moves the order to `confirmed` or `cancelled`.

use std::sync::Arc;
use std::time::Duration;

use common::{OrderId, UserId};
use event_bus::{EventPublisher, InMemoryBus, MessageBus, TraceId, declare_subscription};
use orders::{InMemoryOrderRepository, NewOrderItem, Order, OrderService, OrderStatus};
use payments::{
    InMemoryPaymentRepository, MockPaymentProvider, Payment, PaymentService, PaymentStatus,
};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

const EXCHANGE: &str = "events";

struct System {
    bus: InMemoryBus,
    orders: Arc<OrderService<InMemoryOrderRepository>>,
    payments: Arc<PaymentService<InMemoryPaymentRepository>>,
    provider: MockPaymentProvider,
    shutdown: CancellationToken,
}

impl System {
    async fn start() -> Self {
        let bus = InMemoryBus::new();
        let shared: Arc<dyn MessageBus> = Arc::new(bus.clone());
        let shutdown = CancellationToken::new();

        let order_queue = declare_subscription(
            shared.as_ref(),
            EXCHANGE,
            orders::CONSUMER_QUEUE,
            orders::SUBSCRIPTIONS,
        )
        .await
        .unwrap();
        let payment_queue = declare_subscription(
            shared.as_ref(),
            EXCHANGE,
            payments::CONSUMER_QUEUE,
            payments::SUBSCRIPTIONS,
        )
        .await
        .unwrap();

        let orders = Arc::new(OrderService::new(
            InMemoryOrderRepository::new(),
            EventPublisher::new(shared.clone(), EXCHANGE, "order-service"),
        ));

        let provider = MockPaymentProvider::new();
        let payments = Arc::new(
            PaymentService::new(
                InMemoryPaymentRepository::new(),
                EventPublisher::new(shared.clone(), EXCHANGE, "payment-service"),
            )
            .with_provider(Arc::new(provider.clone())),
        );

        orders::order_dispatcher(orders.clone()).start(
            shared.clone(),
            order_queue,
            shutdown.clone(),
        );
        payments::payment_dispatcher(payments.clone()).start(
            shared,
            payment_queue,
            shutdown.clone(),
        );

        Self {
            bus,
            orders,
            payments,
            provider,
            shutdown,
        }
    }

    async fn place_order(&self) -> Order {
        self.orders
            .create_order(
                orders::CreateOrder::new(
                    UserId::new(),
                    vec![NewOrderItem::new("SKU-001", "Widget", 2, Decimal::new(2500, 2))],
                    "221B Baker Street",
                ),
                &TraceId::new(),
            )
            .await
            .unwrap()
    }

    async fn wait_for_payment(&self, order_id: OrderId) -> Payment {
        for _ in 0..400 {
            if let Ok(payment) = self.payments.get_payment_by_order(order_id).await {
                return payment;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no payment was opened for order {order_id}");
    }

    async fn wait_for_order(&self, order_id: OrderId, status: OrderStatus) {
        for _ in 0..400 {
            if self.orders.get_order(order_id).await.unwrap().status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("order {order_id} never reached {status}");
    }
}

impl Drop for System {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn successful_payment_confirms_order() {
    let system = System::start().await;
    let order = system.place_order().await;

    let payment = system.wait_for_payment(order.id).await;
    assert_eq!(payment.amount, order.total_amount);
    assert_eq!(payment.user_id, order.user_id);
    assert_eq!(payment.status, PaymentStatus::Pending);

    let processed = system
        .payments
        .process_payment(payment.id, &TraceId::new())
        .await
        .unwrap();
    assert_eq!(processed.status, PaymentStatus::Success);

    system.wait_for_order(order.id, OrderStatus::Confirmed).await;
    assert_eq!(system.bus.published_of_type("order.status_changed").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn declined_payment_cancels_order() {
    let system = System::start().await;
    system.provider.set_decline(Some("card declined"));
    let order = system.place_order().await;

    let payment = system.wait_for_payment(order.id).await;
    let processed = system
        .payments
        .process_payment(payment.id, &TraceId::new())
        .await
        .unwrap();
    assert_eq!(processed.status, PaymentStatus::Failed);

    system.wait_for_order(order.id, OrderStatus::Cancelled).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trace_id_flows_across_services() {
    let system = System::start().await;
    let trace = TraceId::from_string("checkout-42");
    let order = system
        .orders
        .create_order(
            orders::CreateOrder::new(
                UserId::new(),
                vec![NewOrderItem::new("SKU-9", "Lamp", 1, Decimal::TEN)],
                "1 Main St",
            ),
            &trace,
        )
        .await
        .unwrap();
    system.wait_for_payment(order.id).await;

    let created = system.bus.published_of_type("order.created");
    assert_eq!(created[0].trace_id, trace);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn redelivered_order_created_opens_one_payment() {
    let system = System::start().await;
    let order = system.place_order().await;
    let first = system.wait_for_payment(order.id).await;

    // A second copy of the same event, as after a lost ack.
    let envelope = system.bus.published_of_type("order.created").remove(0);
    system
        .bus
        .publish_raw(
            EXCHANGE,
            "order-service.order.created",
            envelope.to_bytes().unwrap(),
        )
        .unwrap();

    for _ in 0..400 {
        let stats = system.bus.queue_stats(payments::CONSUMER_QUEUE).unwrap();
        if stats.acked == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let stats = system.bus.queue_stats(payments::CONSUMER_QUEUE).unwrap();
    assert_eq!(stats.acked, 2);
    assert_eq!(stats.requeued, 0);

    let again = system.payments.get_payment_by_order(order.id).await.unwrap();
    assert_eq!(again.id, first.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn payment_event_for_unknown_order_is_redelivered() {
    let system = System::start().await;
    let shared: Arc<dyn MessageBus> = Arc::new(system.bus.clone());
    let publisher = EventPublisher::new(shared, EXCHANGE, "payment-service");

    publisher
        .publish(
            "payment.failed",
            &serde_json::json!({
                "payment_id": "8d0d4c57-1f2b-4f4c-8a4e-3e9a3a2b1c0d",
                "order_id": OrderId::new(),
                "failure_reason": "card declined",
            }),
            &TraceId::new(),
        )
        .await
        .unwrap();

    // The order never appears, so the handler keeps failing and the message
    // keeps coming back.
    for _ in 0..400 {
        let stats = system.bus.queue_stats(orders::CONSUMER_QUEUE).unwrap();
        if stats.requeued >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let stats = system.bus.queue_stats(orders::CONSUMER_QUEUE).unwrap();
    assert!(stats.requeued >= 3);
    assert_eq!(stats.acked, 0);
}
