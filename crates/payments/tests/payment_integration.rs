//! Integration tests for the payment service wired to an in-memory broker.

use std::sync::Arc;
use std::time::Duration;

use common::{OrderId, UserId};
use event_bus::{EventPublisher, InMemoryBus, MessageBus, TraceId, declare_subscription};
use payments::events::{PAYMENT_FAILED, PAYMENT_SUCCESS};
use payments::{
    CONSUMER_QUEUE, InMemoryPaymentRepository, MockPaymentProvider, Payment, PaymentFailed,
    PaymentService, PaymentStatus, PaymentSucceeded, SUBSCRIPTIONS, payment_dispatcher,
};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

const EXCHANGE: &str = "events";

struct TestHarness {
    bus: InMemoryBus,
    service: Arc<PaymentService<InMemoryPaymentRepository>>,
    provider: MockPaymentProvider,
    orders: EventPublisher,
    shutdown: CancellationToken,
}

impl TestHarness {
    async fn start() -> Self {
        let bus = InMemoryBus::new();
        let shared: Arc<dyn MessageBus> = Arc::new(bus.clone());
        let queue = declare_subscription(shared.as_ref(), EXCHANGE, CONSUMER_QUEUE, SUBSCRIPTIONS)
            .await
            .unwrap();

        let provider = MockPaymentProvider::new();
        let service = Arc::new(
            PaymentService::new(
                InMemoryPaymentRepository::new(),
                EventPublisher::new(shared.clone(), EXCHANGE, "payment-service"),
            )
            .with_provider(Arc::new(provider.clone())),
        );

        let shutdown = CancellationToken::new();
        payment_dispatcher(service.clone()).start(shared.clone(), queue, shutdown.clone());

        Self {
            bus,
            service,
            provider,
            orders: EventPublisher::new(shared, EXCHANGE, "order-service"),
            shutdown,
        }
    }

    async fn publish_order_created(&self, order_id: OrderId, total: Decimal) {
        self.orders
            .publish(
                "order.created",
                &serde_json::json!({
                    "order_id": order_id,
                    "user_id": UserId::new(),
                    "total_amount": total,
                    "currency": "USD",
                    "status": "pending",
                    "created_at": chrono::Utc::now(),
                }),
                &TraceId::new(),
            )
            .await
            .unwrap();
    }

    async fn wait_for_payment(&self, order_id: OrderId) -> Payment {
        for _ in 0..200 {
            if let Ok(payment) = self.service.get_payment_by_order(order_id).await {
                return payment;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no payment was opened for order {order_id}");
    }

    async fn wait_until_settled(&self, count: u64) {
        for _ in 0..200 {
            let stats = self.bus.queue_stats(CONSUMER_QUEUE).unwrap();
            if stats.acked + stats.dropped >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("queue never settled {count} messages");
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn order_created_opens_payment_and_process_emits_success() {
    let harness = TestHarness::start().await;
    let order_id = OrderId::new();
    harness
        .publish_order_created(order_id, Decimal::new(6497, 2))
        .await;

    let payment = harness.wait_for_payment(order_id).await;
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.amount, Decimal::new(6497, 2));

    let trace = TraceId::from_string("checkout-1");
    let processed = harness
        .service
        .process_payment(payment.id, &trace)
        .await
        .unwrap();
    assert_eq!(processed.status, PaymentStatus::Success);

    let events = harness.bus.published_of_type(PAYMENT_SUCCESS);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].routing_key(), "payment-service.payment.success");
    assert_eq!(events[0].trace_id, trace);
    let event: PaymentSucceeded = events[0].decode().unwrap();
    assert_eq!(event.payment_id, payment.id);
    assert_eq!(event.order_id, order_id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn declined_payment_emits_failure() {
    let harness = TestHarness::start().await;
    harness.provider.set_decline(Some("card declined"));
    let order_id = OrderId::new();
    harness.publish_order_created(order_id, Decimal::TEN).await;

    let payment = harness.wait_for_payment(order_id).await;
    harness
        .service
        .process_payment(payment.id, &TraceId::new())
        .await
        .unwrap();

    let events = harness.bus.published_of_type(PAYMENT_FAILED);
    assert_eq!(events.len(), 1);
    let event: PaymentFailed = events[0].decode().unwrap();
    assert_eq!(event.failure_reason, "card declined");
    assert!(harness.bus.published_of_type(PAYMENT_SUCCESS).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn redelivered_order_created_opens_single_payment() {
    let harness = TestHarness::start().await;
    let order_id = OrderId::new();
    harness.publish_order_created(order_id, Decimal::TEN).await;
    harness.publish_order_created(order_id, Decimal::TEN).await;

    harness.wait_until_settled(2).await;
    let stats = harness.bus.queue_stats(CONSUMER_QUEUE).unwrap();
    assert_eq!(stats.acked, 2);
    assert_eq!(stats.requeued, 0);
    assert_eq!(harness.service.repository().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_orders_each_get_one_payment() {
    let harness = TestHarness::start().await;
    let order_ids: Vec<OrderId> = (0..10).map(|_| OrderId::new()).collect();
    for order_id in &order_ids {
        harness.publish_order_created(*order_id, Decimal::TEN).await;
    }

    harness.wait_until_settled(10).await;
    let payments = harness
        .service
        .get_payments_by_orders_batch(&order_ids)
        .await
        .unwrap();
    assert_eq!(payments.len(), 10);
    for order_id in &order_ids {
        assert_eq!(payments.iter().filter(|p| p.order_id == *order_id).count(), 1);
    }
}
