//! Payment service: persistence, provider calls and event publication.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{OrderId, PaymentId};
use event_bus::{EventPublisher, TraceId};
use rust_decimal::Decimal;
use tracing::Instrument;

use crate::payment::events::{PAYMENT_FAILED, PAYMENT_SUCCESS};
use crate::{
    Confirmation, CreatePayment, ListPayments, Payment, PaymentError, PaymentFailed,
    PaymentMethod, PaymentProvider, PaymentRepository, PaymentStatus, PaymentSucceeded,
    ProviderError, RefundOutcome, Result,
};

/// How long a payment takes to settle when no provider is configured.
pub const DEFAULT_SETTLEMENT_DELAY: Duration = Duration::from_millis(100);

/// Service for managing payments.
///
/// Without a provider, processing is simulated: the payment succeeds after
/// `settlement_delay`. As with orders, events are published after the write
/// and a failed publish is only logged.
pub struct PaymentService<R: PaymentRepository> {
    repository: Arc<R>,
    provider: Option<Arc<dyn PaymentProvider>>,
    publisher: EventPublisher,
    settlement_delay: Duration,
}

impl<R: PaymentRepository> PaymentService<R> {
    /// Creates a service without a provider.
    pub fn new(repository: R, publisher: EventPublisher) -> Self {
        Self {
            repository: Arc::new(repository),
            provider: None,
            publisher,
            settlement_delay: DEFAULT_SETTLEMENT_DELAY,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_settlement_delay(mut self, delay: Duration) -> Self {
        self.settlement_delay = delay;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn provider_name(&self) -> Option<&'static str> {
        self.provider.as_ref().map(|p| p.name())
    }

    /// Opens a pending payment for an order.
    ///
    /// A card payment with a token opens a provider intent first. If that
    /// fails the payment is still created, without a transaction id, and
    /// `process` retries the intent later.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn create_payment(&self, cmd: CreatePayment) -> Result<Payment> {
        if self.repository.find_by_order(cmd.order_id).await?.is_some() {
            return Err(PaymentError::AlreadyExists(cmd.order_id));
        }

        let wants_intent = cmd.method == PaymentMethod::Card && cmd.payment_token.is_some();
        let mut payment = Payment::create(cmd)?;

        if wants_intent && let Some(provider) = &self.provider {
            match provider
                .create_payment_intent(payment.amount, &payment.currency)
                .await
            {
                Ok(intent) => payment.attach_intent(provider.name(), intent.intent_id),
                Err(e) => {
                    tracing::warn!(
                        order_id = %payment.order_id,
                        provider = provider.name(),
                        error = %e,
                        "payment intent not created; will retry on process"
                    );
                }
            }
        }

        // The unique index on order_id is the authoritative duplicate check;
        // the lookup above only avoids a wasted provider call.
        self.repository.insert(&payment).await?;

        metrics::counter!("payments_created_total").increment(1);
        tracing::info!(payment_id = %payment.id, amount = %payment.amount, "payment created");
        Ok(payment)
    }

    /// Settles a pending payment and emits `payment.success` or
    /// `payment.failed`.
    ///
    /// A declined or failed confirmation is not an error: the payment is
    /// returned in `failed` status. An error is returned only when the payment
    /// is not pending or the provider could not open an intent, in which case
    /// the status is left unchanged.
    ///
    /// Once the payment is marked `processing` the rest of the attempt runs
    /// on its own task, so dropping this future (a client disconnect, a
    /// timeout) does not leave the payment stuck in `processing`.
    #[tracing::instrument(skip(self))]
    pub async fn process_payment(
        &self,
        payment_id: PaymentId,
        trace_id: &TraceId,
    ) -> Result<Payment>
    where
        R: 'static,
    {
        let mut payment = self.get_payment(payment_id).await?;
        if !payment.status.can_process() {
            return Err(PaymentError::NotPending(payment.status));
        }

        if let Some(provider) = &self.provider
            && payment.transaction_id.is_none()
        {
            let intent = provider
                .create_payment_intent(payment.amount, &payment.currency)
                .await
                .inspect_err(|e| {
                    tracing::warn!(%payment_id, provider = provider.name(), error = %e, "payment intent failed");
                })?;
            payment.attach_intent(provider.name(), intent.intent_id);
        }
        payment.start_processing(Utc::now())?;
        self.repository.update(&payment).await?;

        let settlement = Settlement {
            repository: self.repository.clone(),
            provider: self.provider.clone(),
            publisher: self.publisher.clone(),
            delay: self.settlement_delay,
            trace_id: trace_id.clone(),
        };
        match tokio::spawn(settlement.run(payment).in_current_span()).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(PaymentError::Aborted(e.to_string())),
        }
    }

    /// Refunds a successful payment, fully unless `amount` is given.
    ///
    /// A provider failure leaves the payment in `success` and surfaces as a
    /// retryable error.
    #[tracing::instrument(skip(self))]
    pub async fn refund_payment(
        &self,
        payment_id: PaymentId,
        amount: Option<Decimal>,
        reason: Option<String>,
    ) -> Result<Payment> {
        let mut payment = self.get_payment(payment_id).await?;
        let amount = amount.unwrap_or(payment.amount);
        payment.ensure_refundable(amount)?;

        match (&self.provider, &payment.transaction_id) {
            (Some(provider), Some(transaction_id)) => {
                match provider
                    .refund(transaction_id, amount, &payment.currency)
                    .await?
                {
                    RefundOutcome::Refunded { refund_id } => {
                        tracing::info!(%payment_id, %refund_id, "provider refund issued");
                    }
                    RefundOutcome::Rejected { reason } => {
                        return Err(ProviderError::Rejected(reason).into());
                    }
                }
            }
            (Some(provider), None) => {
                tracing::warn!(%payment_id, provider = provider.name(), "payment has no transaction id; refunding locally");
            }
            (None, _) => {}
        }

        payment.refund(amount, Utc::now())?;
        self.repository.update(&payment).await?;

        metrics::counter!("payments_refunded_total").increment(1);
        tracing::info!(%payment_id, %amount, reason = reason.as_deref().unwrap_or_default(), "payment refunded");
        Ok(payment)
    }

    /// Loads a payment by ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        self.repository
            .find(payment_id)
            .await?
            .ok_or(PaymentError::NotFound(payment_id))
    }

    /// Loads the payment of an order.
    #[tracing::instrument(skip(self))]
    pub async fn get_payment_by_order(&self, order_id: OrderId) -> Result<Payment> {
        self.repository
            .find_by_order(order_id)
            .await?
            .ok_or(PaymentError::NotFoundForOrder(order_id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_payments(&self, query: &ListPayments) -> Result<(Vec<Payment>, u64)> {
        self.repository.list(query).await
    }

    /// Loads several payments at once. Unknown ids are skipped.
    #[tracing::instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn get_payments_batch(&self, ids: &[PaymentId]) -> Result<Vec<Payment>> {
        self.repository.find_many(ids).await
    }

    /// Loads the payments of several orders at once.
    #[tracing::instrument(skip(self, order_ids), fields(count = order_ids.len()))]
    pub async fn get_payments_by_orders_batch(&self, order_ids: &[OrderId]) -> Result<Vec<Payment>> {
        self.repository.find_by_orders(order_ids).await
    }
}

/// The part of `process_payment` that runs after the payment is marked
/// `processing`. It owns everything it touches so it can run on its own task.
struct Settlement<R> {
    repository: Arc<R>,
    provider: Option<Arc<dyn PaymentProvider>>,
    publisher: EventPublisher,
    delay: Duration,
    trace_id: TraceId,
}

impl<R: PaymentRepository> Settlement<R> {
    async fn run(self, mut payment: Payment) -> Result<Payment> {
        let processing = payment.clone();

        match &self.provider {
            None => {
                tokio::time::sleep(self.delay).await;
                payment.succeed(None, Utc::now());
            }
            Some(provider) => {
                let intent_id = payment.transaction_id.clone().unwrap_or_default();
                match provider.confirm_payment(&intent_id).await {
                    Ok(Confirmation::Succeeded { transaction_id }) => {
                        payment.succeed(Some(transaction_id), Utc::now());
                    }
                    Ok(Confirmation::Declined { reason }) => payment.fail(reason, Utc::now()),
                    Err(e) => {
                        tracing::warn!(payment_id = %payment.id, provider = provider.name(), error = %e, "payment confirmation failed");
                        payment.fail(e.to_string(), Utc::now());
                    }
                }
            }
        }

        if let Err(e) = self.repository.update(&payment).await {
            tracing::error!(payment_id = %payment.id, error = %e, "settled payment not saved; returning it to pending");
            self.reset(processing).await;
            return Err(e);
        }

        metrics::counter!("payments_processed_total", "outcome" => payment.status.as_str())
            .increment(1);

        if payment.status == PaymentStatus::Success {
            tracing::info!(payment_id = %payment.id, order_id = %payment.order_id, "payment succeeded");
            self.publish(PAYMENT_SUCCESS, &PaymentSucceeded::from(&payment))
                .await;
        } else {
            tracing::info!(
                payment_id = %payment.id,
                order_id = %payment.order_id,
                reason = payment.failure_reason.as_deref().unwrap_or_default(),
                "payment failed"
            );
            self.publish(PAYMENT_FAILED, &PaymentFailed::from(&payment))
                .await;
        }
        Ok(payment)
    }

    /// Puts a payment whose outcome could not be saved back to `pending`.
    async fn reset(&self, mut payment: Payment) {
        payment.reset_to_pending(Utc::now());
        if let Err(e) = self.repository.update(&payment).await {
            tracing::error!(payment_id = %payment.id, error = %e, "payment left in processing");
        }
    }

    async fn publish<T: serde::Serialize>(&self, event_type: &str, payload: &T) {
        let trace_id = &self.trace_id;
        if let Err(e) = self.publisher.publish(event_type, payload, trace_id).await {
            tracing::warn!(%event_type, %trace_id, error = %e, "event not published");
        }
    }
}
