use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use super::{Confirmation, PaymentIntent, PaymentProvider, ProviderError, RefundOutcome};

#[derive(Debug, Default)]
struct MockState {
    fail_on_intent: bool,
    fail_on_confirm: bool,
    decline_reason: Option<String>,
    fail_on_refund: bool,
    reject_refund_reason: Option<String>,
    intents: u32,
    confirmations: u32,
    refunds: u32,
}

/// Deterministic in-process provider for tests and local runs.
///
/// Every call succeeds unless a failure toggle is set. Ids are sequential
/// (`pi_mock_0001`, `ch_mock_0001`, `re_mock_0001`).
#[derive(Debug, Clone, Default)]
pub struct MockPaymentProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `create_payment_intent` return an error.
    pub fn set_fail_on_intent(&self, fail: bool) {
        self.state.lock().fail_on_intent = fail;
    }

    /// Makes `confirm_payment` return an error.
    pub fn set_fail_on_confirm(&self, fail: bool) {
        self.state.lock().fail_on_confirm = fail;
    }

    /// Makes `confirm_payment` decline with `reason`.
    pub fn set_decline(&self, reason: Option<&str>) {
        self.state.lock().decline_reason = reason.map(str::to_string);
    }

    /// Makes `refund` return an error.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state.lock().fail_on_refund = fail;
    }

    /// Makes `refund` answer with an explicit rejection.
    pub fn set_reject_refund(&self, reason: Option<&str>) {
        self.state.lock().reject_refund_reason = reason.map(str::to_string);
    }

    pub fn intent_count(&self) -> u32 {
        self.state.lock().intents
    }

    pub fn confirm_count(&self) -> u32 {
        self.state.lock().confirmations
    }

    pub fn refund_count(&self) -> u32 {
        self.state.lock().refunds
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_payment_intent(
        &self,
        _amount: Decimal,
        _currency: &str,
    ) -> Result<PaymentIntent, ProviderError> {
        let mut state = self.state.lock();
        if state.fail_on_intent {
            return Err(ProviderError::Unavailable("intent creation failed".into()));
        }
        state.intents += 1;
        let intent_id = format!("pi_mock_{:04}", state.intents);
        Ok(PaymentIntent {
            client_secret: format!("{intent_id}_secret"),
            intent_id,
        })
    }

    async fn confirm_payment(&self, _intent_id: &str) -> Result<Confirmation, ProviderError> {
        let mut state = self.state.lock();
        if state.fail_on_confirm {
            return Err(ProviderError::Unavailable("confirmation failed".into()));
        }
        state.confirmations += 1;
        if let Some(reason) = &state.decline_reason {
            return Ok(Confirmation::Declined {
                reason: reason.clone(),
            });
        }
        Ok(Confirmation::Succeeded {
            transaction_id: format!("ch_mock_{:04}", state.confirmations),
        })
    }

    async fn refund(
        &self,
        _transaction_id: &str,
        _amount: Decimal,
        _currency: &str,
    ) -> Result<RefundOutcome, ProviderError> {
        let mut state = self.state.lock();
        if state.fail_on_refund {
            return Err(ProviderError::Unavailable("refund failed".into()));
        }
        if let Some(reason) = &state.reject_refund_reason {
            return Ok(RefundOutcome::Rejected {
                reason: reason.clone(),
            });
        }
        state.refunds += 1;
        Ok(RefundOutcome::Refunded {
            refund_id: format!("re_mock_{:04}", state.refunds),
        })
    }
}
