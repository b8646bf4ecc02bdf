use async_trait::async_trait;
use common::{OrderId, PaymentId};

use crate::{ListPayments, Payment, Result};

/// Storage for payments.
///
/// Implementations enforce one payment per order: inserting a second payment
/// for the same order fails with `AlreadyExists`. Updates overwrite the whole
/// row (last write wins).
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn insert(&self, payment: &Payment) -> Result<()>;

    async fn find(&self, id: PaymentId) -> Result<Option<Payment>>;

    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Payment>>;

    /// Loads every payment whose id is in `ids`. Missing ids are skipped.
    async fn find_many(&self, ids: &[PaymentId]) -> Result<Vec<Payment>>;

    /// Loads the payments of every order in `order_ids`. Orders without a
    /// payment are skipped.
    async fn find_by_orders(&self, order_ids: &[OrderId]) -> Result<Vec<Payment>>;

    /// Returns one page of payments, newest first, and the total match count.
    async fn list(&self, query: &ListPayments) -> Result<(Vec<Payment>, u64)>;

    /// Persists the mutable fields of `payment`. Fails with `NotFound` if it
    /// does not exist.
    async fn update(&self, payment: &Payment) -> Result<()>;
}
