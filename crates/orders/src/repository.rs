use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;

use crate::{ListOrders, Order, OrderStatus, Result};

/// Storage for orders and their items.
///
/// Status writes are unconditional (last write wins); callers validate the
/// transition on the loaded order before writing.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Stores a new order and all of its items atomically.
    async fn insert(&self, order: &Order) -> Result<()>;

    /// Loads an order with its items.
    async fn find(&self, id: OrderId) -> Result<Option<Order>>;

    /// Loads every order whose id is in `ids`. Missing ids are skipped and
    /// the result order is unspecified.
    async fn find_many(&self, ids: &[OrderId]) -> Result<Vec<Order>>;

    /// Returns one page of orders, newest first, and the total match count.
    async fn list(&self, query: &ListOrders) -> Result<(Vec<Order>, u64)>;

    /// Overwrites the status of an order. Fails with `NotFound` if the order
    /// does not exist.
    async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;
}
