use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use parking_lot::RwLock;

use crate::{ListOrders, Order, OrderError, OrderRepository, OrderStatus, Result};

/// In-memory order repository for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write();
        if orders.contains_key(&order.id) {
            return Err(OrderError::AlreadyExists(order.id));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().get(&id).cloned())
    }

    async fn find_many(&self, ids: &[OrderId]) -> Result<Vec<Order>> {
        let orders = self.orders.read();
        let mut found: Vec<Order> = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(order) = orders.get(id)
                && !found.iter().any(|o| o.id == *id)
            {
                found.push(order.clone());
            }
        }
        Ok(found)
    }

    async fn list(&self, query: &ListOrders) -> Result<(Vec<Order>, u64)> {
        let orders = self.orders.read();
        let mut matching: Vec<&Order> = orders
            .values()
            .filter(|o| query.user_id.is_none_or(|u| o.user_id == u))
            .filter(|o| query.status.is_none_or(|s| o.status == s))
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut orders = self.orders.write();
        let order = orders.get_mut(&id).ok_or(OrderError::NotFound(id))?;
        order.status = status;
        order.updated_at = updated_at;
        Ok(())
    }
}
