use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, PaymentId};
use parking_lot::RwLock;

use crate::{ListPayments, Payment, PaymentError, PaymentRepository, Result};

#[derive(Debug, Default)]
struct Tables {
    payments: HashMap<PaymentId, Payment>,
    by_order: HashMap<OrderId, PaymentId>,
}

/// In-memory payment repository for tests and local runs.
///
/// The order index plays the role of the unique constraint on `order_id`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentRepository {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tables.read().payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().payments.is_empty()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn insert(&self, payment: &Payment) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.by_order.contains_key(&payment.order_id) {
            return Err(PaymentError::AlreadyExists(payment.order_id));
        }
        tables.by_order.insert(payment.order_id, payment.id);
        tables.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn find(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.tables.read().payments.get(&id).cloned())
    }

    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let tables = self.tables.read();
        Ok(tables
            .by_order
            .get(&order_id)
            .and_then(|id| tables.payments.get(id))
            .cloned())
    }

    async fn find_many(&self, ids: &[PaymentId]) -> Result<Vec<Payment>> {
        let tables = self.tables.read();
        let mut found: Vec<Payment> = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(payment) = tables.payments.get(id)
                && !found.iter().any(|p| p.id == *id)
            {
                found.push(payment.clone());
            }
        }
        Ok(found)
    }

    async fn find_by_orders(&self, order_ids: &[OrderId]) -> Result<Vec<Payment>> {
        let tables = self.tables.read();
        let mut found: Vec<Payment> = Vec::with_capacity(order_ids.len());
        for order_id in order_ids {
            if let Some(payment) = tables.by_order.get(order_id).and_then(|id| tables.payments.get(id))
                && !found.iter().any(|p| p.id == payment.id)
            {
                found.push(payment.clone());
            }
        }
        Ok(found)
    }

    async fn list(&self, query: &ListPayments) -> Result<(Vec<Payment>, u64)> {
        let tables = self.tables.read();
        let mut matching: Vec<&Payment> = tables
            .payments
            .values()
            .filter(|p| query.user_id.is_none_or(|u| p.user_id == u))
            .filter(|p| query.status.is_none_or(|s| p.status == s))
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

    async fn update(&self, payment: &Payment) -> Result<()> {
        let mut tables = self.tables.write();
        let stored = tables
            .payments
            .get_mut(&payment.id)
            .ok_or(PaymentError::NotFound(payment.id))?;
        *stored = payment.clone();
        Ok(())
    }
}
