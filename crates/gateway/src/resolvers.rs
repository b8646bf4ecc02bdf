//! Aggregation of orders with their user and payment.

use futures_util::future::join_all;
use serde::Serialize;

use crate::LoadError;
use crate::context::RequestContext;
use crate::model::{OrderRecord, PaymentRecord, UserRecord};

/// An order with its related entities resolved.
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: OrderRecord,
    pub user: Option<UserRecord>,
    pub payment: Option<PaymentRecord>,
}

/// A field that could not be resolved. The rest of the response is still
/// returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

/// Resolves user and payment for one order.
///
/// A missing payment is not an error: the order may not have reached the
/// payment service yet.
pub async fn resolve_order(
    ctx: &RequestContext,
    order: OrderRecord,
    path: &str,
) -> (OrderView, Vec<FieldError>) {
    let (user, payment) = tokio::join!(
        ctx.loaders.users.load(order.user_id),
        ctx.loaders.payments_by_order.load(order.id),
    );

    let mut errors = Vec::new();
    let user = match user {
        Ok(user) => Some(user),
        Err(e) => {
            errors.push(field_error(path, "user", &e));
            None
        }
    };
    let payment = match payment {
        Ok(payment) => Some(payment),
        Err(e) if e.is_not_found() => None,
        Err(e) => {
            errors.push(field_error(path, "payment", &e));
            None
        }
    };

    (
        OrderView {
            order,
            user,
            payment,
        },
        errors,
    )
}

/// Resolves every order concurrently so their lookups share batches.
pub async fn resolve_orders(
    ctx: &RequestContext,
    orders: Vec<OrderRecord>,
) -> (Vec<OrderView>, Vec<FieldError>) {
    let paths: Vec<String> = (0..orders.len()).map(|i| format!("orders.{i}")).collect();
    let resolved = join_all(
        orders
            .into_iter()
            .zip(&paths)
            .map(|(order, path)| resolve_order(ctx, order, path)),
    )
    .await;

    let mut views = Vec::with_capacity(resolved.len());
    let mut errors = Vec::new();
    for (view, mut field_errors) in resolved {
        views.push(view);
        errors.append(&mut field_errors);
    }
    (views, errors)
}

fn field_error(parent: &str, field: &str, err: &LoadError) -> FieldError {
    FieldError {
        path: format!("{parent}.{field}"),
        message: err.to_string(),
    }
}
