//! Payment service endpoints under `/api/v1/payments`.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{
    BatchRequest, BatchResponse, DataResponse, ListMeta, ListResponse, OrderId, PaymentId, UserId,
};
use payments::{
    CreatePayment, ListPayments, Payment, PaymentRepository, PaymentService, PaymentStatus,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{parse_id, parse_ids};
use crate::error::ApiError;
use crate::trace::RequestTrace;

pub type PaymentState<R> = Arc<PaymentService<R>>;

#[derive(Debug, Default, Deserialize)]
pub struct ListPaymentsQuery {
    pub user_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListPaymentsQuery {
    fn into_query(self) -> Result<ListPayments, ApiError> {
        let user_id = self
            .user_id
            .as_deref()
            .map(|id| parse_id::<UserId>(id, "user_id"))
            .transpose()?;
        let status = self
            .status
            .as_deref()
            .map(str::parse::<PaymentStatus>)
            .transpose()?;
        Ok(ListPayments {
            user_id,
            status,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

/// Body of a refund; an empty body refunds the full amount.
#[derive(Debug, Default, Deserialize)]
pub struct RefundRequest {
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
}

/// POST /api/v1/payments
#[tracing::instrument(skip(service, cmd))]
pub async fn create<R: PaymentRepository + 'static>(
    State(service): State<PaymentState<R>>,
    Json(cmd): Json<CreatePayment>,
) -> Result<(StatusCode, Json<DataResponse<Payment>>), ApiError> {
    let payment = service.create_payment(cmd).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(payment))))
}

/// GET /api/v1/payments?user_id=&status=&limit=&offset=
#[tracing::instrument(skip(service))]
pub async fn list<R: PaymentRepository + 'static>(
    State(service): State<PaymentState<R>>,
    Query(params): Query<ListPaymentsQuery>,
) -> Result<Json<ListResponse<Payment>>, ApiError> {
    let query = params.into_query()?;
    let (data, total) = service.list_payments(&query).await?;
    Ok(Json(ListResponse {
        data,
        meta: ListMeta {
            total,
            limit: query.limit(),
            offset: query.offset(),
        },
    }))
}

/// GET /api/v1/payments/{id}
#[tracing::instrument(skip(service))]
pub async fn get<R: PaymentRepository + 'static>(
    State(service): State<PaymentState<R>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<Payment>>, ApiError> {
    let payment_id: PaymentId = parse_id(&id, "payment id")?;
    Ok(Json(DataResponse::new(service.get_payment(payment_id).await?)))
}

/// GET /api/v1/payments/order/{order_id}
#[tracing::instrument(skip(service))]
pub async fn get_by_order<R: PaymentRepository + 'static>(
    State(service): State<PaymentState<R>>,
    Path(order_id): Path<String>,
) -> Result<Json<DataResponse<Payment>>, ApiError> {
    let order_id: OrderId = parse_id(&order_id, "order id")?;
    Ok(Json(DataResponse::new(
        service.get_payment_by_order(order_id).await?,
    )))
}

/// POST /api/v1/payments/{id}/process
///
/// Declines come back as 200 with the payment in `failed` status.
#[tracing::instrument(skip(service))]
pub async fn process<R: PaymentRepository + 'static>(
    State(service): State<PaymentState<R>>,
    Path(id): Path<String>,
    RequestTrace(trace_id): RequestTrace,
) -> Result<Json<DataResponse<Payment>>, ApiError> {
    let payment_id: PaymentId = parse_id(&id, "payment id")?;
    let payment = service.process_payment(payment_id, &trace_id).await?;
    Ok(Json(DataResponse::new(payment)))
}

/// POST /api/v1/payments/{id}/refund
#[tracing::instrument(skip(service, req))]
pub async fn refund<R: PaymentRepository + 'static>(
    State(service): State<PaymentState<R>>,
    Path(id): Path<String>,
    req: Option<Json<RefundRequest>>,
) -> Result<Json<DataResponse<Payment>>, ApiError> {
    let payment_id: PaymentId = parse_id(&id, "payment id")?;
    let req = req.map(|Json(req)| req).unwrap_or_default();
    let payment = service
        .refund_payment(payment_id, req.amount, req.reason)
        .await?;
    Ok(Json(DataResponse::new(payment)))
}

/// POST /api/v1/payments/batch
#[tracing::instrument(skip(service, req), fields(count = req.ids.len()))]
pub async fn batch<R: PaymentRepository + 'static>(
    State(service): State<PaymentState<R>>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<BatchResponse<Payment>>, ApiError> {
    let ids: Vec<PaymentId> = parse_ids(&req.ids, "payment id")?;
    Ok(Json(BatchResponse::new(
        service.get_payments_batch(&ids).await?,
    )))
}

/// POST /api/v1/payments/by-order/batch
///
/// Takes order ids; orders without a payment are left out.
#[tracing::instrument(skip(service, req), fields(count = req.ids.len()))]
pub async fn batch_by_order<R: PaymentRepository + 'static>(
    State(service): State<PaymentState<R>>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<BatchResponse<Payment>>, ApiError> {
    let order_ids: Vec<OrderId> = parse_ids(&req.ids, "order id")?;
    Ok(Json(BatchResponse::new(
        service.get_payments_by_orders_batch(&order_ids).await?,
    )))
}
