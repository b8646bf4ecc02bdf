//! Order service endpoints under `/api/v1/orders`.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{BatchRequest, BatchResponse, DataResponse, ListMeta, ListResponse, OrderId, UserId};
use orders::{CreateOrder, ListOrders, Order, OrderRepository, OrderService, OrderStatus};
use serde::Deserialize;

use super::{parse_id, parse_ids};
use crate::error::ApiError;
use crate::trace::RequestTrace;

/// Shared state of the order routes.
pub type OrderState<R> = Arc<OrderService<R>>;

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub user_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListOrdersQuery {
    fn into_query(self) -> Result<ListOrders, ApiError> {
        let user_id = self
            .user_id
            .as_deref()
            .map(|id| parse_id::<UserId>(id, "user_id"))
            .transpose()?;
        let status = self
            .status
            .as_deref()
            .map(str::parse::<OrderStatus>)
            .transpose()?;
        Ok(ListOrders {
            user_id,
            status,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

/// POST /api/v1/orders
#[tracing::instrument(skip(service, cmd))]
pub async fn create<R: OrderRepository + 'static>(
    State(service): State<OrderState<R>>,
    RequestTrace(trace_id): RequestTrace,
    Json(cmd): Json<CreateOrder>,
) -> Result<(StatusCode, Json<DataResponse<Order>>), ApiError> {
    let order = service.create_order(cmd, &trace_id).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(order))))
}

/// GET /api/v1/orders?user_id=&status=&limit=&offset=
#[tracing::instrument(skip(service))]
pub async fn list<R: OrderRepository + 'static>(
    State(service): State<OrderState<R>>,
    Query(params): Query<ListOrdersQuery>,
) -> Result<Json<ListResponse<Order>>, ApiError> {
    let query = params.into_query()?;
    let (data, total) = service.list_orders(&query).await?;
    Ok(Json(ListResponse {
        data,
        meta: ListMeta {
            total,
            limit: query.limit(),
            offset: query.offset(),
        },
    }))
}

/// GET /api/v1/orders/{id}
#[tracing::instrument(skip(service))]
pub async fn get<R: OrderRepository + 'static>(
    State(service): State<OrderState<R>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<Order>>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let order = service.get_order(order_id).await?;
    Ok(Json(DataResponse::new(order)))
}

/// PATCH /api/v1/orders/{id}/status
#[tracing::instrument(skip(service, req))]
pub async fn update_status<R: OrderRepository + 'static>(
    State(service): State<OrderState<R>>,
    Path(id): Path<String>,
    RequestTrace(trace_id): RequestTrace,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<DataResponse<Order>>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let order = service
        .update_status(order_id, req.status, &trace_id)
        .await?;
    Ok(Json(DataResponse::new(order)))
}

/// POST /api/v1/orders/batch
///
/// Unknown ids are left out of the response.
#[tracing::instrument(skip(service, req), fields(count = req.ids.len()))]
pub async fn batch<R: OrderRepository + 'static>(
    State(service): State<OrderState<R>>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<BatchResponse<Order>>, ApiError> {
    let ids: Vec<OrderId> = parse_ids(&req.ids, "order id")?;
    let orders = service.get_orders_batch(&ids).await?;
    Ok(Json(BatchResponse::new(orders)))
}
