//! Gateway HTTP handlers.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use common::{ListMeta, ListResponse, OrderId};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};

use crate::client::Downstreams;
use crate::context::RequestContext;
use crate::error::ApiError;
use crate::loader::LoaderConfig;
use crate::model::OrderRecord;
use crate::resolvers::{FieldError, OrderView, resolve_order, resolve_orders};

/// Process-wide gateway state. Holds no per-request data.
pub struct GatewayState {
    pub downstreams: Downstreams,
    pub loader_config: LoaderConfig,
}

/// `{"data": T, "meta"?: {...}, "errors"?: [...]}`
#[derive(Debug, Serialize)]
pub struct GatewayResponse<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ListMeta>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub user_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListOrdersQuery {
    fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(user_id) = &self.user_id {
            pairs.push(("user_id", user_id.clone()));
        }
        if let Some(status) = &self.status {
            pairs.push(("status", status.clone()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset", offset.to_string()));
        }
        pairs
    }
}

/// GET /api/v1/orders: a page of orders with user and payment resolved.
#[tracing::instrument(skip(ctx))]
pub async fn list_orders(
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<GatewayResponse<Vec<OrderView>>>, ApiError> {
    let page: ListResponse<OrderRecord> = ctx
        .downstreams
        .orders
        .get("orders", &query.to_pairs(), ctx.token.as_ref())
        .await?;

    let (views, errors) = resolve_orders(&ctx, page.data).await;
    Ok(Json(GatewayResponse {
        data: views,
        meta: Some(page.meta),
        errors,
    }))
}

/// GET /api/v1/orders/{id}: one order with user and payment resolved.
#[tracing::instrument(skip(ctx))]
pub async fn get_order(
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Result<Json<GatewayResponse<OrderView>>, ApiError> {
    let order_id: OrderId = id
        .parse()
        .map_err(|e| ApiError::bad_request(format!("Invalid order id: {e}")))?;

    let order = ctx.loaders.orders.load(order_id).await?;
    let (view, errors) = resolve_order(&ctx, order, "order").await;
    Ok(Json(GatewayResponse {
        data: view,
        meta: None,
        errors,
    }))
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// GET /metrics: Prometheus text format.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl axum::response::IntoResponse {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}
