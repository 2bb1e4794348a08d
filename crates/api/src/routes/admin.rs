//! Admin order endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use common::{CustomerId, OrderId};
use domain::{Order, OrderStatus};
use pipeline::AdminOrderPatch;
use serde::{Deserialize, Serialize};
use store::{AnalyticsStore, OrderStore};

use crate::error::ApiError;
use crate::AppState;

/// Header identifying the caller on admin routes.
pub const CALLER_HEADER: &str = "x-caller-id";

/// Extracts the caller ID or rejects the request.
pub fn require_caller(headers: &HeaderMap) -> Result<CustomerId, ApiError> {
    headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.trim().is_empty())
        .map(CustomerId::from)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {CALLER_HEADER} header")))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid order id: {id}")))
}

#[derive(Deserialize)]
pub struct AdminPatchRequest {
    pub status: Option<String>,
    pub tracking_ref: Option<String>,
}

#[derive(Serialize)]
pub struct AdminOrderResponse {
    pub id: String,
    pub customer_id: String,
    pub status: String,
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub payment_session_ref: Option<String>,
    pub payment_intent_ref: Option<String>,
    pub tracking_ref: Option<String>,
    pub items: Vec<AdminOrderItemResponse>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct AdminOrderItemResponse {
    pub product_id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
}

impl From<Order> for AdminOrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            customer_id: order.customer_id.to_string(),
            status: order.status.as_str().to_string(),
            subtotal_cents: order.subtotal.cents(),
            shipping_cents: order.shipping.cents(),
            tax_cents: order.tax.cents(),
            total_cents: order.total.cents(),
            payment_session_ref: order.payment_session_ref,
            payment_intent_ref: order.payment_intent_ref,
            tracking_ref: order.tracking_ref,
            items: order
                .items
                .into_iter()
                .map(|item| AdminOrderItemResponse {
                    product_id: item.product_id.to_string(),
                    name: item.name,
                    unit_price_cents: item.unit_price.cents(),
                    quantity: item.quantity,
                })
                .collect(),
            created_at: order.created_at.to_rfc3339(),
            updated_at: order.updated_at.to_rfc3339(),
        }
    }
}

/// GET /admin/orders/{id} — fetch any order.
#[tracing::instrument(skip(state, headers))]
pub async fn get<O, A>(
    State(state): State<Arc<AppState<O, A>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<AdminOrderResponse>, ApiError>
where
    O: OrderStore + Clone + 'static,
    A: AnalyticsStore + Clone + 'static,
{
    let caller = require_caller(&headers)?;
    let order_id = parse_order_id(&id)?;
    let order = state.admin.get_order(&caller, order_id).await?;
    Ok(Json(order.into()))
}

/// PATCH /admin/orders/{id} — apply a manual override.
#[tracing::instrument(skip(state, headers, req))]
pub async fn update<O, A>(
    State(state): State<Arc<AppState<O, A>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<AdminPatchRequest>,
) -> Result<Json<AdminOrderResponse>, ApiError>
where
    O: OrderStore + Clone + 'static,
    A: AnalyticsStore + Clone + 'static,
{
    let caller = require_caller(&headers)?;
    let order_id = parse_order_id(&id)?;

    let status = req
        .status
        .map(|s| {
            OrderStatus::parse(&s)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown order status: {s}")))
        })
        .transpose()?;

    let order = state
        .admin
        .update_order(
            &caller,
            order_id,
            AdminOrderPatch {
                status,
                tracking_ref: req.tracking_ref,
            },
        )
        .await?;
    Ok(Json(order.into()))
}

/// DELETE /admin/orders/{id} — remove an order.
#[tracing::instrument(skip(state, headers))]
pub async fn delete<O, A>(
    State(state): State<Arc<AppState<O, A>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<axum::http::StatusCode, ApiError>
where
    O: OrderStore + Clone + 'static,
    A: AnalyticsStore + Clone + 'static,
{
    let caller = require_caller(&headers)?;
    let order_id = parse_order_id(&id)?;
    state.admin.delete_order(&caller, order_id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
