//! Checkout initiation endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use common::{CustomerId, Money, ProductId};
use domain::CartLine;
use serde::{Deserialize, Serialize};
use store::{AnalyticsStore, OrderStore};

use crate::error::ApiError;
use crate::AppState;

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub customer_id: String,
    pub items: Vec<CheckoutItemRequest>,
}

#[derive(Deserialize)]
pub struct CheckoutItemRequest {
    pub product_id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub order_id: String,
    pub session_ref: String,
}

/// POST /checkout — price the cart, create a pending order, and open a
/// payment session.
#[tracing::instrument(skip(state, req))]
pub async fn create<O, A>(
    State(state): State<Arc<AppState<O, A>>>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(axum::http::StatusCode, Json<CheckoutResponse>), ApiError>
where
    O: OrderStore + Clone + 'static,
    A: AnalyticsStore + Clone + 'static,
{
    if req.customer_id.trim().is_empty() {
        return Err(ApiError::BadRequest("customer_id is required".to_string()));
    }

    let lines: Vec<CartLine> = req
        .items
        .into_iter()
        .map(|item| CartLine {
            product_id: ProductId::new(item.product_id),
            name: item.name,
            unit_price: Money::from_cents(item.unit_price_cents),
            quantity: item.quantity,
            image_url: item.image_url,
        })
        .collect();

    let session = state
        .checkout
        .create_checkout(CustomerId::new(req.customer_id), lines)
        .await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(CheckoutResponse {
            order_id: session.order_id.to_string(),
            session_ref: session.session_ref,
        }),
    ))
}
