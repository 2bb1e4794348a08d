//! Payment webhook endpoint.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use pipeline::event::SIGNATURE_HEADER;
use pipeline::{PipelineError, WebhookAck};
use serde::Serialize;
use store::{AnalyticsStore, OrderStore};

use crate::error::ApiError;
use crate::AppState;

#[derive(Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
}

/// POST /webhooks/payment — verify and apply a provider event.
///
/// Always returns 200 once the signature checks out, including for events
/// we cannot make sense of: the provider treats any non-2xx as a delivery
/// failure and would redeliver a payload that will never parse.
#[tracing::instrument(skip(state, headers, body))]
pub async fn receive<O, A>(
    State(state): State<Arc<AppState<O, A>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError>
where
    O: OrderStore + Clone + 'static,
    A: AnalyticsStore + Clone + 'static,
{
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Pipeline(PipelineError::AuthenticationFailed))?;

    match state.reconciler.handle_delivery(&body, signature).await {
        Ok(WebhookAck::Processed) => Ok(Json(WebhookResponse { status: "processed" })),
        Ok(WebhookAck::Duplicate) => Ok(Json(WebhookResponse { status: "duplicate" })),
        Ok(WebhookAck::Ignored) => Ok(Json(WebhookResponse { status: "ignored" })),
        Err(PipelineError::MalformedEvent(reason)) => {
            tracing::warn!(reason = %reason, "acknowledging malformed webhook event");
            metrics::counter!("webhook_events_total", "outcome" => "malformed").increment(1);
            Ok(Json(WebhookResponse {
                status: "acknowledged",
            }))
        }
        Err(e) => Err(e.into()),
    }
}
