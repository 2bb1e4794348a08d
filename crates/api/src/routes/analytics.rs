//! Admin analytics endpoint.

use std::sync::Arc;

use analytics::{AnalyticsRange, AnalyticsReport};
use axum::extract::{Path, State};
use axum::Json;
use store::{AnalyticsStore, OrderStore};

use crate::error::ApiError;
use crate::routes::admin::require_caller;
use crate::AppState;

/// GET /admin/analytics/{range} — dashboard report for a trailing window.
#[tracing::instrument(skip(state, headers))]
pub async fn report<O, A>(
    State(state): State<Arc<AppState<O, A>>>,
    headers: axum::http::HeaderMap,
    Path(range): Path<String>,
) -> Result<Json<AnalyticsReport>, ApiError>
where
    O: OrderStore + Clone + 'static,
    A: AnalyticsStore + Clone + 'static,
{
    use pipeline::AccessPolicy;

    let caller = require_caller(&headers)?;
    if !state.policy.is_admin(&caller) {
        return Err(ApiError::Pipeline(pipeline::PipelineError::Forbidden));
    }

    let range = AnalyticsRange::parse(&range)?;
    let report = state.analytics.report(range).await?;
    Ok(Json(report))
}
