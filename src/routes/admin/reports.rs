//! Traffic and conversion reports over a local-date range.

use axum::{
    extract::{Query, State},
    Json,
};

use crate::error::ApiResult;
use crate::reporting::{FunnelReport, ReferrerReport, VisitorReport};
use crate::services::reports::{self, RangeQuery};
use crate::AppState;

/// GET /api/admin/reports/visitors?from=2025-05-01&to=2025-05-07
pub async fn visitors(State(state): State<AppState>, Query(query): Query<RangeQuery>) -> ApiResult<Json<VisitorReport>> {
    Ok(Json(reports::visitors(&state, query.range()?).await?))
}

/// GET /api/admin/reports/referrers
pub async fn referrers(State(state): State<AppState>, Query(query): Query<RangeQuery>) -> ApiResult<Json<ReferrerReport>> {
    Ok(Json(reports::referrers(&state, query.range()?).await?))
}

/// GET /api/admin/reports/funnel
pub async fn funnel(State(state): State<AppState>, Query(query): Query<RangeQuery>) -> ApiResult<Json<FunnelReport>> {
    Ok(Json(reports::funnel(&state, query.range()?).await?))
}
