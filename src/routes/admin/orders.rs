//! Order administration.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::aggregates::OrderStatus;
use crate::error::ApiResult;
use crate::services::admin::{self, OrderPatch};
use crate::services::checkout::OrderView;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<String>,
}

/// GET /api/admin/orders?status=결제완료
pub async fn list_orders(State(state): State<AppState>, Query(query): Query<OrderListQuery>) -> ApiResult<Json<Vec<OrderView>>> {
    let status = query
        .status
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().parse::<OrderStatus>())
        .transpose()?;
    Ok(Json(admin::list_orders(&state, status).await?))
}

/// PATCH /api/admin/orders/:id
pub async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<OrderPatch>,
) -> ApiResult<Json<OrderView>> {
    Ok(Json(admin::update_order(&state, id, patch).await?))
}
