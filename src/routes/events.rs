//! Fire-and-forget tracking beacons from the storefront.

use axum::{
    extract::State,
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    Json,
};

use crate::error::ApiResult;
use crate::services::tracking::{self, client_ip, CartClickEvent, PageViewEvent};
use crate::AppState;

/// POST /api/events/page-view
pub async fn page_view(State(state): State<AppState>, headers: HeaderMap, Json(event): Json<PageViewEvent>) -> ApiResult<StatusCode> {
    let agent = headers.get(USER_AGENT).and_then(|v| v.to_str().ok()).map(String::from);
    tracking::log_page_view(&state, client_ip(&headers), event, agent).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/events/cart
pub async fn cart_click(State(state): State<AppState>, headers: HeaderMap, Json(event): Json<CartClickEvent>) -> ApiResult<StatusCode> {
    tracking::log_cart_click(&state, client_ip(&headers), event).await?;
    Ok(StatusCode::NO_CONTENT)
}
